//! budgetsync CLI - budget and account mapping imports from the terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{history, import, serve, status};

/// bsync - import budget and account mapping exports into DuckDB
#[derive(Parser)]
#[command(name = "bsync", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import mapping and budget CSV files
    Import {
        /// Directory with the CSV exports (defaults to the configured input dir)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Copy files from the configured staging directories first
        #[arg(long)]
        fetch: bool,
        /// Run the whole pipeline without touching the database
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show database and sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show recent import runs
    History {
        /// Only runs whose entity contains this text ("all" for every run)
        #[arg(long)]
        filter: Option<String>,
        /// Maximum number of runs
        #[arg(long, short)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve the HTTP control API
    Serve {
        /// Address to bind (defaults to the configured server.bind)
        #[arg(long, env = "BUDGETSYNC_BIND")]
        bind: Option<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Import { dir, fetch, dry_run, json } => import::run(dir, fetch, dry_run, json),
        Commands::Status { json } => status::run(json),
        Commands::History { filter, limit, json } => history::run(filter.as_deref(), limit, json),
        Commands::Serve { bind } => serve::run(bind),
    }
}
