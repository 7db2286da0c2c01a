//! Import command - run the mapping and budget import

use std::path::PathBuf;

use anyhow::{bail, Result};
use colored::Colorize;

use budgetsync_core::services::{ImportSummary, RunStatus};

use super::get_context;
use crate::output;

/// Descriptions listed before truncating
const MAX_UNMATCHED_SHOWN: usize = 10;

pub fn run(dir: Option<PathBuf>, fetch: bool, dry_run: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let mut options = ctx.import_options();
    if let Some(dir) = dir {
        options.input_dir = dir;
    }
    options.fetch = fetch;
    options.dry_run = dry_run;

    let summary = ctx.import_service.run(&options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if summary.status == RunStatus::Failed {
        bail!(
            "Import failed: {}",
            summary.failure_reason.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn print_summary(summary: &ImportSummary) {
    let title = if summary.dry_run { "Import (dry run)" } else { "Import" };
    println!("{} {}", title.bold(), output::run_status(summary.status));
    println!();

    let mut table = output::create_table();
    table.set_header(vec!["", "Files", "Loaded", "Rows read", "Rows written"]);
    table.add_row(vec![
        "Mappings".to_string(),
        summary.mapping_files.to_string(),
        summary.mapping_files_loaded.to_string(),
        summary.mapping_rows_loaded.to_string(),
        summary.mapping_rows.to_string(),
    ]);
    table.add_row(vec![
        "Budget".to_string(),
        summary.budget_files.to_string(),
        summary.budget_files_loaded.to_string(),
        summary.budget_rows_loaded.to_string(),
        summary.budget_rows.to_string(),
    ]);
    println!("{}", table);

    if !summary.files.is_empty() {
        let mut files = output::create_table();
        files.set_header(vec!["Budget file", "Agreement", "Year", "Matched", "Cash flow", "Dropped"]);
        for f in &summary.files {
            files.add_row(vec![
                f.file.clone(),
                f.agreement.clone(),
                f.year.to_string(),
                f.matched.to_string(),
                f.cash_flow_retained.to_string(),
                f.unmatched_dropped.to_string(),
            ]);
        }
        println!("{}", files);
    }

    if summary.fetched_files > 0 {
        output::info(&format!("Fetched {} files", summary.fetched_files));
    }
    for warning in &summary.warnings {
        output::warning(warning);
    }
    if !summary.unmatched_descriptions.is_empty() {
        println!("{}", "Unmapped lines:".bold());
        for description in summary.unmatched_descriptions.iter().take(MAX_UNMATCHED_SHOWN) {
            println!("  • {}", description);
        }
        let rest = summary.unmatched_descriptions.len().saturating_sub(MAX_UNMATCHED_SHOWN);
        if rest > 0 {
            println!("  … and {} more", rest);
        }
    }
    for err in &summary.errors {
        output::error(&format!("{}: {}", err.file, err.message));
    }

    println!();
    match summary.status {
        RunStatus::Success | RunStatus::Partial => output::success(&format!(
            "Done in {}",
            output::format_duration(summary.duration_ms)
        )),
        RunStatus::Skipped => output::warning("Nothing imported"),
        RunStatus::Failed => {}
    }
}
