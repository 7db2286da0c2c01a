//! Status command - database health and last sync

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.quick_status();

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Budget Sync Status".bold());
    println!();

    let database = if status.database == "connected" {
        status.database.green()
    } else {
        status.database.red()
    };
    let last_sync = status
        .last_successful_sync
        .map(output::format_timestamp)
        .unwrap_or_else(|| "never".to_string());

    let mut table = output::create_table();
    table.add_row(vec!["Database".to_string(), database.to_string()]);
    table.add_row(vec!["Mapping rows".to_string(), status.mapping_rows.to_string()]);
    table.add_row(vec!["Budget rows".to_string(), status.budget_rows.to_string()]);
    table.add_row(vec!["Agreements".to_string(), status.agreements.to_string()]);
    table.add_row(vec!["Last successful sync".to_string(), last_sync]);
    table.add_row(vec!["Errors (24h)".to_string(), status.recent_errors.to_string()]);
    println!("{}", table);

    if let Some(err) = &status.database_error {
        output::error(err);
    }
    if let Some(running) = &status.running_sync {
        output::info(&format!(
            "Sync running: {} since {}",
            running.entity,
            output::format_timestamp(running.started_at)
        ));
    } else if status.is_sync_running {
        output::info("Sync running");
    }

    Ok(())
}
