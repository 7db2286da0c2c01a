//! History command - recent import runs from the sync log

use anyhow::Result;

use super::get_context;
use crate::output;

pub fn run(filter: Option<&str>, limit: Option<usize>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let history = ctx.sync_log_service.history(filter, limit)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "history": history }))?
        );
        return Ok(());
    }

    if history.is_empty() {
        output::info("No sync runs recorded");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["ID", "Entity", "Status", "Records", "Started", "Duration", "Error"]);
    for entry in &history {
        table.add_row(vec![
            entry.id.to_string(),
            entry.entity.clone(),
            output::sync_status(entry.status).to_string(),
            entry.record_count.to_string(),
            output::format_timestamp(entry.started_at),
            entry
                .duration_ms
                .map(output::format_duration)
                .unwrap_or_else(|| "-".to_string()),
            entry.error_message.clone().unwrap_or_default(),
        ]);
    }
    println!("{}", table);

    Ok(())
}
