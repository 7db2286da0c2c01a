//! CLI command implementations

pub mod history;
pub mod import;
pub mod serve;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use budgetsync_core::BudgetSyncContext;

/// Get the data directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("BUDGETSYNC_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".budgetsync"))
}

/// Open the budgetsync context for the data directory
pub fn get_context() -> Result<BudgetSyncContext> {
    let data_dir = get_data_dir()?;
    BudgetSyncContext::new(&data_dir)
        .with_context(|| format!("Failed to open budgetsync data in {:?}", data_dir))
}
