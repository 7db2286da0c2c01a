//! Sync log domain model - one row per import run

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a logged sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Running,
    Success,
    /// Completed, but some files were skipped
    Partial,
    /// Nothing to import
    Skipped,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Running => "running",
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Skipped => "skipped",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SyncStatus::Running),
            "success" => Ok(SyncStatus::Success),
            "partial" => Ok(SyncStatus::Partial),
            "skipped" => Ok(SyncStatus::Skipped),
            "error" => Ok(SyncStatus::Error),
            other => Err(format!("unknown sync status: {}", other)),
        }
    }
}

/// A sync run as stored in `sys_sync_logs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub id: i64,
    /// What was synced, e.g. "csv_import" or "remote_import"
    pub entity: String,
    pub operation: String,
    pub status: SyncStatus,
    pub record_count: i64,
    pub error_message: Option<String>,
    /// Serialized run summary
    pub details: Option<serde_json::Value>,
    /// Unix milliseconds
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub duration_ms: Option<i64>,
}

/// Values written when a run finishes
#[derive(Debug, Clone)]
pub struct SyncCompletion {
    pub status: SyncStatus,
    pub record_count: i64,
    pub error_message: Option<String>,
    pub details: Option<serde_json::Value>,
    pub completed_at: i64,
}
