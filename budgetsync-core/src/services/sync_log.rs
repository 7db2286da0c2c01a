//! Sync log service - durable history of import runs

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::result::Result;
use crate::domain::{SyncCompletion, SyncLogEntry};
use crate::ports::Repository;
use crate::services::import::ImportSummary;

/// Default number of history rows returned
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Message written to runs that never finished
const INTERRUPTED_MESSAGE: &str = "interrupted before completion";

/// Current unix timestamp in milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub struct SyncLogService {
    repository: Arc<dyn Repository>,
}

impl SyncLogService {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Record the start of a run; returns the log id
    pub fn start(&self, entity: &str, operation: &str) -> Result<i64> {
        self.repository.insert_sync_log(entity, operation, now_ms())
    }

    /// Record the outcome of a run
    pub fn finish(&self, id: i64, summary: &ImportSummary) -> Result<()> {
        let completion = SyncCompletion {
            status: summary.status.sync_status(),
            record_count: (summary.mapping_rows + summary.budget_rows) as i64,
            error_message: summary.error_message(),
            details: Some(serde_json::to_value(summary)?),
            completed_at: now_ms(),
        };
        self.repository.complete_sync_log(id, &completion)
    }

    /// Newest runs first. A filter of `all` (or none) returns every entity.
    pub fn history(&self, filter: Option<&str>, limit: Option<usize>) -> Result<Vec<SyncLogEntry>> {
        let filter = filter.filter(|f| !f.is_empty() && !f.eq_ignore_ascii_case("all"));
        self.repository
            .get_sync_logs(filter, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
    }

    /// Close out runs left in `running` by a process that died mid-import.
    ///
    /// Only call while holding the import guard.
    pub fn recover_interrupted(&self) -> Result<usize> {
        let count = self
            .repository
            .fail_running_syncs(INTERRUPTED_MESSAGE, now_ms())?;
        if count > 0 {
            warn!("Marked {} interrupted sync run(s) as failed", count);
        } else {
            info!("No interrupted sync runs");
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryRepository;
    use crate::domain::SyncStatus;

    #[test]
    fn test_history_filter_all_matches_everything() {
        let service = SyncLogService::new(Arc::new(InMemoryRepository::new()));
        service.start("csv_import", "import").unwrap();
        service.start("remote_import", "import").unwrap();

        assert_eq!(service.history(Some("all"), None).unwrap().len(), 2);
        assert_eq!(service.history(Some("remote"), None).unwrap().len(), 1);
        assert_eq!(service.history(None, Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_recover_interrupted() {
        let service = SyncLogService::new(Arc::new(InMemoryRepository::new()));
        service.start("csv_import", "import").unwrap();

        assert_eq!(service.recover_interrupted().unwrap(), 1);
        let entry = &service.history(None, None).unwrap()[0];
        assert_eq!(entry.status, SyncStatus::Error);
        assert_eq!(entry.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
        assert_eq!(service.recover_interrupted().unwrap(), 0);
    }
}
