//! Status service - health and freshness of the imported data

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::domain::result::Result;
use crate::domain::SyncLogEntry;
use crate::ports::Repository;
use crate::services::import::ImportGuard;
use crate::services::sync_log::now_ms;

const RECENT_ERROR_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Serialize)]
pub struct QuickStatus {
    /// "connected" or "error"
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_error: Option<String>,
    pub mapping_rows: i64,
    pub budget_rows: i64,
    pub agreements: i64,
    /// Unix ms of the newest successful or partial run
    pub last_successful_sync: Option<i64>,
    /// Failed or partial runs in the last 24 hours
    pub recent_errors: i64,
    pub is_sync_running: bool,
    pub running_sync: Option<SyncLogEntry>,
}

/// Status service for the quick-status endpoint and `bsync status`
pub struct StatusService {
    repository: Arc<dyn Repository>,
    lock_path: PathBuf,
}

impl StatusService {
    pub fn new(repository: Arc<dyn Repository>, lock_path: PathBuf) -> Self {
        Self {
            repository,
            lock_path,
        }
    }

    /// Never fails on a broken database; reports it instead
    pub fn quick_status(&self) -> QuickStatus {
        let is_sync_running = ImportGuard::is_held(&self.lock_path);
        match self.collect(is_sync_running) {
            Ok(status) => status,
            Err(e) => {
                warn!("Status query failed: {}", e);
                QuickStatus {
                    database: "error".to_string(),
                    database_error: Some(e.to_string()),
                    mapping_rows: 0,
                    budget_rows: 0,
                    agreements: 0,
                    last_successful_sync: None,
                    recent_errors: 0,
                    is_sync_running,
                    running_sync: None,
                }
            }
        }
    }

    fn collect(&self, is_sync_running: bool) -> Result<QuickStatus> {
        self.repository.ping()?;
        // A 'running' row without a live lock holder is a crashed run
        let running_sync = if is_sync_running {
            self.repository.get_running_sync()?
        } else {
            None
        };

        Ok(QuickStatus {
            database: "connected".to_string(),
            database_error: None,
            mapping_rows: self.repository.count_account_mappings()?,
            budget_rows: self.repository.count_budget_entries()?,
            agreements: self.repository.count_agreements()?,
            last_successful_sync: self.repository.last_successful_sync()?,
            recent_errors: self
                .repository
                .count_errors_since(now_ms() - RECENT_ERROR_WINDOW_MS)?,
            is_sync_running,
            running_sync,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryRepository;
    use crate::domain::AccountMapping;
    use tempfile::TempDir;

    #[test]
    fn test_quick_status_counts() {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(InMemoryRepository::new());
        repo.replace_account_mappings(&[AccountMapping::new("1", "1001", "Rent")])
            .unwrap();
        repo.insert_sync_log("csv_import", "import", now_ms()).unwrap();

        let service = StatusService::new(repo, dir.path().join("import.lock"));
        let status = service.quick_status();
        assert_eq!(status.database, "connected");
        assert_eq!(status.mapping_rows, 1);
        assert_eq!(status.budget_rows, 0);
        // Stale running row without a lock holder
        assert!(!status.is_sync_running);
        assert!(status.running_sync.is_none());
    }

    #[test]
    fn test_quick_status_sees_held_guard() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("import.lock");
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_sync_log("csv_import", "import", now_ms()).unwrap();

        let _guard = ImportGuard::acquire(&lock_path).unwrap();
        let status = StatusService::new(repo, lock_path.clone()).quick_status();
        assert!(status.is_sync_running);
        assert_eq!(status.running_sync.unwrap().entity, "csv_import");
    }
}
