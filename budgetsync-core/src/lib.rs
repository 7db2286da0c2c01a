//! budgetsync core - budget and account mapping import
//!
//! This crate implements the import pipeline following hexagonal architecture:
//!
//! - **domain**: Core entities (AccountMapping, BudgetEntry, SyncLogEntry)
//! - **ports**: Trait definitions for external dependencies (Repository, FileProvider)
//! - **services**: Pipeline stages and orchestration
//! - **adapters**: Concrete implementations (DuckDB, in-memory, staging directories)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use adapters::{DuckDbRepository, StagingDirectoryProvider};
use config::Config;
use ports::{FileProvider, Repository};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, Result};
pub use domain::{AccountMapping, BudgetEntry, SyncLogEntry, SyncStatus};

/// Main context for budgetsync operations
///
/// Holds the configuration, the repository and the services built on it.
/// The CLI and the HTTP server both go through this.
pub struct BudgetSyncContext {
    pub config: Config,
    pub repository: Arc<dyn Repository>,
    pub import_service: ImportService,
    pub sync_log_service: SyncLogService,
    pub status_service: StatusService,
}

impl BudgetSyncContext {
    /// Open the database in `data_dir` (creating both if needed)
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let config = Config::load(data_dir)?;

        let repository = DuckDbRepository::new(&config.database_path())?;
        repository.ensure_schema()?;

        Ok(Self::with_repository(config, Arc::new(repository)))
    }

    /// Build a context around an existing repository
    pub fn with_repository(config: Config, repository: Arc<dyn Repository>) -> Self {
        let provider: Option<Arc<dyn FileProvider>> = if config.staging_dirs.is_empty() {
            None
        } else {
            Some(Arc::new(StagingDirectoryProvider::new(
                config.staging_dirs.clone(),
            )))
        };

        let import_service =
            ImportService::new(Arc::clone(&repository), provider, config.lock_path());
        let sync_log_service = SyncLogService::new(Arc::clone(&repository));
        let status_service = StatusService::new(Arc::clone(&repository), config.lock_path());

        Self {
            config,
            repository,
            import_service,
            sync_log_service,
            status_service,
        }
    }

    /// Import options seeded from configuration
    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            input_dir: self.config.input_dir.clone(),
            loader: self.config.loader_options(),
            dry_run: false,
            fetch: false,
        }
    }
}
