//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. The pipeline
//! stages (discovery, mapping, budget) are plain functions; the import,
//! sync log and status services hold the injected repository.

pub mod budget;
pub mod discovery;
pub mod import;
pub mod mapping;
pub mod migration;
pub mod number;
pub mod source;
mod status;
pub mod sync_log;

pub use budget::{BudgetFileResult, BudgetFileStats, SectionMarkers};
pub use discovery::DiscoveredFiles;
pub use import::{
    FileError, ImportGuard, ImportOptions, ImportService, ImportStage, ImportSummary, RunStatus,
};
pub use migration::{MigrationResult, MigrationService};
pub use number::parse_amount;
pub use source::LoaderOptions;
pub use status::{QuickStatus, StatusService};
pub use sync_log::{SyncLogService, DEFAULT_HISTORY_LIMIT};
