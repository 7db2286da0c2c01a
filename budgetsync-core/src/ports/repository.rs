//! Repository port - storage abstraction for the destination tables

use crate::domain::result::Result;
use crate::domain::{AccountMapping, BudgetEntry, SyncCompletion, SyncLogEntry};

/// Storage used by the import pipeline.
///
/// The pipeline never holds a global connection; callers construct an
/// implementation and pass it in. `replace_*` methods must swap the whole
/// table inside a single transaction so readers never observe a
/// half-replaced table.
pub trait Repository: Send + Sync {
    // === Health ===

    /// Cheap connectivity check
    fn ping(&self) -> Result<()>;

    // === Account mappings ===

    /// Delete every mapping row and insert `mappings`, atomically
    fn replace_account_mappings(&self, mappings: &[AccountMapping]) -> Result<usize>;

    /// All mapping rows, in insertion order
    fn get_account_mappings(&self) -> Result<Vec<AccountMapping>>;

    fn count_account_mappings(&self) -> Result<i64>;

    // === Budget ===

    /// Delete every budget row and insert `entries`, atomically
    fn replace_budget_entries(&self, entries: &[BudgetEntry]) -> Result<usize>;

    /// All budget rows, ordered by agreement, year, month, description
    fn get_budget_entries(&self) -> Result<Vec<BudgetEntry>>;

    fn count_budget_entries(&self) -> Result<i64>;

    /// Distinct agreements present in the budget table
    fn count_agreements(&self) -> Result<i64>;

    // === Sync log ===

    /// Insert a `running` row and return its id
    fn insert_sync_log(&self, entity: &str, operation: &str, started_at: i64) -> Result<i64>;

    /// Mark a run finished
    fn complete_sync_log(&self, id: i64, completion: &SyncCompletion) -> Result<()>;

    /// Newest first; `entity_filter` is a substring match on entity
    fn get_sync_logs(&self, entity_filter: Option<&str>, limit: usize) -> Result<Vec<SyncLogEntry>>;

    /// Most recent row still in `running` state
    fn get_running_sync(&self) -> Result<Option<SyncLogEntry>>;

    /// Flip every `running` row to `error` with `message`; returns rows changed
    fn fail_running_syncs(&self, message: &str, completed_at: i64) -> Result<usize>;

    /// Completion time (unix ms) of the newest successful or partial run
    fn last_successful_sync(&self) -> Result<Option<i64>>;

    /// Runs with status error or partial started at or after `since`
    fn count_errors_since(&self, since: i64) -> Result<i64>;
}
