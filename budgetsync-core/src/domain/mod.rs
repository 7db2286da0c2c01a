//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with no I/O.

mod budget;
mod mapping;
pub mod result;
mod sync_log;

pub use budget::{storable_amount, BudgetEntry, StatementSection, AMOUNT_SCALE, CASH_FLOW_SUB_CATEGORY};
pub use mapping::{account_key, AccountMapping, MappingLookup, PLACEHOLDER_AGREEMENT};
pub use sync_log::{SyncCompletion, SyncLogEntry, SyncStatus};
