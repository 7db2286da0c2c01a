//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use duckdb::{params, Connection};
use rust_decimal::Decimal;
use tracing::warn;

use crate::domain::result::{Error, Result};
use crate::domain::{AccountMapping, BudgetEntry, SyncCompletion, SyncLogEntry, SyncStatus};
use crate::ports::Repository;
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("could not set lock on file")
}

const SYNC_LOG_COLUMNS: &str = "id, entity, operation, status, record_count, error_message, details,
                                started_at, completed_at, duration_ms";

/// DuckDB repository implementation
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) a database file.
    ///
    /// Retries with exponential backoff when the file is locked by another
    /// process, e.g. the HTTP server and a CLI invocation starting together.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut attempt = 0;
        loop {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        warn!(
                            "Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        attempt += 1;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Autoloading extensions is never needed and breaks on signed macOS builds
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    /// Path of the database file, None for in-memory databases
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    /// Run database migrations
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    fn row_to_sync_log(row: &duckdb::Row) -> duckdb::Result<SyncLogEntry> {
        let status: String = row.get(3)?;
        let details: Option<String> = row.get(6)?;
        Ok(SyncLogEntry {
            id: row.get(0)?,
            entity: row.get(1)?,
            operation: row.get(2)?,
            // Unknown values only appear if someone edited the table by hand
            status: SyncStatus::from_str(&status).unwrap_or(SyncStatus::Error),
            record_count: row.get(4)?,
            error_message: row.get(5)?,
            details: details.and_then(|d| serde_json::from_str(&d).ok()),
            started_at: row.get(7)?,
            completed_at: row.get(8)?,
            duration_ms: row.get(9)?,
        })
    }
}

impl Repository for DuckDbRepository {
    fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))?;
        Ok(())
    }

    // === Account mappings ===

    fn replace_account_mappings(&self, mappings: &[AccountMapping]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM account_mapping", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO account_mapping (account_number, agreement_number, mapping_description,
                                              category, sub_category, account_key)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )?;
            for m in mappings {
                stmt.execute(params![
                    m.account_number,
                    m.agreement_number,
                    m.mapping_description,
                    m.category,
                    m.sub_category,
                    m.account_key,
                ])?;
            }
        }
        tx.commit()?;
        Ok(mappings.len())
    }

    fn get_account_mappings(&self) -> Result<Vec<AccountMapping>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT account_number, agreement_number, mapping_description, category, sub_category,
                    account_key
             FROM account_mapping
             ORDER BY rowid",
        )?;
        let mappings = stmt
            .query_map([], |row| {
                Ok(AccountMapping {
                    account_number: row.get(0)?,
                    agreement_number: row.get(1)?,
                    mapping_description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    category: row.get(3)?,
                    sub_category: row.get(4)?,
                    account_key: row.get(5)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(mappings)
    }

    fn count_account_mappings(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count = conn.query_row("SELECT COUNT(*) FROM account_mapping", [], |row| row.get(0))?;
        Ok(count)
    }

    // === Budget ===

    fn replace_budget_entries(&self, entries: &[BudgetEntry]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM budget", [])?;
        {
            // Amounts go through VARCHAR so no precision is lost on the way in
            let mut stmt = tx.prepare(
                "INSERT INTO budget (account_number, mapping_description, category, sub_category,
                                     year, month, amount, agreement_number, account_key)
                 VALUES (?, ?, ?, ?, ?, ?, CAST(? AS DECIMAL(18, 4)), ?, ?)",
            )?;
            for e in entries {
                stmt.execute(params![
                    e.account_number,
                    e.mapping_description,
                    e.category,
                    e.sub_category,
                    e.year,
                    e.month,
                    e.amount.to_string(),
                    e.agreement_number,
                    e.account_key,
                ])?;
            }
        }
        tx.commit()?;
        Ok(entries.len())
    }

    fn get_budget_entries(&self) -> Result<Vec<BudgetEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT account_number, mapping_description, category, sub_category, year, month,
                    amount::VARCHAR, agreement_number, account_key
             FROM budget
             ORDER BY agreement_number, year, month, mapping_description",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let month: i32 = row.get(5)?;
                let amount: String = row.get(6)?;
                Ok((
                    BudgetEntry {
                        account_number: row.get(0)?,
                        mapping_description: row.get(1)?,
                        category: row.get(2)?,
                        sub_category: row.get(3)?,
                        year: row.get(4)?,
                        month: month as u32,
                        amount: Decimal::ZERO,
                        agreement_number: row.get(7)?,
                        account_key: row.get(8)?,
                    },
                    amount,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(mut entry, amount)| {
                entry.amount = Decimal::from_str(&amount)
                    .map_err(|e| Error::database(format!("Bad amount '{}': {}", amount, e)))?
                    .normalize();
                Ok(entry)
            })
            .collect()
    }

    fn count_budget_entries(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count = conn.query_row("SELECT COUNT(*) FROM budget", [], |row| row.get(0))?;
        Ok(count)
    }

    fn count_agreements(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count = conn.query_row(
            "SELECT COUNT(DISTINCT agreement_number) FROM budget",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // === Sync log ===

    fn insert_sync_log(&self, entity: &str, operation: &str, started_at: i64) -> Result<i64> {
        let conn = self.lock()?;
        let id = conn.query_row(
            "INSERT INTO sys_sync_logs (entity, operation, status, record_count, started_at)
             VALUES (?, ?, ?, 0, ?)
             RETURNING id",
            params![entity, operation, SyncStatus::Running.as_str(), started_at],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn complete_sync_log(&self, id: i64, completion: &SyncCompletion) -> Result<()> {
        let conn = self.lock()?;
        let details = completion
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        conn.execute(
            "UPDATE sys_sync_logs
             SET status = ?, record_count = ?, error_message = ?, details = ?,
                 completed_at = ?, duration_ms = ? - started_at
             WHERE id = ?",
            params![
                completion.status.as_str(),
                completion.record_count,
                completion.error_message,
                details,
                completion.completed_at,
                completion.completed_at,
                id,
            ],
        )?;
        Ok(())
    }

    fn get_sync_logs(&self, entity_filter: Option<&str>, limit: usize) -> Result<Vec<SyncLogEntry>> {
        let conn = self.lock()?;
        let pattern = format!("%{}%", entity_filter.unwrap_or(""));
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_sync_logs
             WHERE entity LIKE ?
             ORDER BY started_at DESC, id DESC
             LIMIT ?",
            SYNC_LOG_COLUMNS
        ))?;
        let logs = stmt
            .query_map(params![pattern, limit as i64], Self::row_to_sync_log)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(logs)
    }

    fn get_running_sync(&self) -> Result<Option<SyncLogEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_sync_logs
             WHERE status = 'running'
             ORDER BY started_at DESC
             LIMIT 1",
            SYNC_LOG_COLUMNS
        ))?;
        let mut rows = stmt.query_map([], Self::row_to_sync_log)?;
        let running = rows.next().transpose()?;
        Ok(running)
    }

    fn fail_running_syncs(&self, message: &str, completed_at: i64) -> Result<usize> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE sys_sync_logs
             SET status = 'error', error_message = ?, completed_at = ?, duration_ms = ? - started_at
             WHERE status = 'running'",
            params![message, completed_at, completed_at],
        )?;
        Ok(changed)
    }

    fn last_successful_sync(&self) -> Result<Option<i64>> {
        let conn = self.lock()?;
        let last = conn.query_row(
            "SELECT MAX(completed_at) FROM sys_sync_logs WHERE status IN ('success', 'partial')",
            [],
            |row| row.get(0),
        )?;
        Ok(last)
    }

    fn count_errors_since(&self, since: i64) -> Result<i64> {
        let conn = self.lock()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM sys_sync_logs
             WHERE started_at >= ? AND status IN ('error', 'partial')",
            [since],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
