//! In-memory repository, used for dry runs and tests

use std::sync::{Mutex, MutexGuard};

use crate::domain::result::{Error, Result};
use crate::domain::{AccountMapping, BudgetEntry, SyncCompletion, SyncLogEntry, SyncStatus};
use crate::ports::Repository;

#[derive(Debug, Default)]
struct Tables {
    mappings: Vec<AccountMapping>,
    budget: Vec<BudgetEntry>,
    sync_logs: Vec<SyncLogEntry>,
}

/// Repository backed by plain vectors
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }
}

impl Repository for InMemoryRepository {
    fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }

    fn replace_account_mappings(&self, mappings: &[AccountMapping]) -> Result<usize> {
        let mut keys = std::collections::HashSet::new();
        if let Some(dup) = mappings.iter().find(|m| !keys.insert(m.account_key.as_str())) {
            return Err(Error::database(format!(
                "Duplicate account_key '{}'",
                dup.account_key
            )));
        }
        self.lock()?.mappings = mappings.to_vec();
        Ok(mappings.len())
    }

    fn get_account_mappings(&self) -> Result<Vec<AccountMapping>> {
        Ok(self.lock()?.mappings.clone())
    }

    fn count_account_mappings(&self) -> Result<i64> {
        Ok(self.lock()?.mappings.len() as i64)
    }

    fn replace_budget_entries(&self, entries: &[BudgetEntry]) -> Result<usize> {
        self.lock()?.budget = entries.to_vec();
        Ok(entries.len())
    }

    fn get_budget_entries(&self) -> Result<Vec<BudgetEntry>> {
        let mut entries = self.lock()?.budget.clone();
        entries.sort_by(|a, b| {
            (&a.agreement_number, a.year, a.month, &a.mapping_description).cmp(&(
                &b.agreement_number,
                b.year,
                b.month,
                &b.mapping_description,
            ))
        });
        Ok(entries)
    }

    fn count_budget_entries(&self) -> Result<i64> {
        Ok(self.lock()?.budget.len() as i64)
    }

    fn count_agreements(&self) -> Result<i64> {
        let tables = self.lock()?;
        let agreements: std::collections::HashSet<&str> = tables
            .budget
            .iter()
            .map(|e| e.agreement_number.as_str())
            .collect();
        Ok(agreements.len() as i64)
    }

    fn insert_sync_log(&self, entity: &str, operation: &str, started_at: i64) -> Result<i64> {
        let mut tables = self.lock()?;
        let id = tables.sync_logs.len() as i64 + 1;
        tables.sync_logs.push(SyncLogEntry {
            id,
            entity: entity.to_string(),
            operation: operation.to_string(),
            status: SyncStatus::Running,
            record_count: 0,
            error_message: None,
            details: None,
            started_at,
            completed_at: None,
            duration_ms: None,
        });
        Ok(id)
    }

    fn complete_sync_log(&self, id: i64, completion: &SyncCompletion) -> Result<()> {
        let mut tables = self.lock()?;
        if let Some(entry) = tables.sync_logs.iter_mut().find(|e| e.id == id) {
            entry.status = completion.status;
            entry.record_count = completion.record_count;
            entry.error_message = completion.error_message.clone();
            entry.details = completion.details.clone();
            entry.completed_at = Some(completion.completed_at);
            entry.duration_ms = Some(completion.completed_at - entry.started_at);
        }
        Ok(())
    }

    fn get_sync_logs(&self, entity_filter: Option<&str>, limit: usize) -> Result<Vec<SyncLogEntry>> {
        let tables = self.lock()?;
        let mut logs: Vec<SyncLogEntry> = tables
            .sync_logs
            .iter()
            .filter(|e| entity_filter.map_or(true, |f| e.entity.contains(f)))
            .cloned()
            .collect();
        logs.sort_by(|a, b| (b.started_at, b.id).cmp(&(a.started_at, a.id)));
        logs.truncate(limit);
        Ok(logs)
    }

    fn get_running_sync(&self) -> Result<Option<SyncLogEntry>> {
        Ok(self
            .get_sync_logs(None, usize::MAX)?
            .into_iter()
            .find(|e| e.status == SyncStatus::Running))
    }

    fn fail_running_syncs(&self, message: &str, completed_at: i64) -> Result<usize> {
        let mut tables = self.lock()?;
        let mut changed = 0;
        for entry in tables
            .sync_logs
            .iter_mut()
            .filter(|e| e.status == SyncStatus::Running)
        {
            entry.status = SyncStatus::Error;
            entry.error_message = Some(message.to_string());
            entry.completed_at = Some(completed_at);
            entry.duration_ms = Some(completed_at - entry.started_at);
            changed += 1;
        }
        Ok(changed)
    }

    fn last_successful_sync(&self) -> Result<Option<i64>> {
        let tables = self.lock()?;
        Ok(tables
            .sync_logs
            .iter()
            .filter(|e| matches!(e.status, SyncStatus::Success | SyncStatus::Partial))
            .filter_map(|e| e.completed_at)
            .max())
    }

    fn count_errors_since(&self, since: i64) -> Result<i64> {
        let tables = self.lock()?;
        Ok(tables
            .sync_logs
            .iter()
            .filter(|e| e.started_at >= since)
            .filter(|e| matches!(e.status, SyncStatus::Error | SyncStatus::Partial))
            .count() as i64)
    }
}
