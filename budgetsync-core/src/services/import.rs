//! Import service - runs one end-to-end import
//!
//! discovery → mapping load → mapping reconcile → budget load → budget
//! reconcile. Per-file problems are collected and never abort the run;
//! storage problems and empty stages do.

use std::collections::HashSet;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::adapters::InMemoryRepository;
use crate::domain::result::{Error, Result};
use crate::domain::SyncStatus;
use crate::ports::{FileProvider, Repository};
use crate::services::budget::{load_budget_file, reconcile_budgets, BudgetFileStats};
use crate::services::discovery::discover;
use crate::services::mapping::{load_mapping_file, reconcile_mappings};
use crate::services::source::{file_label, LoaderOptions};
use crate::services::sync_log::SyncLogService;

/// Lock paths held by this process
static HELD_LOCKS: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Exclusive right to run an import against one data directory.
///
/// Combines an in-process registry with an OS file lock, so a second run
/// is refused whether it comes from this process or another one.
#[derive(Debug)]
pub struct ImportGuard {
    file: File,
    path: PathBuf,
}

impl ImportGuard {
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        {
            let mut held = HELD_LOCKS
                .lock()
                .map_err(|e| Error::Other(format!("Lock registry poisoned: {}", e)))?;
            if !held.insert(lock_path.to_path_buf()) {
                return Err(Error::ImportInProgress);
            }
        }

        let release = || {
            if let Ok(mut held) = HELD_LOCKS.lock() {
                held.remove(lock_path);
            }
        };

        let file = match OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path)
        {
            Ok(file) => file,
            Err(e) => {
                release();
                return Err(e.into());
            }
        };
        if file.try_lock_exclusive().is_err() {
            release();
            return Err(Error::ImportInProgress);
        }

        Ok(Self {
            file,
            path: lock_path.to_path_buf(),
        })
    }

    /// Whether some run, in this process or another, holds the lock
    pub fn is_held(lock_path: &Path) -> bool {
        if HELD_LOCKS
            .lock()
            .map(|held| held.contains(lock_path))
            .unwrap_or(false)
        {
            return true;
        }
        let Ok(file) = OpenOptions::new().write(true).open(lock_path) else {
            return false;
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                false
            }
            Err(_) => true,
        }
    }
}

impl Drop for ImportGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        if let Ok(mut held) = HELD_LOCKS.lock() {
            held.remove(&self.path);
        }
    }
}

/// Pipeline position; the final value is reported in the summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStage {
    Idle,
    Discovering,
    LoadingMappings,
    ReconcilingMappings,
    LoadingBudgets,
    ReconcilingBudgets,
    Done,
    Failed,
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImportStage::Idle => "idle",
            ImportStage::Discovering => "discovering",
            ImportStage::LoadingMappings => "loading mappings",
            ImportStage::ReconcilingMappings => "reconciling mappings",
            ImportStage::LoadingBudgets => "loading budgets",
            ImportStage::ReconcilingBudgets => "reconciling budgets",
            ImportStage::Done => "done",
            ImportStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    /// Completed with per-file errors
    Partial,
    /// Nothing to import; tables untouched
    Skipped,
    Failed,
}

impl RunStatus {
    pub fn sync_status(&self) -> SyncStatus {
        match self {
            RunStatus::Success => SyncStatus::Success,
            RunStatus::Partial => SyncStatus::Partial,
            RunStatus::Skipped => SyncStatus::Skipped,
            RunStatus::Failed => SyncStatus::Error,
        }
    }

    /// Partial runs count as success for callers
    pub fn is_success(&self) -> bool {
        !matches!(self, RunStatus::Failed)
    }
}

/// A source file that was skipped
#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    pub file: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub input_dir: PathBuf,
    pub loader: LoaderOptions,
    /// Run against a throwaway in-memory store
    pub dry_run: bool,
    /// Ask the file provider for fresh files first
    pub fetch: bool,
}

impl ImportOptions {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            loader: LoaderOptions::default(),
            dry_run: false,
            fetch: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub status: RunStatus,
    /// Last stage reached
    pub stage: ImportStage,
    pub dry_run: bool,
    pub input_dir: PathBuf,
    pub mapping_files: usize,
    pub budget_files: usize,
    pub mapping_files_loaded: usize,
    pub budget_files_loaded: usize,
    /// Mapping rows read, before dedup
    pub mapping_rows_loaded: usize,
    /// Mapping rows written
    pub mapping_rows: usize,
    /// Budget rows produced, before dedup
    pub budget_rows_loaded: usize,
    /// Budget rows written
    pub budget_rows: usize,
    pub cash_flow_retained: usize,
    pub unmatched_dropped: usize,
    /// Amounts dropped for not fitting the budget table
    pub out_of_range: usize,
    pub unmatched_descriptions: Vec<String>,
    pub files: Vec<BudgetFileStats>,
    pub fetched_files: usize,
    pub errors: Vec<FileError>,
    pub warnings: Vec<String>,
    pub failure_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl ImportSummary {
    fn new(options: &ImportOptions) -> Self {
        Self {
            status: RunStatus::Success,
            stage: ImportStage::Idle,
            dry_run: options.dry_run,
            input_dir: options.input_dir.clone(),
            mapping_files: 0,
            budget_files: 0,
            mapping_files_loaded: 0,
            budget_files_loaded: 0,
            mapping_rows_loaded: 0,
            mapping_rows: 0,
            budget_rows_loaded: 0,
            budget_rows: 0,
            cash_flow_retained: 0,
            unmatched_dropped: 0,
            out_of_range: 0,
            unmatched_descriptions: Vec::new(),
            files: Vec::new(),
            fetched_files: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            failure_reason: None,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Message stored in the sync log
    pub fn error_message(&self) -> Option<String> {
        if let Some(reason) = &self.failure_reason {
            return Some(reason.clone());
        }
        if self.errors.is_empty() {
            return None;
        }
        Some(
            self.errors
                .iter()
                .map(|e| format!("{}: {}", e.file, e.message))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        error!("Import failed while {}: {}", self.stage, reason);
        self.status = RunStatus::Failed;
        self.failure_reason = Some(reason);
        self.stage = ImportStage::Failed;
    }

    fn file_error(&mut self, path: &Path, err: &Error) {
        let file = file_label(path);
        warn!("Skipping {}: {}", file, err);
        self.errors.push(FileError {
            file,
            message: err.to_string(),
        });
    }
}

/// Import service shared by the CLI and the HTTP server
pub struct ImportService {
    repository: Arc<dyn Repository>,
    sync_log: SyncLogService,
    provider: Option<Arc<dyn FileProvider>>,
    lock_path: PathBuf,
}

impl ImportService {
    pub fn new(
        repository: Arc<dyn Repository>,
        provider: Option<Arc<dyn FileProvider>>,
        lock_path: PathBuf,
    ) -> Self {
        let sync_log = SyncLogService::new(Arc::clone(&repository));
        Self {
            repository,
            sync_log,
            provider,
            lock_path,
        }
    }

    /// Run an import, logging it to the sync history.
    ///
    /// Fails only when another run holds the guard; every other problem is
    /// reported in the returned summary.
    pub fn run(&self, options: &ImportOptions) -> Result<ImportSummary> {
        if options.dry_run {
            info!("Dry run: using an in-memory store");
            // Fetching writes into the shared input dir
            let _guard = if options.fetch {
                Some(ImportGuard::acquire(&self.lock_path)?)
            } else {
                None
            };
            let scratch = InMemoryRepository::new();
            let mut summary = ImportSummary::new(options);
            self.fetch(options, &mut summary);
            self.execute(options, &scratch, &mut summary);
            return Ok(summary);
        }

        let _guard = ImportGuard::acquire(&self.lock_path)?;
        let mut summary = ImportSummary::new(options);

        // Sync-log trouble must not stop the import itself
        if let Err(e) = self.sync_log.recover_interrupted() {
            warn!("Could not recover interrupted runs: {}", e);
        }
        let entity = if options.fetch { "remote_import" } else { "csv_import" };
        let log_id = match self.sync_log.start(entity, "import") {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Could not record sync start: {}", e);
                None
            }
        };

        self.fetch(options, &mut summary);
        self.execute(options, self.repository.as_ref(), &mut summary);

        if let Some(id) = log_id {
            if let Err(e) = self.sync_log.finish(id, &summary) {
                warn!("Could not record sync result: {}", e);
            }
        }
        Ok(summary)
    }

    fn fetch(&self, options: &ImportOptions, summary: &mut ImportSummary) {
        if !options.fetch {
            return;
        }
        let Some(provider) = &self.provider else {
            summary
                .warnings
                .push("No file provider configured; using files already present".to_string());
            return;
        };
        info!("Fetching files with provider '{}'", provider.name());
        match provider.fetch(&options.input_dir) {
            Ok(result) => {
                summary.fetched_files = result.files.len();
                summary.warnings.extend(result.warnings);
            }
            Err(e) => {
                warn!("Fetch with '{}' failed: {}", provider.name(), e);
                summary
                    .warnings
                    .push(format!("Fetch with '{}' failed: {}", provider.name(), e));
            }
        }
    }

    /// The pipeline proper, against an explicit store
    fn execute(
        &self,
        options: &ImportOptions,
        repository: &dyn Repository,
        summary: &mut ImportSummary,
    ) {
        let started = Instant::now();
        run_pipeline(options, repository, summary);
        summary.duration_ms = started.elapsed().as_millis() as i64;
        info!(
            "Import {:?} in {}ms: {} mapping rows, {} budget rows, {} file errors",
            summary.status,
            summary.duration_ms,
            summary.mapping_rows,
            summary.budget_rows,
            summary.errors.len()
        );
    }
}

fn run_pipeline(options: &ImportOptions, repository: &dyn Repository, summary: &mut ImportSummary) {
    summary.stage = ImportStage::Discovering;
    let files = match discover(&options.input_dir) {
        Ok(files) => files,
        Err(e) => return summary.fail(format!("discovery failed: {}", e)),
    };
    summary.mapping_files = files.mapping_files.len();
    summary.budget_files = files.budget_files.len();

    if !files.is_complete() {
        let missing = if files.mapping_files.is_empty() {
            "mapping"
        } else {
            "budget"
        };
        warn!(
            "No {} files in {}; nothing imported",
            missing,
            options.input_dir.display()
        );
        summary.warnings.push(format!(
            "No {} files found in {}",
            missing,
            options.input_dir.display()
        ));
        summary.status = RunStatus::Skipped;
        summary.stage = ImportStage::Done;
        return;
    }

    summary.stage = ImportStage::LoadingMappings;
    let mut mapping_batches = Vec::new();
    for path in &files.mapping_files {
        match load_mapping_file(path, &options.loader) {
            Ok(rows) => {
                summary.mapping_files_loaded += 1;
                summary.mapping_rows_loaded += rows.len();
                mapping_batches.push(rows);
            }
            Err(e) => summary.file_error(path, &e),
        }
    }
    if summary.mapping_rows_loaded == 0 {
        return summary.fail("no valid mapping rows");
    }

    summary.stage = ImportStage::ReconcilingMappings;
    let lookup = match reconcile_mappings(mapping_batches, repository) {
        Ok((written, lookup)) => {
            summary.mapping_rows = written;
            lookup
        }
        Err(e) => return summary.fail(format!("saving mappings failed: {}", e)),
    };

    summary.stage = ImportStage::LoadingBudgets;
    let mut budget_batches = Vec::new();
    let mut seen_unmatched = HashSet::new();
    for path in &files.budget_files {
        match load_budget_file(path, &lookup, &options.loader) {
            Ok(result) => {
                summary.budget_files_loaded += 1;
                summary.budget_rows_loaded += result.entries.len();
                summary.cash_flow_retained += result.stats.cash_flow_retained;
                summary.unmatched_dropped += result.stats.unmatched_dropped;
                summary.out_of_range += result.stats.out_of_range;
                for description in result.unmatched_descriptions {
                    if seen_unmatched.insert(description.clone()) {
                        summary.unmatched_descriptions.push(description);
                    }
                }
                summary.files.push(result.stats);
                budget_batches.push(result.entries);
            }
            Err(e) => summary.file_error(path, &e),
        }
    }
    if summary.unmatched_dropped > 0 {
        summary.warnings.push(format!(
            "{} budget rows had no account mapping and were dropped",
            summary.unmatched_dropped
        ));
    }
    if summary.out_of_range > 0 {
        summary.warnings.push(format!(
            "{} budget amounts were too large to store and were dropped",
            summary.out_of_range
        ));
    }
    if summary.budget_rows_loaded == 0 {
        return summary.fail("no valid budget rows");
    }

    summary.stage = ImportStage::ReconcilingBudgets;
    match reconcile_budgets(budget_batches, repository) {
        Ok(written) => summary.budget_rows = written,
        Err(e) => return summary.fail(format!("saving budget failed: {}", e)),
    }

    summary.stage = ImportStage::Done;
    summary.status = if summary.errors.is_empty() {
        RunStatus::Success
    } else {
        RunStatus::Partial
    };
}
