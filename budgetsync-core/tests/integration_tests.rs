//! Integration tests for budgetsync-core
//!
//! Full imports against real DuckDB files in a temp directory. Source files
//! are written the way the accounting system exports them.
//!
//! Run with: cargo test --test integration_tests -- --nocapture

use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use rust_decimal::Decimal;

use budgetsync_core::adapters::{DuckDbRepository, InMemoryRepository};
use budgetsync_core::config::Config;
use budgetsync_core::ports::Repository;
use budgetsync_core::services::{ImportOptions, ImportService, RunStatus};
use budgetsync_core::{BudgetSyncContext, SyncStatus};

// ============================================================================
// Test Helpers
// ============================================================================

const BUDGET_HEADER: &str = "Budget 2024;;\nAgreement 1001;;\n\
    Primo;January;February;March;April;May;June;July;August;September;October;November;December\n";

/// Create a test repository with schema initialized
fn create_test_repo(temp_dir: &TempDir) -> Arc<DuckDbRepository> {
    let db_path = temp_dir.path().join("test.duckdb");
    let repo = DuckDbRepository::new(&db_path).expect("Failed to create repository");
    repo.ensure_schema().expect("Failed to initialize schema");
    Arc::new(repo)
}

fn create_import_service(temp_dir: &TempDir, repo: Arc<dyn Repository>) -> ImportService {
    ImportService::new(repo, None, temp_dir.path().join("import.lock"))
}

fn write_file(dir: &Path, name: &str, content: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), content).unwrap();
}

/// Budget line with the same value in all twelve months
fn budget_line(description: &str, value: &str) -> String {
    format!("{};0;{}\n", description, vec![value; 12].join(";"))
}

// ============================================================================
// End-to-end
// ============================================================================

#[test]
fn test_end_to_end_single_agreement() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    write_file(
        &input,
        "squaremeter_accounts_mapping_1001.csv",
        "Acc;Mapping\n100;Rent\n200;Tax\n",
    );
    write_file(
        &input,
        "budget_2024_1001.csv",
        &format!(
            "{}Rent;0;1700;1700;1700;1700;1700;1700;1700;1700;1700;1700;1700;1700\n",
            BUDGET_HEADER
        ),
    );

    let repo = create_test_repo(&temp_dir);
    let service = create_import_service(&temp_dir, repo.clone());
    let summary = service.run(&ImportOptions::new(&input)).unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.mapping_rows, 2);
    assert_eq!(summary.budget_rows, 12);

    let mappings = repo.get_account_mappings().unwrap();
    let rent = mappings.iter().find(|m| m.account_key == "100_1001").unwrap();
    assert_eq!(rent.mapping_description, "Rent");

    let budget = repo.get_budget_entries().unwrap();
    let january = budget.iter().find(|e| e.month == 1).unwrap();
    assert_eq!(january.account_key.as_deref(), Some("100_1001"));
    assert_eq!(january.year, 2024);
    assert_eq!(january.amount, Decimal::from(1700));
}

#[test]
fn test_oversized_amount_does_not_fail_import() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    write_file(
        &input,
        "squaremeter_accounts_mapping_1001.csv",
        "Acc;Mapping\n100;Rent\n",
    );
    write_file(
        &input,
        "budget_2024_1001.csv",
        &format!(
            "{}Rent;0;1234567890123456;1700;1.700,12345;1700;1700;1700;1700;1700;1700;1700;1700;1700\n",
            BUDGET_HEADER
        ),
    );

    let repo = create_test_repo(&temp_dir);
    let summary = create_import_service(&temp_dir, repo.clone())
        .run(&ImportOptions::new(&input))
        .unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.out_of_range, 1);
    assert_eq!(summary.budget_rows, 11);
    assert!(summary.warnings.iter().any(|w| w.contains("too large")));

    let budget = repo.get_budget_entries().unwrap();
    assert!(budget.iter().all(|e| e.month != 1));
    let march = budget.iter().find(|e| e.month == 3).unwrap();
    assert_eq!(march.amount, Decimal::new(17001235, 4));

    // The dry-run store must agree with DuckDB
    let memory = Arc::new(InMemoryRepository::new());
    let other_dir = TempDir::new().unwrap();
    create_import_service(&other_dir, memory.clone())
        .run(&ImportOptions::new(&input))
        .unwrap();
    assert_eq!(budget, memory.get_budget_entries().unwrap());
}

#[test]
fn test_reimport_replaces_tables() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    write_file(
        &input,
        "squaremeter_accounts_mapping_1001.csv",
        "Account;Mapping\n100;Rent\n200;Tax\n",
    );
    write_file(
        &input,
        "budget_2024_1001.csv",
        &format!("{}{}{}", BUDGET_HEADER, budget_line("Rent", "10"), budget_line("Tax", "5")),
    );

    let repo = create_test_repo(&temp_dir);
    let service = create_import_service(&temp_dir, repo.clone());
    service.run(&ImportOptions::new(&input)).unwrap();
    assert_eq!(repo.count_budget_entries().unwrap(), 24);

    // Tax disappears from both exports
    write_file(
        &input,
        "squaremeter_accounts_mapping_1001.csv",
        "Account;Mapping\n100;Rent\n",
    );
    write_file(
        &input,
        "budget_2024_1001.csv",
        &format!("{}{}", BUDGET_HEADER, budget_line("Rent", "11")),
    );
    service.run(&ImportOptions::new(&input)).unwrap();

    assert_eq!(repo.count_account_mappings().unwrap(), 1);
    let budget = repo.get_budget_entries().unwrap();
    assert_eq!(budget.len(), 12);
    assert!(budget.iter().all(|e| e.amount == Decimal::from(11)));
}

// ============================================================================
// Deduplication
// ============================================================================

#[test]
fn test_mapping_dedup_first_file_wins() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    // Both files carry agreement 5 once the suffix is parsed
    write_file(
        &input,
        "a_accounts_mapping_5.csv",
        "Account;Mapping;Category\n100;Rent;First\n",
    );
    write_file(
        &input,
        "b_accounts_mapping_5.csv",
        "Account;Mapping;Category\n100;Rent;Second\n",
    );
    write_file(
        &input,
        "budget_2024_5.csv",
        &format!("{}{}", BUDGET_HEADER, budget_line("Rent", "1")),
    );

    let repo = create_test_repo(&temp_dir);
    create_import_service(&temp_dir, repo.clone())
        .run(&ImportOptions::new(&input))
        .unwrap();

    let mappings = repo.get_account_mappings().unwrap();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].account_key, "100_5");
    assert_eq!(mappings[0].category.as_deref(), Some("First"));
    let budget = repo.get_budget_entries().unwrap();
    assert_eq!(budget[0].category.as_deref(), Some("First"));
}

#[test]
fn test_budget_dedup_across_files() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    write_file(
        &input,
        "squaremeter_accounts_mapping_1001.csv",
        "Account;Mapping\n100;Rent\n",
    );
    // Same agreement and year through both naming conventions
    write_file(
        &input,
        "budget_1001.csv",
        &format!("{}{}", BUDGET_HEADER, budget_line("Rent", "1")),
    );
    write_file(
        &input,
        "budget_2024_1001.csv",
        &format!("{}{}", BUDGET_HEADER, budget_line("Rent", "2")),
    );

    let repo = create_test_repo(&temp_dir);
    let summary = create_import_service(&temp_dir, repo.clone())
        .run(&ImportOptions::new(&input))
        .unwrap();

    assert_eq!(summary.budget_rows_loaded, 24);
    assert_eq!(summary.budget_rows, 12);
    // "budget_1001.csv" sorts first
    let budget = repo.get_budget_entries().unwrap();
    assert!(budget.iter().all(|e| e.amount == Decimal::from(1)));
}

// ============================================================================
// Statement sections
// ============================================================================

fn write_statement(input: &Path) {
    write_file(
        input,
        "squaremeter_accounts_mapping_1001.csv",
        "Account;Mapping;Category;Sub_Category\n\
         100;Rent;Income;Lease\n\
         110;Total Lease Income;Income;Lease\n\
         500;Cash at bank;Assets;Bank\n",
    );
    let body = [
        "INCOME STATEMENT (DKK);;\n".to_string(),
        budget_line("Rent", "1.740"),
        budget_line("Total Lease Income", "1.740"),
        budget_line("Misc income", "12,5"),
        budget_line("TOTAL", "3.480"),
        "BALANCE SHEET (DKK);;\n".to_string(),
        budget_line("Cash at bank", "19.428"),
        budget_line("Prepaid costs", "100"),
        "CASH-FLOW STATEMENT (DKK);;\n".to_string(),
        budget_line("Loan repayment", "-250"),
        budget_line("Total", "-250"),
    ]
    .concat();
    write_file(input, "budget_2024_1001.csv", &format!("{}{}", BUDGET_HEADER, body));
}

#[test]
fn test_sections_drive_unmatched_rows() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    write_statement(&input);

    let repo = create_test_repo(&temp_dir);
    let summary = create_import_service(&temp_dir, repo.clone())
        .run(&ImportOptions::new(&input))
        .unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.cash_flow_retained, 12);
    assert_eq!(summary.unmatched_dropped, 24);
    assert_eq!(
        summary.unmatched_descriptions,
        vec!["Misc income".to_string(), "Prepaid costs".to_string()]
    );
    assert!(!summary.warnings.is_empty());

    let budget = repo.get_budget_entries().unwrap();
    let descriptions: std::collections::HashSet<&str> =
        budget.iter().map(|e| e.mapping_description.as_str()).collect();
    assert_eq!(
        descriptions,
        ["Rent", "Total Lease Income", "Cash at bank", "Loan repayment"]
            .into_iter()
            .collect::<std::collections::HashSet<&str>>()
    );

    // Cash-flow line kept without a mapping
    let loan = budget
        .iter()
        .find(|e| e.mapping_description == "Loan repayment")
        .unwrap();
    assert!(loan.account_number.is_none());
    assert!(loan.account_key.is_none());
    assert_eq!(loan.sub_category.as_deref(), Some("Cash Flow"));
    assert_eq!(loan.amount, Decimal::from(-250));

    let cash = budget
        .iter()
        .find(|e| e.mapping_description == "Cash at bank")
        .unwrap();
    assert_eq!(cash.amount, Decimal::from(19428));
    assert_eq!(cash.category.as_deref(), Some("Assets"));
}

// ============================================================================
// Failure modes
// ============================================================================

#[test]
fn test_empty_input_dir_is_soft_noop() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    let summary = create_import_service(&temp_dir, repo.clone())
        .run(&ImportOptions::new(temp_dir.path().join("missing")))
        .unwrap();

    assert_eq!(summary.status, RunStatus::Skipped);
    assert_eq!(summary.mapping_files, 0);
    let logs = repo.get_sync_logs(None, 10).unwrap();
    assert_eq!(logs[0].status, SyncStatus::Skipped);
}

#[test]
fn test_all_budget_files_broken_fails_run() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    write_file(
        &input,
        "squaremeter_accounts_mapping_1001.csv",
        "Account;Mapping\n100;Rent\n",
    );
    write_file(&input, "budget_2024_1001.csv", "only\none line\n");

    let repo = create_test_repo(&temp_dir);
    let summary = create_import_service(&temp_dir, repo.clone())
        .run(&ImportOptions::new(&input))
        .unwrap();

    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].file, "budget_2024_1001.csv");

    let log = &repo.get_sync_logs(None, 1).unwrap()[0];
    assert_eq!(log.status, SyncStatus::Error);
    assert_eq!(log.error_message.as_deref(), Some("no valid budget rows"));
    assert!(log.duration_ms.is_some());
}

// ============================================================================
// Context
// ============================================================================

#[test]
fn test_context_imports_from_configured_dir() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    let staging = temp_dir.path().join("share");
    write_statement(&staging);
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(
        data_dir.join("settings.json"),
        format!(
            r#"{{"inputDir": "{}", "stagingDirs": ["{}"]}}"#,
            data_dir.join("inbox").display(),
            staging.display()
        ),
    )
    .unwrap();

    let context = BudgetSyncContext::new(&data_dir).unwrap();
    let mut options = context.import_options();
    options.input_dir = data_dir.join("inbox");
    options.fetch = true;
    let summary = context.import_service.run(&options).unwrap();

    assert_eq!(summary.fetched_files, 2);
    assert_eq!(summary.status, RunStatus::Success);
    let history = context.sync_log_service.history(None, None).unwrap();
    assert_eq!(history[0].entity, "remote_import");

    let status = context.status_service.quick_status();
    assert_eq!(status.database, "connected");
    assert_eq!(status.agreements, 1);
    assert!(status.last_successful_sync.is_some());
    assert!(!status.is_sync_running);
}

#[test]
fn test_in_memory_and_duckdb_agree() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    write_statement(&input);

    let duck = create_test_repo(&temp_dir);
    let memory = Arc::new(InMemoryRepository::new());
    let config = Config::load(temp_dir.path()).unwrap();
    let mut options = ImportOptions::new(&input);
    options.loader = config.loader_options();

    let other_dir = TempDir::new().unwrap();
    create_import_service(&temp_dir, duck.clone())
        .run(&options)
        .unwrap();
    create_import_service(&other_dir, memory.clone())
        .run(&options)
        .unwrap();

    assert_eq!(
        duck.get_budget_entries().unwrap(),
        memory.get_budget_entries().unwrap()
    );
    assert_eq!(
        duck.get_account_mappings().unwrap(),
        memory.get_account_mappings().unwrap()
    );
}
