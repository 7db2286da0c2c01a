//! Mapping stage - loads account mapping exports and persists them

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::domain::result::{Error, Result};
use crate::domain::{AccountMapping, MappingLookup};
use crate::ports::Repository;
use crate::services::discovery::parse_mapping_file_name;
use crate::services::source::{file_label, read_text, semicolon_reader, LoaderOptions};

static ACCOUNT_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)account|nr").expect("valid regex"));
static DESCRIPTION_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)mapping").expect("valid regex"));

/// Resolved column positions of a mapping file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MappingColumns {
    account: usize,
    description: usize,
    category: Option<usize>,
    sub_category: Option<usize>,
}

fn detect_columns(file: &str, headers: &[String]) -> Result<MappingColumns> {
    let find = |re: &Regex, pattern: &str| {
        headers
            .iter()
            .position(|h| re.is_match(h))
            .ok_or_else(|| Error::MissingColumn {
                file: file.to_string(),
                pattern: pattern.to_string(),
                headers: headers.join(";"),
            })
    };
    let exact = |name: &str| headers.iter().position(|h| h.to_lowercase() == name);

    Ok(MappingColumns {
        account: find(&ACCOUNT_HEADER_RE, "account|nr")?,
        description: find(&DESCRIPTION_HEADER_RE, "mapping")?,
        category: exact("category"),
        sub_category: exact("sub_category"),
    })
}

/// Parse one mapping export.
///
/// Rows where every retained column is empty are dropped; anything else is
/// kept as written, including placeholder values like `#N/A`.
pub fn load_mapping_file(path: &Path, options: &LoaderOptions) -> Result<Vec<AccountMapping>> {
    let label = file_label(path);
    let agreement = parse_mapping_file_name(&label, options);
    let text = read_text(path)?;
    let mut reader = semicolon_reader(&text);
    let mut records = reader.records();

    let headers: Vec<String> = match records.next() {
        Some(header) => header?.iter().map(|h| h.trim().to_string()).collect(),
        None => return Err(Error::invalid_file(path, "file is empty")),
    };
    let columns = detect_columns(&label, &headers)?;
    debug!("{}: columns {:?}", label, columns);

    let mut mappings = Vec::new();
    for record in records {
        let record = record?;
        let cell = |idx: usize| record.get(idx).map(str::trim).unwrap_or("").to_string();
        let optional = |idx: Option<usize>| idx.map(cell).filter(|v| !v.is_empty());

        let account = cell(columns.account);
        let description = cell(columns.description);
        let category = optional(columns.category);
        let sub_category = optional(columns.sub_category);

        if account.is_empty() && description.is_empty() && category.is_none() && sub_category.is_none()
        {
            continue;
        }

        mappings.push(
            AccountMapping::new(account, agreement.clone(), description)
                .with_category(category)
                .with_sub_category(sub_category),
        );
    }

    info!("{}: {} mapping rows (agreement {})", label, mappings.len(), agreement);
    Ok(mappings)
}

/// Concatenate batches in discovery order and keep the first row per account key
pub fn dedup_mappings(batches: Vec<Vec<AccountMapping>>) -> Vec<AccountMapping> {
    let mut seen = HashSet::new();
    batches
        .into_iter()
        .flatten()
        .filter(|m| seen.insert(m.account_key.clone()))
        .collect()
}

/// Replace the mapping table and return the lookup the budget stage joins on.
///
/// The lookup is built from the table as reloaded, not from the input rows.
pub fn reconcile_mappings(
    batches: Vec<Vec<AccountMapping>>,
    repository: &dyn Repository,
) -> Result<(usize, MappingLookup)> {
    let mappings = dedup_mappings(batches);
    let written = repository.replace_account_mappings(&mappings)?;
    info!("Replaced account_mapping with {} rows", written);

    let lookup: MappingLookup = repository.get_account_mappings()?.into_iter().collect();
    Ok((written, lookup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryRepository;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_mapping_file() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "squaremeter_accounts_mapping_1001.csv",
            "Account;Mapping;Category;Sub_Category\n\
             100; Rent ;Income;Lease\n\
             ;;;\n\
             200;#N/A;;\n",
        );

        let rows = load_mapping_file(&path, &LoaderOptions::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].account_key, "100_1001");
        assert_eq!(rows[0].mapping_description, "Rent");
        assert_eq!(rows[0].category.as_deref(), Some("Income"));
        assert_eq!(rows[0].sub_category.as_deref(), Some("Lease"));
        assert_eq!(rows[1].mapping_description, "#N/A");
        assert!(rows[1].category.is_none());
    }

    #[test]
    fn test_column_detection_uses_first_match() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "squaremeter_accounts_mapping.csv",
            "Konto Nr;Tekst;Mapping Text\n42;ignored;Salaries\n",
        );

        let rows = load_mapping_file(&path, &LoaderOptions::default()).unwrap();
        assert_eq!(rows[0].account_number, "42");
        assert_eq!(rows[0].agreement_number, "0000000");
        assert_eq!(rows[0].mapping_description, "Salaries");
    }

    #[test]
    fn test_missing_description_column_is_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "squaremeter_accounts_mapping_1.csv", "Account;Text\n1;x\n");

        let err = load_mapping_file(&path, &LoaderOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { ref pattern, .. } if pattern == "mapping"));
    }

    #[test]
    fn test_dedup_keeps_first_per_account_key() {
        let rows = dedup_mappings(vec![
            vec![
                AccountMapping::new("100", "1001", "Rent"),
                AccountMapping::new("100", "1001", "Rent (dup)"),
            ],
            vec![AccountMapping::new("100", "2002", "Rent")],
        ]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].mapping_description, "Rent");
    }

    #[test]
    fn test_reconcile_builds_lookup_from_stored_rows() {
        let repo = InMemoryRepository::new();
        let (written, lookup) = reconcile_mappings(
            vec![vec![
                AccountMapping::new("100", "1001", "Rent"),
                AccountMapping::new("101", "1001", "Rent"),
            ]],
            &repo,
        )
        .unwrap();

        assert_eq!(written, 2);
        assert_eq!(lookup.len(), 1);
        assert_eq!(lookup.get("Rent", "1001").unwrap().account_number, "100");
        assert_eq!(repo.count_account_mappings().unwrap(), 2);
    }
}
