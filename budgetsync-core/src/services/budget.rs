//! Budget stage - melts monthly budget statements and joins them to mappings
//!
//! A budget export stacks an income statement, a balance sheet and a
//! cash-flow statement in one sheet, each introduced by a banner row. Rows
//! are matched to account mappings by description text; unmatched cash-flow
//! lines are kept, other unmatched lines are dropped and reported.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::result::{Error, Result};
use crate::domain::{storable_amount, BudgetEntry, MappingLookup, StatementSection};
use crate::ports::Repository;
use crate::services::discovery::parse_budget_file_name;
use crate::services::number::parse_amount;
use crate::services::source::{file_label, read_text, semicolon_reader, LoaderOptions};

/// Lines above the header row
const PREAMBLE_LINES: usize = 2;
const MONTHS: usize = 12;

static PRIMO_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)primo").expect("valid regex"));
static MARKER_ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(total|comments?)\s*(\(.*\))?\s*[[:punct:]]*$").expect("valid regex")
});
static INCOME_BANNER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^income\s+statement").expect("valid regex"));
static BALANCE_BANNER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^balance\s+sheet").expect("valid regex"));
static CASH_FLOW_BANNER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^cash[\s-]?flow\s+statement").expect("valid regex"));

/// First data-row index of each statement banner in a file
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SectionMarkers {
    pub income_statement: Option<usize>,
    pub balance_sheet: Option<usize>,
    pub cash_flow: Option<usize>,
}

impl SectionMarkers {
    /// Record banners from descriptions in row order
    pub fn scan<'a>(descriptions: impl IntoIterator<Item = &'a str>) -> Self {
        let mut markers = SectionMarkers::default();
        for (idx, description) in descriptions.into_iter().enumerate() {
            if CASH_FLOW_BANNER_RE.is_match(description) {
                markers.cash_flow.get_or_insert(idx);
            } else if BALANCE_BANNER_RE.is_match(description) {
                markers.balance_sheet.get_or_insert(idx);
            } else if INCOME_BANNER_RE.is_match(description) {
                markers.income_statement.get_or_insert(idx);
            }
        }
        markers
    }

    /// Section of the row at `row_idx`; a cash-flow banner takes precedence
    pub fn classify(&self, row_idx: usize) -> StatementSection {
        let seen = |marker: Option<usize>| marker.is_some_and(|m| m <= row_idx);
        if seen(self.cash_flow) {
            StatementSection::CashFlowStatement
        } else if seen(self.balance_sheet) {
            StatementSection::BalanceSheet
        } else if seen(self.income_statement) {
            StatementSection::IncomeStatement
        } else {
            StatementSection::Unknown
        }
    }
}

/// Whether a description is a banner, a total/comment marker, or empty
pub fn is_filtered_description(description: &str) -> bool {
    description.is_empty()
        || MARKER_ROW_RE.is_match(description)
        || INCOME_BANNER_RE.is_match(description)
        || BALANCE_BANNER_RE.is_match(description)
        || CASH_FLOW_BANNER_RE.is_match(description)
}

/// Column indices (0-based) holding the twelve months
fn month_window(headers: &[String]) -> Vec<usize> {
    let start = headers
        .iter()
        .position(|h| PRIMO_HEADER_RE.is_match(h))
        .map(|p| p + 1)
        .unwrap_or(1);
    (start..headers.len().min(start + MONTHS)).collect()
}

/// Per-file counters reported in the run summary
#[derive(Debug, Default, Clone, Serialize)]
pub struct BudgetFileStats {
    pub file: String,
    pub year: i32,
    pub agreement: String,
    /// Non-empty rows below the header
    pub data_rows: usize,
    /// Rows after melting, before any filtering
    pub long_rows: usize,
    pub matched: usize,
    pub cash_flow_retained: usize,
    pub unmatched_dropped: usize,
    /// Amounts too large for the budget table
    pub out_of_range: usize,
}

/// Output of loading one budget file
#[derive(Debug, Default)]
pub struct BudgetFileResult {
    pub stats: BudgetFileStats,
    pub entries: Vec<BudgetEntry>,
    /// Distinct descriptions dropped for lack of a mapping
    pub unmatched_descriptions: Vec<String>,
}

/// Parse one budget export into long-form entries
pub fn load_budget_file(
    path: &Path,
    lookup: &MappingLookup,
    options: &LoaderOptions,
) -> Result<BudgetFileResult> {
    let label = file_label(path);
    let (year, agreement) = parse_budget_file_name(&label, options);
    let text = read_text(path)?;
    let mut reader = semicolon_reader(&text);
    let mut records = reader.records().skip(PREAMBLE_LINES);

    let mut headers: Vec<String> = match records.next() {
        Some(header) => header?.iter().map(|h| h.trim().to_string()).collect(),
        None => return Err(Error::invalid_file(path, "missing header row")),
    };
    // Some exports leave the description column unlabelled: `Primo;January;...`
    if headers.first().is_some_and(|h| PRIMO_HEADER_RE.is_match(h)) {
        headers.insert(0, String::new());
    }
    let window = month_window(&headers);
    if window.is_empty() {
        return Err(Error::invalid_file(path, "no month columns"));
    }
    debug!("{}: month columns {:?}", label, window);

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in records {
        let cells: Vec<String> = record?.iter().map(|c| c.trim().to_string()).collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        rows.push(cells);
    }

    let markers = SectionMarkers::scan(rows.iter().map(|r| r[0].as_str()));
    let mut result = BudgetFileResult {
        stats: BudgetFileStats {
            file: label.clone(),
            year,
            agreement: agreement.clone(),
            data_rows: rows.len(),
            long_rows: rows.len() * window.len(),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut dropped = HashSet::new();

    for (row_idx, cells) in rows.iter().enumerate() {
        let description = cells[0].as_str();
        if is_filtered_description(description) {
            continue;
        }
        let mapping = lookup.get(description, &agreement);
        for (pos, &col) in window.iter().enumerate() {
            let Some(amount) = parse_amount(cells.get(col).map(String::as_str)) else {
                continue;
            };
            let Some(amount) = storable_amount(amount) else {
                debug!("{}: '{}' month {} out of range", label, description, pos + 1);
                result.stats.out_of_range += 1;
                continue;
            };
            let month = pos as u32 + 1;

            if let Some(mapping) = mapping {
                result
                    .entries
                    .push(BudgetEntry::mapped(mapping, year, month, amount));
                result.stats.matched += 1;
            } else if markers.classify(row_idx) == StatementSection::CashFlowStatement {
                result
                    .entries
                    .push(BudgetEntry::cash_flow(description, agreement.as_str(), year, month, amount));
                result.stats.cash_flow_retained += 1;
            } else {
                result.stats.unmatched_dropped += 1;
                if dropped.insert(description) {
                    result.unmatched_descriptions.push(description.to_string());
                }
            }
        }
    }

    if result.stats.out_of_range > 0 {
        warn!(
            "{}: dropped {} amounts too large to store",
            label, result.stats.out_of_range
        );
    }
    if result.stats.unmatched_dropped > 0 {
        warn!(
            "{}: dropped {} unmatched rows ({} descriptions)",
            label,
            result.stats.unmatched_dropped,
            result.unmatched_descriptions.len()
        );
    }
    info!(
        "{}: {} budget rows ({} matched, {} cash flow) for {} / {}",
        label,
        result.entries.len(),
        result.stats.matched,
        result.stats.cash_flow_retained,
        agreement,
        year
    );
    Ok(result)
}

/// Concatenate batches and keep the first entry per (description, agreement, year, month)
pub fn dedup_budget_entries(batches: Vec<Vec<BudgetEntry>>) -> Vec<BudgetEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for entry in batches.into_iter().flatten() {
        let (description, agreement, year, month) = entry.dedup_key();
        if seen.insert((description.to_string(), agreement.to_string(), year, month)) {
            entries.push(entry);
        }
    }
    entries
}

/// Replace the budget table with the deduplicated batches
pub fn reconcile_budgets(batches: Vec<Vec<BudgetEntry>>, repository: &dyn Repository) -> Result<usize> {
    let entries = dedup_budget_entries(batches);
    let written = repository.replace_budget_entries(&entries)?;
    info!("Replaced budget with {} rows", written);
    Ok(written)
}
