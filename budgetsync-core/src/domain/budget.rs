//! Budget entry domain model

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::AccountMapping;

/// Sub-category assigned to cash-flow lines that have no account mapping
pub const CASH_FLOW_SUB_CATEGORY: &str = "Cash Flow";

/// Fractional digits kept by the `budget.amount` column (`DECIMAL(18, 4)`)
pub const AMOUNT_SCALE: u32 = 4;
/// Exclusive bound on the magnitude `DECIMAL(18, 4)` can hold: 10^14
const AMOUNT_LIMIT: i64 = 100_000_000_000_000;

/// Round an amount to storage scale.
///
/// Returns `None` when the integer part does not fit the column.
pub fn storable_amount(amount: Decimal) -> Option<Decimal> {
    let rounded = amount.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero);
    if rounded.abs() >= Decimal::from(AMOUNT_LIMIT) {
        return None;
    }
    Some(rounded.normalize())
}

/// One budgeted amount for a line item in a given month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetEntry {
    /// None for cash-flow lines without an account mapping
    pub account_number: Option<String>,
    pub mapping_description: String,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub year: i32,
    /// 1..=12, positional within the month window of the source file
    pub month: u32,
    pub amount: Decimal,
    pub agreement_number: String,
    /// Soft reference to `account_mapping.account_key`
    pub account_key: Option<String>,
}

impl BudgetEntry {
    /// Build an entry for a line that resolved to an account mapping
    pub fn mapped(mapping: &AccountMapping, year: i32, month: u32, amount: Decimal) -> Self {
        Self {
            account_number: Some(mapping.account_number.clone()),
            mapping_description: mapping.mapping_description.clone(),
            category: mapping.category.clone(),
            sub_category: mapping.sub_category.clone(),
            year,
            month,
            amount,
            agreement_number: mapping.agreement_number.clone(),
            account_key: Some(mapping.account_key.clone()),
        }
    }

    /// Build an entry for an unmapped cash-flow line
    pub fn cash_flow(
        description: impl Into<String>,
        agreement_number: impl Into<String>,
        year: i32,
        month: u32,
        amount: Decimal,
    ) -> Self {
        Self {
            account_number: None,
            mapping_description: description.into(),
            category: None,
            sub_category: Some(CASH_FLOW_SUB_CATEGORY.to_string()),
            year,
            month,
            amount,
            agreement_number: agreement_number.into(),
            account_key: None,
        }
    }

    /// Key used for budget deduplication
    pub fn dedup_key(&self) -> (&str, &str, i32, u32) {
        (
            self.mapping_description.as_str(),
            self.agreement_number.as_str(),
            self.year,
            self.month,
        )
    }
}

/// The stacked sections of a budget export, top to bottom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementSection {
    IncomeStatement,
    BalanceSheet,
    CashFlowStatement,
    /// Row precedes every banner
    Unknown,
}

impl fmt::Display for StatementSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatementSection::IncomeStatement => "Income Statement",
            StatementSection::BalanceSheet => "Balance Sheet",
            StatementSection::CashFlowStatement => "Cash Flow Statement",
            StatementSection::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}
