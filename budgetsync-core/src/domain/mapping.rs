//! Account mapping domain model

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Placeholder agreement used when a file name carries no agreement number
pub const PLACEHOLDER_AGREEMENT: &str = "0000000";

/// One row of the account-to-category mapping for an agreement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMapping {
    /// Account identifier as written in the export (not necessarily numeric)
    pub account_number: String,
    /// Tenant/agreement owning the mapping
    pub agreement_number: String,
    /// Free-text label budget rows are joined on
    pub mapping_description: String,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    /// `account_number + "_" + agreement_number`
    pub account_key: String,
}

impl AccountMapping {
    /// Create a mapping row, deriving the account key
    pub fn new(
        account_number: impl Into<String>,
        agreement_number: impl Into<String>,
        mapping_description: impl Into<String>,
    ) -> Self {
        let account_number = account_number.into();
        let agreement_number = agreement_number.into();
        let account_key = account_key(&account_number, &agreement_number);
        Self {
            account_number,
            agreement_number,
            mapping_description: mapping_description.into(),
            category: None,
            sub_category: None,
            account_key,
        }
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    pub fn with_sub_category(mut self, sub_category: Option<String>) -> Self {
        self.sub_category = sub_category;
        self
    }
}

/// Build the composite account key
pub fn account_key(account_number: &str, agreement_number: &str) -> String {
    format!("{}_{}", account_number, agreement_number)
}

/// In-memory lookup used by the budget stage.
///
/// Keyed by (mapping_description, agreement_number), not by account key:
/// budget exports identify lines by description text only. When several
/// mappings share a key the first one inserted wins.
#[derive(Debug, Default, Clone)]
pub struct MappingLookup {
    // agreement -> description -> mapping
    entries: HashMap<String, HashMap<String, AccountMapping>>,
}

impl MappingLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a mapping unless its key is already present
    pub fn insert(&mut self, mapping: AccountMapping) {
        self.entries
            .entry(mapping.agreement_number.clone())
            .or_default()
            .entry(mapping.mapping_description.clone())
            .or_insert(mapping);
    }

    pub fn get(&self, description: &str, agreement: &str) -> Option<&AccountMapping> {
        self.entries.get(agreement)?.get(description)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<AccountMapping> for MappingLookup {
    fn from_iter<I: IntoIterator<Item = AccountMapping>>(iter: I) -> Self {
        let mut lookup = MappingLookup::new();
        for mapping in iter {
            lookup.insert(mapping);
        }
        lookup
    }
}
