//! File discovery - finds mapping and budget exports in the input directory

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::result::Result;
use crate::services::source::LoaderOptions;

/// Conventional single-file names used when no tagged files exist
pub const FALLBACK_MAPPING_FILE: &str = "squaremeter_accounts_mapping.csv";
pub const FALLBACK_BUDGET_FILE: &str = "Budget.csv";

static MAPPING_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)accounts_mapping_.*\.csv$").expect("valid regex"));
static BUDGET_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^budget_.*\.csv$").expect("valid regex"));
static AGREEMENT_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_(\d+)\.csv$").expect("valid regex"));
static BUDGET_YEAR_AGREEMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)budget_(\d{4})_(\d+)\.csv$").expect("valid regex"));
static BUDGET_AGREEMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)budget_(\d+)\.csv$").expect("valid regex"));

/// Source files found for one run, each list in discovery order
#[derive(Debug, Default, Clone, Serialize)]
pub struct DiscoveredFiles {
    pub mapping_files: Vec<PathBuf>,
    pub budget_files: Vec<PathBuf>,
}

impl DiscoveredFiles {
    /// Both categories are needed for a run to do anything
    pub fn is_complete(&self) -> bool {
        !self.mapping_files.is_empty() && !self.budget_files.is_empty()
    }
}

/// List mapping and budget files in `dir`, sorted by file name.
///
/// A missing directory yields empty lists.
pub fn discover(dir: &Path) -> Result<DiscoveredFiles> {
    if !dir.is_dir() {
        info!("Input directory {} does not exist", dir.display());
        return Ok(DiscoveredFiles::default());
    }

    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    let pick = |re: &Regex, fallback: &str| -> Vec<PathBuf> {
        let matched: Vec<PathBuf> = names
            .iter()
            .filter(|n| re.is_match(n))
            .map(|n| dir.join(n))
            .collect();
        if !matched.is_empty() {
            return matched;
        }
        names
            .iter()
            .filter(|n| n.as_str() == fallback)
            .map(|n| dir.join(n))
            .collect()
    };

    let files = DiscoveredFiles {
        mapping_files: pick(&MAPPING_FILE_RE, FALLBACK_MAPPING_FILE),
        budget_files: pick(&BUDGET_FILE_RE, FALLBACK_BUDGET_FILE),
    };
    debug!(
        "Discovered {} mapping and {} budget files in {}",
        files.mapping_files.len(),
        files.budget_files.len(),
        dir.display()
    );
    Ok(files)
}

/// Agreement number of a mapping file, from its trailing `_<digits>.csv`
pub fn parse_mapping_file_name(file_name: &str, options: &LoaderOptions) -> String {
    AGREEMENT_SUFFIX_RE
        .captures(file_name)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| options.default_agreement.clone())
}

/// (year, agreement) of a budget file
pub fn parse_budget_file_name(file_name: &str, options: &LoaderOptions) -> (i32, String) {
    if let Some(c) = BUDGET_YEAR_AGREEMENT_RE.captures(file_name) {
        if let Ok(year) = c[1].parse() {
            return (year, c[2].to_string());
        }
    }
    if let Some(c) = BUDGET_AGREEMENT_RE.captures(file_name) {
        return (options.fallback_year, c[1].to_string());
    }
    (options.fallback_year, options.default_agreement.clone())
}
