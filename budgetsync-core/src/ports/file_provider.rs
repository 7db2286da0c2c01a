//! File provider port
//!
//! A file provider deposits source CSV files into the input directory before
//! a run. What happens on the other side (remote document library, network
//! share, retries across API versions) is opaque to the pipeline.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::result::Result;

/// Result of fetching files into the input directory
#[derive(Debug, Default, Serialize)]
pub struct FetchResult {
    /// Files written into the destination directory
    pub files: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

pub trait FileProvider: Send + Sync {
    /// Provider name used in sync logs (e.g., "staging")
    fn name(&self) -> &str;

    /// Place source files into `dest_dir`
    fn fetch(&self, dest_dir: &Path) -> Result<FetchResult>;
}
