//! Staging directory file provider
//!
//! Copies CSV exports from one or more source folders (a synced document
//! library, a network share) into the input directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::domain::result::Result;
use crate::ports::{FetchResult, FileProvider};

pub struct StagingDirectoryProvider {
    sources: Vec<PathBuf>,
}

impl StagingDirectoryProvider {
    pub fn new(sources: Vec<PathBuf>) -> Self {
        Self { sources }
    }

    fn is_csv(path: &Path) -> bool {
        path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
    }
}

impl FileProvider for StagingDirectoryProvider {
    fn name(&self) -> &str {
        "staging"
    }

    fn fetch(&self, dest_dir: &Path) -> Result<FetchResult> {
        fs::create_dir_all(dest_dir)?;
        let mut result = FetchResult::default();

        for source in &self.sources {
            let entries = match fs::read_dir(source) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Cannot read staging directory {}: {}", source.display(), e);
                    result
                        .warnings
                        .push(format!("{}: {}", source.display(), e));
                    continue;
                }
            };

            let mut copied = 0;
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if !Self::is_csv(&path) {
                    continue;
                }
                let target = dest_dir.join(entry.file_name());
                if target == path {
                    continue;
                }
                match fs::copy(&path, &target) {
                    Ok(_) => {
                        result.files.push(target);
                        copied += 1;
                    }
                    Err(e) => result
                        .warnings
                        .push(format!("{}: {}", path.display(), e)),
                }
            }
            info!("Copied {} CSV files from {}", copied, source.display());
        }

        result.files.sort();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fetch_copies_only_csv_files() {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::write(source.path().join("budget_2024_1001.csv"), "x").unwrap();
        fs::write(source.path().join("README.txt"), "x").unwrap();

        let provider = StagingDirectoryProvider::new(vec![source.path().to_path_buf()]);
        let result = provider.fetch(&dest.path().join("in")).unwrap();

        assert_eq!(result.files.len(), 1);
        assert!(dest.path().join("in/budget_2024_1001.csv").exists());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_missing_source_is_a_warning() {
        let dest = TempDir::new().unwrap();
        let provider = StagingDirectoryProvider::new(vec![dest.path().join("missing")]);
        let result = provider.fetch(dest.path()).unwrap();

        assert!(result.files.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }
}
