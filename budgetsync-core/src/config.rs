//! Configuration management
//!
//! Settings live in `settings.json` inside the data directory:
//! ```json
//! {
//!   "inputDir": "/srv/exports",
//!   "fallbackYear": 2024,
//!   "defaultAgreement": "0000000",
//!   "stagingDirs": ["/mnt/sharepoint/Budget"],
//!   "server": { "bind": "127.0.0.1:5000" }
//! }
//! ```
//! Unknown keys are ignored.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::domain::result::{Error, Result};
use crate::domain::PLACEHOLDER_AGREEMENT;
use crate::services::source::DEFAULT_FALLBACK_YEAR;
use crate::services::LoaderOptions;

pub const DEFAULT_BIND: &str = "127.0.0.1:5000";
pub const DATABASE_FILE: &str = "budgetsync.duckdb";
pub const LOCK_FILE: &str = "import.lock";
const SETTINGS_FILE: &str = "settings.json";
const DEFAULT_INPUT_DIR: &str = "input";

/// Raw settings.json structure
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    input_dir: Option<PathBuf>,
    #[serde(default)]
    fallback_year: Option<i32>,
    #[serde(default)]
    default_agreement: Option<String>,
    #[serde(default)]
    staging_dirs: Vec<PathBuf>,
    #[serde(default)]
    server: ServerSettings,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    #[serde(default)]
    bind: Option<String>,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Where discovery looks for CSV exports
    pub input_dir: PathBuf,
    pub fallback_year: i32,
    pub default_agreement: String,
    /// Source folders for the staging file provider
    pub staging_dirs: Vec<PathBuf>,
    pub bind: String,
}

impl Config {
    /// Load config from the data directory.
    ///
    /// `BUDGETSYNC_INPUT_DIR` and `BUDGETSYNC_BIND` override the file.
    /// A malformed settings file is reported and ignored.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let settings_path = data_dir.join(SETTINGS_FILE);

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Ignoring malformed {}: {}", settings_path.display(), e);
                SettingsFile::default()
            })
        } else {
            SettingsFile::default()
        };

        let input_dir = std::env::var_os("BUDGETSYNC_INPUT_DIR")
            .map(PathBuf::from)
            .or(raw.input_dir)
            .map(|dir| if dir.is_relative() { data_dir.join(dir) } else { dir })
            .unwrap_or_else(|| data_dir.join(DEFAULT_INPUT_DIR));

        let bind = std::env::var("BUDGETSYNC_BIND")
            .ok()
            .filter(|b| !b.is_empty())
            .or(raw.server.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        let default_agreement = raw
            .default_agreement
            .unwrap_or_else(|| PLACEHOLDER_AGREEMENT.to_string());
        if default_agreement.is_empty() {
            return Err(Error::Config("defaultAgreement must not be empty".to_string()));
        }

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            input_dir,
            fallback_year: raw.fallback_year.unwrap_or(DEFAULT_FALLBACK_YEAR),
            default_agreement,
            staging_dirs: raw.staging_dirs,
            bind,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join(LOCK_FILE)
    }

    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            fallback_year: self.fallback_year,
            default_agreement: self.default_agreement.clone(),
        }
    }
}
