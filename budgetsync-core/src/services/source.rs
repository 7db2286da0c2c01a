//! Reading source CSV exports
//!
//! Exports come out of spreadsheet tools: `;` separated, sometimes with a
//! UTF-8 BOM, sometimes in Windows-1252.

use std::fs;
use std::path::Path;

use encoding_rs::WINDOWS_1252;
use tracing::debug;

use crate::domain::result::Result;
use crate::domain::PLACEHOLDER_AGREEMENT;

/// Year used for budget files whose name carries none
pub const DEFAULT_FALLBACK_YEAR: i32 = 2024;

/// Per-run knobs shared by the loaders
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub fallback_year: i32,
    pub default_agreement: String,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            fallback_year: DEFAULT_FALLBACK_YEAR,
            default_agreement: PLACEHOLDER_AGREEMENT.to_string(),
        }
    }
}

/// Read a file as text, stripping a BOM and falling back to Windows-1252
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(_) => {
            debug!("{} is not UTF-8, decoding as Windows-1252", path.display());
            let (decoded, _, _) = WINDOWS_1252.decode(bytes);
            Ok(decoded.into_owned())
        }
    }
}

/// Headerless `;` reader; rows may have differing widths
pub fn semicolon_reader(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes())
}

/// File name for messages and logs
pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_text_strips_bom() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.csv");
        fs::write(&path, b"\xEF\xBB\xBFAccount;Mapping\n").unwrap();
        assert_eq!(read_text(&path).unwrap(), "Account;Mapping\n");
    }

    #[test]
    fn test_read_text_decodes_windows_1252() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.csv");
        // "Lønninger" with ø as a single 0xF8 byte
        fs::write(&path, b"L\xF8nninger;1\n").unwrap();
        assert_eq!(read_text(&path).unwrap(), "Lønninger;1\n");
    }

    #[test]
    fn test_semicolon_reader_is_flexible() {
        let mut reader = semicolon_reader("a;b;c\nd\n");
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 3);
        assert_eq!(&rows[1][0], "d");
    }
}
