use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::detect::{detect_format, Format};
use crate::error::{CovspanError, Result};
use crate::index::CoverageIndex;
use crate::model::Coverage;
use crate::parsers;

/// A successfully parsed report together with its index.
#[derive(Debug)]
pub struct LoadedReport {
    pub path: PathBuf,
    pub format: Format,
    pub coverage: Coverage,
    pub index: CoverageIndex,
    pub loaded_at: DateTime<Utc>,
}

/// Read a coverage report, detect its schema (or use the override), parse
/// it fully and build the index.
pub fn load_report(path: &Path, format_override: Option<Format>) -> Result<LoadedReport> {
    let content = std::fs::read(path)?;
    parse_report(path, &content, format_override)
}

/// Same as [`load_report`] for content that is already in memory.
pub fn parse_report(
    path: &Path,
    content: &[u8],
    format_override: Option<Format>,
) -> Result<LoadedReport> {
    let format = match format_override {
        Some(format) => format,
        None => detect_format(path, content).ok_or(CovspanError::UnknownFormat)?,
    };

    let coverage = parsers::for_format(format).parse(content)?;
    let index = CoverageIndex::build(&coverage);

    info!(path = %path.display(), %format, files = index.files().len(), "loaded coverage report");

    Ok(LoadedReport {
        path: path.to_path_buf(),
        format,
        coverage,
        index,
        loaded_at: Utc::now(),
    })
}

/// Holds the report currently on display. A new load only replaces it once
/// the new document has been parsed completely; a failed load leaves the
/// previous report active.
#[derive(Debug, Default)]
pub struct Session {
    current: Option<LoadedReport>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, path: &Path, format_override: Option<Format>) -> Result<&LoadedReport> {
        match load_report(path, format_override) {
            Ok(report) => Ok(self.current.insert(report)),
            Err(e) => {
                if let Some(previous) = &self.current {
                    warn!(
                        path = %path.display(),
                        keeping = %previous.path.display(),
                        "load failed, keeping previous report: {e}"
                    );
                }
                Err(e)
            }
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<&LoadedReport> {
        self.current.as_ref()
    }

    /// Path of the report currently loaded.
    #[must_use]
    pub fn loaded_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|r| r.path.as_path())
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULES: &[u8] = br#"<results><modules>
  <module id="m" name="m" path="m" blocks_covered="6" blocks_not_covered="0">
    <source_files><source_file id="0" path="a.cs"/></source_files>
  </module>
</modules></results>"#;

    #[test]
    fn test_parse_report_detects_format() {
        let report = parse_report(Path::new("coverage.xml"), MODULES, None).unwrap();
        assert_eq!(report.format, Format::Modules);
        assert!(matches!(report.coverage, Coverage::Blocks(_)));
        assert_eq!(report.index.files(), vec!["a.cs"]);
    }

    #[test]
    fn test_parse_report_unknown_format() {
        let err = parse_report(Path::new("coverage.txt"), b"SF:a\nDA:1,1\n", None).unwrap_err();
        assert!(matches!(err, CovspanError::UnknownFormat));
    }

    #[test]
    fn test_parse_report_override_mismatch() {
        let err = parse_report(Path::new("coverage.xml"), MODULES, Some(Format::Cobertura)).unwrap_err();
        assert!(matches!(err, CovspanError::MalformedDocument(_)));
    }

    #[test]
    fn test_missing_file() {
        let mut session = Session::new();
        let err = session
            .load(Path::new("/nonexistent/coverage.xml"), None)
            .unwrap_err();
        assert!(matches!(err, CovspanError::Io(_)));
        assert!(session.current().is_none());
    }
}
