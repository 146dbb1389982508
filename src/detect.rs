/// Detection of which coverage-report schema a document uses.
///
/// Strategy:
///   1. Honour an explicit `--format` override (handled by caller)
///   2. Ask each parser whether the first bytes look like its schema:
///      a `<modules>` element means the module/range schema, a `<coverage>`
///      root means the cobertura-style schema
use std::path::Path;

use crate::error::CovspanError;
use crate::parsers;

/// Supported coverage report schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `modules/module/functions/function/ranges/range`, column-level ranges.
    Modules,
    /// `coverage/sources` + `packages/package/classes/class`, line hits only.
    Cobertura,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Modules => "modules",
            Format::Cobertura => "cobertura",
        }
    }
}

impl std::str::FromStr for Format {
    type Err = CovspanError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "modules" | "module" => Ok(Format::Modules),
            "cobertura" => Ok(Format::Cobertura),
            _ => Err(CovspanError::Parse(format!(
                "Unknown format: '{}'. Supported: modules, cobertura",
                s
            ))),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the report schema from file content. The path is only used for
/// diagnostics; both schemas are plain `.xml` files.
pub fn detect_format(path: &Path, content: &[u8]) -> Option<Format> {
    let detected = parsers::all()
        .iter()
        .find(|p| p.can_parse(content))
        .map(|p| p.format());
    if detected.is_none() {
        tracing::debug!(path = %path.display(), "no parser recognised the document");
    }
    detected
}
