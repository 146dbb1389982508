use thiserror::Error;

#[derive(Error, Debug)]
pub enum CovspanError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error at position {position}: {source}")]
    Xml {
        source: quick_xml::Error,
        position: usize,
    },

    #[error("Malformed coverage document: {0}")]
    MalformedDocument(String),

    #[error("Missing required attribute '{attribute}' on <{element}>")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("Invalid value '{value}' for attribute '{attribute}' on <{element}>")]
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },

    #[error("Range on line {line} references unknown source file id {source_id}")]
    UnresolvableReference { source_id: u32, line: i64 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown coverage format")]
    UnknownFormat,

    #[error("Parse error: {0}")]
    Parse(String),
}

impl CovspanError {
    /// Whether the document itself could not be read as a coverage report.
    #[must_use]
    pub fn is_malformed_document(&self) -> bool {
        matches!(self, Self::Xml { .. } | Self::MalformedDocument(_))
    }
}

pub type Result<T> = std::result::Result<T, CovspanError>;
