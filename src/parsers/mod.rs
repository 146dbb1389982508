pub mod cobertura;
pub mod modules;

use std::borrow::Cow;
use std::str::FromStr;

use quick_xml::events::BytesStart;
use quick_xml::reader::Reader;

use crate::detect::Format;
use crate::error::{CovspanError, Result};
use crate::model::Coverage;

/// Every report schema parser implements this trait.
pub trait CoverageParser {
    /// The schema this parser reads.
    fn format(&self) -> Format;

    /// Cheap content sniff: does this document look like our schema?
    fn can_parse(&self, content: &[u8]) -> bool;

    /// Parse the whole document into the in-memory model. Either the full
    /// document is accepted or an error is returned; there is no partial
    /// result.
    fn parse(&self, input: &[u8]) -> Result<Coverage>;
}

/// All known parsers, in detection order.
pub fn all() -> [&'static dyn CoverageParser; 2] {
    [&modules::ModulesParser, &cobertura::CoberturaParser]
}

/// Look up the parser for an explicit format.
pub fn for_format(format: Format) -> &'static dyn CoverageParser {
    match format {
        Format::Modules => &modules::ModulesParser,
        Format::Cobertura => &cobertura::CoberturaParser,
    }
}

/// The first few KB of a document, lossily decoded, for format sniffing.
pub(crate) fn sniff_head(content: &[u8]) -> Cow<'_, str> {
    let head_len = content.len().min(4096);
    String::from_utf8_lossy(&content[..head_len])
}

pub(crate) fn looks_like_xml(head: &str) -> bool {
    let trimmed = head.trim_start_matches('\u{feff}').trim_start();
    trimmed.starts_with("<?xml") || trimmed.starts_with('<')
}

pub(crate) fn xml_reader(input: &[u8]) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);
    reader
}

/// Wrap a quick-xml error with the byte offset the reader had reached.
pub(crate) fn xml_err(e: quick_xml::Error, reader: &Reader<&[u8]>) -> CovspanError {
    CovspanError::Xml {
        source: e,
        position: reader.buffer_position(),
    }
}

/// Reject a start tag that the end of input cut off before its `>`.
/// Its attributes would otherwise be read as if the tag were complete.
pub(crate) fn ensure_tag_closed(input: &[u8], reader: &Reader<&[u8]>) -> Result<()> {
    let end = reader.buffer_position();
    if end >= input.len() && input.last() != Some(&b'>') {
        return Err(CovspanError::MalformedDocument(format!(
            "document ends inside a tag at position {end}"
        )));
    }
    Ok(())
}

/// Read and unescape a single attribute by name.
pub(crate) fn get_attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

pub(crate) fn require_attr(
    e: &BytesStart<'_>,
    element: &'static str,
    attribute: &'static str,
) -> Result<String> {
    get_attr(e, attribute.as_bytes())
        .ok_or(CovspanError::MissingAttribute { element, attribute })
}

/// A required attribute that must parse as `T`.
pub(crate) fn require_num<T: FromStr>(
    e: &BytesStart<'_>,
    element: &'static str,
    attribute: &'static str,
) -> Result<T> {
    let value = require_attr(e, element, attribute)?;
    parse_num(value, element, attribute)
}

/// An optional attribute; absent means `T::default()`, present but
/// unparseable is still an error.
pub(crate) fn optional_num<T: FromStr + Default>(
    e: &BytesStart<'_>,
    element: &'static str,
    attribute: &'static str,
) -> Result<T> {
    match get_attr(e, attribute.as_bytes()) {
        Some(value) => parse_num(value, element, attribute),
        None => Ok(T::default()),
    }
}

fn parse_num<T: FromStr>(value: String, element: &'static str, attribute: &'static str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| CovspanError::InvalidAttribute {
            element,
            attribute,
            value,
        })
}
