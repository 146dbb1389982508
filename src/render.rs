//! Output formatting for annotated source and line listings.

use std::fmt::Write;

use crate::error::Result;
use crate::model::{AnnotatedBlock, StyledSegment};

/// Maximum number of non-instrumentable lines that can be bridged when
/// coalescing line numbers into ranges.
const MAX_BRIDGE_GAP: u32 = 2;

const ANSI_COVERED: &str = "\x1b[32m";
const ANSI_NOT_COVERED: &str = "\x1b[31;1m";
const ANSI_RESET: &str = "\x1b[0m";

/// Trait for turning annotated blocks into printable text.
pub trait BlockFormatter {
    /// Format all blocks of a file.
    fn format(&self, blocks: &[AnnotatedBlock]) -> Result<String>;
}

/// Terminal output with ANSI colours: green for covered, red for not covered.
pub struct AnsiFormatter {
    pub line_numbers: bool,
}

impl BlockFormatter for AnsiFormatter {
    fn format(&self, blocks: &[AnnotatedBlock]) -> Result<String> {
        Ok(write_blocks(blocks, self.line_numbers, |out, segment| {
            match segment.covered {
                Some(true) => write!(out, "{ANSI_COVERED}{}{ANSI_RESET}", segment.text),
                Some(false) => write!(out, "{ANSI_NOT_COVERED}{}{ANSI_RESET}", segment.text),
                None => out.write_str(&segment.text),
            }
        }))
    }
}

/// Plain text with inline markers: `[+covered+]` and `[-not covered-]`.
pub struct MarkerFormatter {
    pub line_numbers: bool,
}

impl BlockFormatter for MarkerFormatter {
    fn format(&self, blocks: &[AnnotatedBlock]) -> Result<String> {
        Ok(write_blocks(blocks, self.line_numbers, |out, segment| {
            match segment.covered {
                Some(true) => write!(out, "[+{}+]", segment.text),
                Some(false) => write!(out, "[-{}-]", segment.text),
                None => out.write_str(&segment.text),
            }
        }))
    }
}

/// The blocks themselves as JSON, for other tools to consume.
pub struct JsonFormatter;

impl BlockFormatter for JsonFormatter {
    fn format(&self, blocks: &[AnnotatedBlock]) -> Result<String> {
        let mut out = serde_json::to_string_pretty(blocks)?;
        out.push('\n');
        Ok(out)
    }
}

/// Walk the segments of every block, emitting a gutter at the start of each
/// physical line. Empty segments are not written.
fn write_blocks<F>(blocks: &[AnnotatedBlock], line_numbers: bool, mut write_segment: F) -> String
where
    F: FnMut(&mut String, &StyledSegment) -> std::fmt::Result,
{
    let width = blocks
        .last()
        .map_or(1, |b| b.last_line.to_string().len());
    let mut out = String::new();

    for block in blocks {
        let mut line = block.first_line;
        if line_numbers {
            write!(out, "{line:>width$} | ").unwrap();
        }
        for segment in &block.segments {
            if segment.is_line_break() {
                out.push('\n');
                line += 1;
                if line_numbers {
                    write!(out, "{line:>width$} | ").unwrap();
                }
            } else if !segment.text.is_empty() {
                write_segment(&mut out, segment).unwrap();
            }
        }
        out.push('\n');
    }
    out
}

/// Coalesce sorted line numbers into contiguous ranges, bridging small gaps.
///
/// Two runs are merged when every line between them is absent from
/// `all_instrumentable` and the gap is at most [`MAX_BRIDGE_GAP`] lines.
///
/// Both `lines` and `all_instrumentable` must be sorted and deduplicated.
#[must_use]
pub fn coalesce_ranges(lines: &[u32], all_instrumentable: &[u32]) -> Vec<(u32, u32)> {
    if lines.is_empty() {
        return Vec::new();
    }

    debug_assert!(
        lines.windows(2).all(|w| w[0] < w[1]),
        "coalesce_ranges requires sorted, deduplicated input"
    );

    let mut ranges: Vec<(u32, u32)> = Vec::new();
    let mut start = lines[0];
    let mut end = lines[0];

    for &line in &lines[1..] {
        let gap = line - end - 1;
        if gap <= MAX_BRIDGE_GAP
            && (end + 1..line).all(|l| all_instrumentable.binary_search(&l).is_err())
        {
            end = line;
        } else {
            ranges.push((start, end));
            start = line;
            end = line;
        }
    }

    ranges.push((start, end));
    ranges
}

/// Format line numbers into compact range notation, e.g. "1, 3-5, 8".
///
/// The input slice must be sorted in ascending order.
#[must_use]
pub fn format_line_ranges(lines: &[u32], all_instrumentable: &[u32]) -> String {
    coalesce_ranges(lines, all_instrumentable)
        .iter()
        .map(|&(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}-{end}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
