//! Turns coverage ranges into styled text segments.
//!
//! Ranges for a line are applied left to right with a cursor into the
//! current physical line. Text before a range is emitted unstyled, the
//! range itself styled by its covered flag, and whatever is left after the
//! last range unstyled. Text is never emitted twice: a range that ends at
//! or before the cursor is dropped, one that starts before it is clipped.
//!
//! A range spanning several lines pulls those lines into the same
//! [`AnnotatedBlock`], separated by explicit line-break segments, and the
//! caller continues after the block's last line. Ranges that start on the
//! block's last line are applied after the multi-line range; ranges that
//! start on lines it swallowed are dropped.
//!
//! Columns are 1-based character positions with an exclusive end, clamped
//! to the line length. A start column below 1, or a range whose end lies
//! before its start, makes the line fall back to its raw text.

use tracing::{debug, trace};

use crate::index::CoverageIndex;
use crate::model::{AnnotatedBlock, Range, StyledSegment};

/// Annotate every line of `source` for `path`, using column ranges when the
/// report has them and line hit counts otherwise.
pub fn annotate_file(index: &CoverageIndex, path: &str, source: &str) -> Vec<AnnotatedBlock> {
    let lines: Vec<&str> = source.lines().collect();
    if index.has_ranges(path) {
        annotate_lines(&lines, |line| index.ranges_touching(path, line))
    } else {
        annotate_hits(&lines, |line| index.line_hits(path, line))
    }
}

/// Annotate all `lines` (index 0 is line 1) with ranges from `ranges_on`,
/// which must return the ranges starting on a line sorted by start column.
pub fn annotate_lines<'r, F>(lines: &[&str], ranges_on: F) -> Vec<AnnotatedBlock>
where
    F: Fn(u32) -> &'r [Range],
{
    let mut blocks = Vec::new();
    let mut line = 1;
    while let Some(block) = annotate_line(lines, line, &ranges_on) {
        line = block.next_line();
        blocks.push(block);
    }
    blocks
}

/// Annotate the block starting at `line_number` (1-based). Returns `None`
/// past the end of the file. The block may cover more than one physical
/// line; continue with [`AnnotatedBlock::next_line`].
pub fn annotate_line<'r, F>(lines: &[&str], line_number: u32, ranges_on: F) -> Option<AnnotatedBlock>
where
    F: Fn(u32) -> &'r [Range],
{
    if line_number == 0 || line_number as usize > lines.len() {
        return None;
    }

    let mut block = BlockBuilder::new(lines, line_number);
    let mut pending = ranges_on(line_number);

    'lines: loop {
        for (i, range) in pending.iter().enumerate() {
            match block.apply(range) {
                Step::Continue => {}
                Step::Fallback => {
                    debug!(line = block.line, ?range, "invalid range geometry, showing raw line");
                    block.fallback();
                    break 'lines;
                }
                Step::Advanced => {
                    let dropped = pending.len() - i - 1;
                    if dropped > 0 {
                        trace!(line = line_number, dropped, "ranges occluded by multi-line range");
                    }
                    pending = ranges_on(block.line);
                    continue 'lines;
                }
            }
        }
        break;
    }

    Some(block.finish())
}

/// Annotate each line as a whole from per-line hit counts: hit lines are
/// covered, instrumented lines with zero hits are not, others are unstyled.
pub fn annotate_hits<F>(lines: &[&str], hits_on: F) -> Vec<AnnotatedBlock>
where
    F: Fn(u32) -> Option<u64>,
{
    (1u32..)
        .zip(lines)
        .map(|(line_number, text)| AnnotatedBlock {
            first_line: line_number,
            last_line: line_number,
            segments: vec![StyledSegment {
                text: (*text).to_string(),
                covered: hits_on(line_number).map(|hits| hits > 0),
            }],
        })
        .collect()
}

enum Step {
    Continue,
    /// A multi-line range moved the builder to a later physical line.
    Advanced,
    Fallback,
}

struct BlockBuilder<'a> {
    lines: &'a [&'a str],
    first_line: u32,
    /// Current physical line, 1-based.
    line: u32,
    /// Index into `segments` where the current physical line begins.
    line_start: usize,
    /// Character offset into the current physical line.
    cursor: usize,
    segments: Vec<StyledSegment>,
}

impl<'a> BlockBuilder<'a> {
    fn new(lines: &'a [&'a str], line: u32) -> Self {
        Self {
            lines,
            first_line: line,
            line,
            line_start: 0,
            cursor: 0,
            segments: Vec::new(),
        }
    }

    fn text(&self) -> &'a str {
        self.lines[self.line as usize - 1]
    }

    fn last_line_of_file(&self) -> u32 {
        u32::try_from(self.lines.len()).unwrap_or(u32::MAX)
    }

    fn apply(&mut self, range: &Range) -> Step {
        if range.start_column < 1
            || range.end_line < range.start_line
            || (range.end_line == range.start_line && range.end_column < range.start_column)
        {
            return Step::Fallback;
        }

        let text = self.text();
        let len = text.chars().count();
        let start = column_offset(range.start_column, len);

        if !range.is_multi_line() {
            let end = column_offset(range.end_column, len);
            if end <= self.cursor {
                trace!(line = self.line, ?range, "range already rendered, skipping");
                return Step::Continue;
            }
            let from = start.max(self.cursor);
            self.push_plain(slice_chars(text, self.cursor, from));
            self.segments
                .push(StyledSegment::styled(slice_chars(text, from, end), range.covered));
            self.cursor = end;
            return Step::Continue;
        }

        let from = start.max(self.cursor);
        self.push_plain(slice_chars(text, self.cursor, from));
        self.segments
            .push(StyledSegment::styled(slice_chars(text, from, len), range.covered));
        self.cursor = len;

        let end_line = u32::try_from(range.end_line).unwrap_or(u32::MAX);
        let last = end_line.min(self.last_line_of_file());
        if last <= self.line {
            return Step::Continue;
        }

        for line in self.line + 1..=last {
            self.segments.push(StyledSegment::line_break());
            self.line = line;
            self.line_start = self.segments.len();
            let text = self.text();
            let len = text.chars().count();
            let end = if line == end_line {
                column_offset(range.end_column, len)
            } else {
                // Intermediate line, or the range was clamped to the file end.
                len
            };
            self.segments
                .push(StyledSegment::styled(slice_chars(text, 0, end), range.covered));
            self.cursor = end;
        }
        Step::Advanced
    }

    /// Replace everything built for the current physical line by its raw text.
    fn fallback(&mut self) {
        self.segments.truncate(self.line_start);
        let text = self.text();
        self.segments.push(StyledSegment::plain(text));
        self.cursor = text.chars().count();
    }

    fn push_plain(&mut self, text: &str) {
        self.segments.push(StyledSegment::plain(text));
    }

    fn finish(mut self) -> AnnotatedBlock {
        let text = self.text();
        let tail = slice_chars(text, self.cursor, text.chars().count());
        if !tail.is_empty() || self.segments.is_empty() {
            self.push_plain(tail);
        }
        AnnotatedBlock {
            first_line: self.first_line,
            last_line: self.line,
            segments: self.segments,
        }
    }
}

/// 0-based character offset of a 1-based column, clamped to `[0, len]`.
fn column_offset(column: i64, len: usize) -> usize {
    usize::try_from(column.saturating_sub(1)).map_or(0, |c| c.min(len))
}

/// Substring between two character offsets.
fn slice_chars(text: &str, from: usize, to: usize) -> &str {
    let byte = |n: usize| text.char_indices().nth(n).map_or(text.len(), |(i, _)| i);
    &text[byte(from)..byte(to)]
}
