//! Lookup structure built once per loaded report.
//!
//! Ranges are grouped per source file and sorted by
//! `(start_line, start_column, end_column)`, so the ranges that begin on a
//! given line are one contiguous, already-ordered slice found by binary
//! search.

use std::collections::{BTreeMap, HashMap};

use crate::model::{BlockCounts, Coverage, CoverageReport, LineCounts, LineHitReport, Range};

#[derive(Debug, Default)]
pub struct CoverageIndex {
    /// Path -> source id. When two ids share a path the lowest id wins.
    source_ids: HashMap<String, u32>,
    /// Source id -> ranges, sorted.
    ranges: HashMap<u32, Vec<Range>>,
    /// Source id -> summed block counters of the functions attributed to it.
    blocks: HashMap<u32, BlockCounts>,
    /// Path -> line number -> hit count.
    line_hits: HashMap<String, BTreeMap<u32, u64>>,
}

impl CoverageIndex {
    pub fn build(coverage: &Coverage) -> Self {
        match coverage {
            Coverage::Blocks(report) => Self::from_blocks(report),
            Coverage::LineHits(report) => Self::from_line_hits(report),
        }
    }

    pub fn from_blocks(report: &CoverageReport) -> Self {
        let mut index = Self::default();

        // `source_files` is a BTreeMap, so ids are visited in ascending order.
        for file in report.source_files.values() {
            index
                .source_ids
                .entry(file.full_path.clone())
                .or_insert(file.id);
        }

        for range in &report.ranges {
            index
                .ranges
                .entry(range.source_id)
                .or_default()
                .push(range.clone());
        }
        for ranges in index.ranges.values_mut() {
            ranges.sort_by_key(|r| (r.start_line, r.start_column, r.end_column));
        }

        for function in &report.functions {
            if let Some(source_id) = function.source_id {
                *index.blocks.entry(source_id).or_default() += function.blocks();
            }
        }

        index
    }

    pub fn from_line_hits(report: &LineHitReport) -> Self {
        let mut index = Self::default();
        for record in report.records() {
            let hits = index
                .line_hits
                .entry(record.file_path.to_string())
                .or_default()
                .entry(record.line_number)
                .or_insert(0);
            // A line listed by several methods keeps its highest count.
            *hits = (*hits).max(record.hit_count);
        }
        index
    }

    /// Ranges of `path` that begin on `line_number`, ordered by start column,
    /// then end column. Unknown paths give an empty slice.
    #[must_use]
    pub fn ranges_touching(&self, path: &str, line_number: u32) -> &[Range] {
        let Some(ranges) = self
            .source_ids
            .get(path)
            .and_then(|id| self.ranges.get(id))
        else {
            return &[];
        };
        let line = i64::from(line_number);
        let start = ranges.partition_point(|r| r.start_line < line);
        let end = start + ranges[start..].partition_point(|r| r.start_line == line);
        &ranges[start..end]
    }

    /// Block counters summed over the functions attributed to `path`.
    /// `None` when the path is not part of the report.
    #[must_use]
    pub fn coverage_info(&self, path: &str) -> Option<BlockCounts> {
        let id = self.source_ids.get(path)?;
        Some(self.blocks.get(id).copied().unwrap_or_default())
    }

    /// Hit count recorded for a line, if the line was instrumented.
    #[must_use]
    pub fn line_hits(&self, path: &str, line_number: u32) -> Option<u64> {
        self.line_hits.get(path)?.get(&line_number).copied()
    }

    #[must_use]
    pub fn line_summary(&self, path: &str) -> Option<LineCounts> {
        let lines = self.line_hits.get(path)?;
        Some(LineCounts {
            instrumented: lines.len() as u64,
            hit: lines.values().filter(|&&h| h > 0).count() as u64,
        })
    }

    /// Instrumented lines of `path` with zero hits, ascending.
    #[must_use]
    pub fn uncovered_lines(&self, path: &str) -> Vec<u32> {
        self.line_hits
            .get(path)
            .map(|lines| {
                lines
                    .iter()
                    .filter(|(_, &h)| h == 0)
                    .map(|(&l, _)| l)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Instrumented lines of `path`, ascending.
    #[must_use]
    pub fn instrumented_lines(&self, path: &str) -> Vec<u32> {
        self.line_hits
            .get(path)
            .map(|lines| lines.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Whether column-level ranges exist for `path`.
    #[must_use]
    pub fn has_ranges(&self, path: &str) -> bool {
        self.source_ids
            .get(path)
            .is_some_and(|id| self.ranges.contains_key(id))
    }

    /// Whether `path` has any coverage data at all.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.source_ids.contains_key(path) || self.line_hits.contains_key(path)
    }

    /// Every file path known to the index, sorted.
    #[must_use]
    pub fn files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = self
            .source_ids
            .keys()
            .chain(self.line_hits.keys())
            .map(String::as_str)
            .collect();
        files.sort_unstable();
        files.dedup();
        files
    }
}
