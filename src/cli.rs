//! Command handler functions for the covspan CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout.

use std::fmt::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use regex::Regex;

use crate::annotate::annotate_file;
use crate::load::LoadedReport;
use crate::model::Coverage;
use crate::render::{self, AnsiFormatter, BlockFormatter, JsonFormatter, MarkerFormatter};

/// Output style for the `show` command.
#[derive(Clone, Debug, ValueEnum)]
pub enum Style {
    Ansi,
    Markers,
    Json,
}

impl Style {
    pub fn formatter(&self, line_numbers: bool) -> Box<dyn BlockFormatter> {
        match self {
            Style::Ansi => Box::new(AnsiFormatter { line_numbers }),
            Style::Markers => Box::new(MarkerFormatter { line_numbers }),
            Style::Json => Box::new(JsonFormatter),
        }
    }
}

pub fn cmd_summary(report: &LoadedReport) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "Report:     {}", report.path.display()).unwrap();
    writeln!(out, "Format:     {}", report.format).unwrap();
    writeln!(
        out,
        "Loaded:     {}",
        report.loaded_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
    .unwrap();
    writeln!(out, "Files:      {}", report.index.files().len()).unwrap();

    match &report.coverage {
        Coverage::Blocks(blocks) => {
            let totals = blocks.blocks();
            writeln!(
                out,
                "Blocks:     {}/{} ({:.1}%)",
                totals.covered,
                totals.total(),
                totals.rate() * 100.0
            )
            .unwrap();
            writeln!(out, "Functions:  {}", blocks.functions.len()).unwrap();
            if !blocks.modules.is_empty() {
                writeln!(out).unwrap();
                writeln!(
                    out,
                    "{:<40} {:>8} {:>8} {:>8}",
                    "MODULE", "BLOCKS", "COVERED", "RATE"
                )
                .unwrap();
                writeln!(out, "{}", "-".repeat(67)).unwrap();
                for module in &blocks.modules {
                    let counts = module.blocks();
                    writeln!(
                        out,
                        "{:<40} {:>8} {:>8} {:>7.1}%",
                        module.name,
                        counts.total(),
                        counts.covered,
                        counts.rate() * 100.0
                    )
                    .unwrap();
                }
            }
        }
        Coverage::LineHits(hits) => {
            let mut instrumented = 0;
            let mut hit = 0;
            for path in report.index.files() {
                if let Some(counts) = report.index.line_summary(path) {
                    instrumented += counts.instrumented;
                    hit += counts.hit;
                }
            }
            writeln!(
                out,
                "Lines:      {}/{} ({:.1}%)",
                hit,
                instrumented,
                crate::model::rate(hit, instrumented) * 100.0
            )
            .unwrap();
            writeln!(out, "Classes:    {}", hits.classes.len()).unwrap();
            writeln!(out, "Sources:    {}", hits.sources.join(", ")).unwrap();
        }
    }
    Ok(out)
}

/// List per-file coverage. `filter` is a regular expression matched against
/// the stored file path.
pub fn cmd_files(
    report: &LoadedReport,
    filter: Option<&str>,
    sort_by_coverage: bool,
) -> Result<String> {
    let filter = filter
        .map(|pattern| {
            Regex::new(pattern).with_context(|| format!("Invalid --filter pattern '{pattern}'"))
        })
        .transpose()?;

    let (unit, mut rows): (&str, Vec<(&str, u64, u64, f64)>) = match &report.coverage {
        Coverage::Blocks(_) => (
            "BLOCKS",
            report
                .index
                .files()
                .into_iter()
                .filter_map(|path| {
                    let counts = report.index.coverage_info(path)?;
                    Some((path, counts.total(), counts.covered, counts.rate()))
                })
                .collect(),
        ),
        Coverage::LineHits(_) => (
            "LINES",
            report
                .index
                .files()
                .into_iter()
                .filter_map(|path| {
                    let counts = report.index.line_summary(path)?;
                    Some((path, counts.instrumented, counts.hit, counts.rate()))
                })
                .collect(),
        ),
    };

    if let Some(filter) = &filter {
        rows.retain(|(path, ..)| filter.is_match(path));
    }
    if sort_by_coverage {
        rows.sort_by(|a, b| a.3.total_cmp(&b.3));
    }

    let mut out = String::new();
    writeln!(
        out,
        "{:<60} {:>8} {:>8} {:>8}",
        "FILE", unit, "COVERED", "RATE"
    )
    .unwrap();
    writeln!(out, "{}", "-".repeat(87)).unwrap();

    for (path, total, covered, rate) in &rows {
        writeln!(
            out,
            "{:<60} {:>8} {:>8} {:>7.1}%",
            path,
            total,
            covered,
            rate * 100.0
        )
        .unwrap();
    }

    Ok(out)
}

/// Render a source file with its coverage. The text is read from `source`
/// when given, otherwise from the path stored in the report.
pub fn cmd_show(
    report: &LoadedReport,
    file: &str,
    source: Option<&Path>,
    style: &Style,
    line_numbers: bool,
) -> Result<String> {
    if !report.index.contains(file) {
        bail!("No coverage data for '{}'", file);
    }

    let source_path = source.unwrap_or_else(|| Path::new(file));
    let text = std::fs::read_to_string(source_path)
        .with_context(|| format!("Failed to read source file {}", source_path.display()))?;

    let blocks = annotate_file(&report.index, file, &text);
    let out = style.formatter(line_numbers).format(&blocks)?;
    Ok(out)
}

pub fn cmd_lines(report: &LoadedReport, file: &str, uncovered: bool) -> Result<String> {
    let lines = report.index.instrumented_lines(file);
    if lines.is_empty() {
        bail!("No line coverage data for '{}'", file);
    }

    if uncovered {
        let uncovered_lines = report.index.uncovered_lines(file);

        if uncovered_lines.is_empty() {
            return Ok(format!(
                "All instrumentable lines are covered in '{}'\n",
                file
            ));
        }

        let mut out = String::new();
        writeln!(out, "Uncovered lines in '{}':", file).unwrap();
        writeln!(
            out,
            "  {}",
            render::format_line_ranges(&uncovered_lines, &lines)
        )
        .unwrap();
        writeln!(out, "  ({} lines)", uncovered_lines.len()).unwrap();
        Ok(out)
    } else {
        let mut out = String::new();
        writeln!(out, "{:>6}  {:>10}", "LINE", "HITS").unwrap();
        writeln!(out, "{}", "-".repeat(18)).unwrap();
        for line in lines {
            let hits = report.index.line_hits(file, line).unwrap_or_default();
            let marker = if hits > 0 { "✓" } else { "✗" };
            writeln!(out, "{:>6}  {:>10}  {}", line, hits, marker).unwrap();
        }
        Ok(out)
    }
}
