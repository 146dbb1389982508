use proptest::prelude::*;

use covspan::annotate::annotate_line;
use covspan::model::{Range, StyledSegment};
use covspan::parsers::modules;

fn range(start: usize, end: usize, covered: bool) -> Range {
    // 0-based [start, end) character offsets to 1-based columns.
    Range {
        source_id: 0,
        start_line: 1,
        end_line: 1,
        start_column: start as i64 + 1,
        end_column: end as i64 + 1,
        covered,
    }
}

fn segments(line: &str, ranges: &[Range]) -> Vec<StyledSegment> {
    let lines = [line];
    annotate_line(&lines, 1, |_| ranges).unwrap().segments
}

fn concat(segments: &[StyledSegment]) -> String {
    segments.iter().map(|s| s.text.as_str()).collect()
}

/// A line plus a set of in-bounds, non-overlapping ranges sorted by column.
fn line_with_disjoint_ranges() -> impl Strategy<Value = (String, Vec<Range>)> {
    "[a-z (){};é]{0,40}".prop_flat_map(|line| {
        let len = line.chars().count();
        (
            Just(line),
            prop::collection::vec(0..=len, 0..12),
            prop::collection::vec(any::<bool>(), 6),
        )
            .prop_map(|(line, mut cuts, flags)| {
                cuts.sort_unstable();
                cuts.dedup();
                let ranges = cuts
                    .chunks_exact(2)
                    .zip(flags)
                    .map(|(pair, covered)| range(pair[0], pair[1], covered))
                    .collect();
                (line, ranges)
            })
    })
}

/// A line plus arbitrary (possibly overlapping) in-bounds ranges.
fn line_with_any_ranges() -> impl Strategy<Value = (String, Vec<Range>)> {
    "[a-z (){};]{1,40}".prop_flat_map(|line| {
        let len = line.chars().count();
        (
            Just(line),
            prop::collection::vec((0..=len, 0..=len, any::<bool>()), 0..8),
        )
            .prop_map(|(line, bounds)| {
                let mut ranges: Vec<Range> = bounds
                    .into_iter()
                    .map(|(a, b, covered)| range(a.min(b), a.max(b), covered))
                    .collect();
                ranges.sort_by_key(|r| (r.start_column, r.end_column));
                (line, ranges)
            })
    })
}

proptest! {
    #[test]
    fn segments_reproduce_line((line, ranges) in line_with_disjoint_ranges()) {
        let segments = segments(&line, &ranges);
        prop_assert_eq!(concat(&segments), line);
        prop_assert_eq!(
            segments.iter().filter(|s| s.covered.is_some()).count(),
            ranges.len()
        );
    }

    #[test]
    fn no_column_is_styled_twice((line, ranges) in line_with_any_ranges()) {
        let segments = segments(&line, &ranges);

        // Segments are emitted left to right, so rebuilding the line from
        // them proves no column appears in two segments.
        prop_assert_eq!(concat(&segments), line.clone());

        let mut column = 1i64;
        let mut styled: Vec<(i64, i64)> = Vec::new();
        for segment in &segments {
            let width = segment.text.chars().count() as i64;
            if segment.covered.is_some() && width > 0 {
                styled.push((column, column + width));
            }
            column += width;
        }
        for pair in styled.windows(2) {
            prop_assert!(pair[0].1 <= pair[1].0);
        }
        // Every styled column lies inside some range.
        for &(from, to) in &styled {
            prop_assert!(ranges
                .iter()
                .any(|r| r.start_column <= from && to <= r.end_column.max(r.start_column)));
        }
    }

    #[test]
    fn totals_match_module_sums(counts in prop::collection::vec((0u64..500, 0u64..500), 0..6)) {
        let mut xml = String::from("<results><modules>");
        for (i, (covered, not_covered)) in counts.iter().enumerate() {
            xml.push_str(&format!(
                r#"<module id="m{i}" name="m{i}" path="m{i}" blocks_covered="{covered}" blocks_not_covered="{not_covered}"/>"#
            ));
        }
        xml.push_str("</modules></results>");

        let report = modules::parse(xml.as_bytes()).unwrap();
        let expected: u64 = counts.iter().map(|(c, n)| c + n).sum();
        prop_assert_eq!(report.total_blocks, expected);
        prop_assert!(report.blocks_covered <= report.total_blocks);
        prop_assert_eq!(report.modules.len(), counts.len());
    }
}
