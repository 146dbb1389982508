#![no_main]
use libfuzzer_sys::fuzz_target;

use covspan::annotate::annotate_lines;
use covspan::model::Range;

/// Two line bytes and two full-width columns.
const RANGE_BYTES: usize = 18;

fn column(bytes: &[u8]) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    i64::from_le_bytes(raw)
}

fuzz_target!(|data: &[u8]| {
    // The first bytes describe ranges, the rest is source text.
    let (head, rest) = data.split_at(data.len().min(RANGE_BYTES * 8));
    let Ok(text) = std::str::from_utf8(rest) else {
        return;
    };
    let lines: Vec<&str> = text.lines().collect();

    let mut ranges: Vec<Range> = head
        .chunks_exact(RANGE_BYTES)
        .map(|c| Range {
            source_id: 0,
            start_line: i64::from(c[0] % 8),
            end_line: i64::from(c[1] % 8),
            start_column: column(&c[2..10]),
            end_column: column(&c[10..18]),
            covered: c[0] & 0x80 != 0,
        })
        .collect();
    ranges.sort_by_key(|r| (r.start_line, r.start_column, r.end_column));

    // Annotator must not panic on any range geometry.
    let _ = annotate_lines(&lines, |line| {
        let line = i64::from(line);
        let start = ranges.partition_point(|r| r.start_line < line);
        let end = start + ranges[start..].partition_point(|r| r.start_line == line);
        &ranges[start..end]
    });
});
