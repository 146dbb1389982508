#![allow(dead_code)]

use std::path::PathBuf;
use tempfile::TempDir;

pub const RESULTS_XML: &[u8] = include_bytes!("../fixtures/results.xml");
pub const COVERAGE_XML: &[u8] = include_bytes!("../fixtures/coverage.xml");
pub const CALCULATOR_CS: &str = include_str!("../fixtures/Calculator.cs");

/// Write `content` to `name` inside a fresh temporary directory, returning the
/// dir handle and the file path. The caller must hold onto `TempDir` to keep
/// the temp directory alive.
pub fn write_fixture(name: &str, content: &[u8]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    (dir, path)
}
