//! Integration tests for multi-component flows (scan -> parse -> cache ->
//! generate), mirroring the teacher's `tests/it/{cargo,fs,passthrough}.rs`
//! layout with one submodule per flow.

use tempfile::TempDir;

pub mod cache;
pub mod config;
pub mod mainfile;
pub mod scan_and_parse;

/// A throwaway directory containing one or more stavefiles, for tests that
/// need a real filesystem to scan.
#[track_caller]
pub fn temporary_directory() -> TempDir {
    TempDir::new().expect("create temporary directory")
}
