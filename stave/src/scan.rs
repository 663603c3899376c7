//! Source Scanner (spec.md §4.A): enumerate candidate stavefile sources
//! under a directory.
//!
//! Walks with `walkdir`, the teacher's default walker for single-directory
//! scans (`jwalk` is reserved, as in the teacher, for parallel whole-tree
//! copies this engine has no need for).

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::error::StaveError;

/// The sentinel line the Scanner looks for before any other non-comment,
/// non-blank line (spec.md §6 "Build tag contract", elaborated in
/// SPEC_FULL.md). Rust has no `//go:build`-style compiler pragma, so this is
/// a convention the Scanner enforces and the Mainfile Generator (4.D)
/// reproduces verbatim as the first line of the generated dispatcher.
pub const BUILD_TAG: &str = "// stave:target-file";

/// Name of the dedicated stavefiles subdirectory, when present (spec.md
/// §4.A): every `.rs` file directly under it belongs to the scan regardless
/// of whether it carries [`BUILD_TAG`].
pub const DEDICATED_SUBDIR: &str = "stavefiles";

/// Enumerate the absolute paths of every stavefile source under
/// `source_dir`, in a deterministic (lexicographic) order.
///
/// If `source_dir/stavefiles/` exists, every `.rs` file directly under it is
/// included, tag or no tag. Otherwise the scan is the top-level `.rs` files
/// of `source_dir` that carry [`BUILD_TAG`] as their first non-comment,
/// non-blank line.
#[instrument(skip_all, fields(source_dir = %source_dir.display()))]
pub fn scan(source_dir: &Path) -> Result<Vec<PathBuf>, StaveError> {
    if !source_dir.is_dir() {
        return Err(StaveError::Config(format!(
            "source directory {} does not exist or is not a directory",
            source_dir.display()
        )));
    }

    let dedicated = source_dir.join(DEDICATED_SUBDIR);
    let mut files = if dedicated.is_dir() {
        debug!(dir = %dedicated.display(), "scanning dedicated stavefiles subdirectory");
        list_rust_files(&dedicated, false)?
    } else {
        debug!("no dedicated stavefiles subdirectory; scanning tagged top-level files");
        list_rust_files(source_dir, true)?
    };

    files.sort();
    check_no_conflicting_crate_names(&files)?;
    Ok(files)
}

/// List `.rs` files directly under `dir` (no recursion — a stavefile package
/// is always a flat directory of sources, matching how a single Mage
/// package lives in one directory). When `require_tag` is set, only files
/// whose first non-comment, non-blank line is [`BUILD_TAG`] are returned.
fn list_rust_files(dir: &Path, require_tag: bool) -> Result<Vec<PathBuf>, StaveError> {
    let mut out = Vec::new();
    let entries = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok());

    for entry in entries {
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "rs") {
            continue;
        }
        if require_tag {
            let contents = std::fs::read_to_string(path).map_err(|err| {
                StaveError::Config(format!("reading {}: {err}", path.display()))
            })?;
            if !has_build_tag(&contents) {
                continue;
            }
        }
        out.push(path.to_path_buf());
    }
    Ok(out)
}

/// Whether `contents`' first non-comment, non-blank line is [`BUILD_TAG`].
fn has_build_tag(contents: &str) -> bool {
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        return trimmed == BUILD_TAG;
    }
    false
}

/// spec.md §4.A: fail when the directory "contains multiple packages with
/// conflicting names". Rust stavefiles have no notion of multiple packages
/// sharing a directory; the nearest equivalent is two files each declaring a
/// conflicting inner `#![crate_name = "..."]` attribute (SPEC_FULL.md §9,
/// resolving Open Question ii by treating this as a hard error rather than a
/// tolerated corner case).
fn check_no_conflicting_crate_names(files: &[PathBuf]) -> Result<(), StaveError> {
    let mut seen: Option<(PathBuf, String)> = None;
    for file in files {
        let Ok(contents) = std::fs::read_to_string(file) else {
            continue;
        };
        let Some(name) = crate_name_attribute(&contents) else {
            continue;
        };
        match &seen {
            None => seen = Some((file.clone(), name)),
            Some((first_file, first_name)) if *first_name != name => {
                return Err(StaveError::Config(format!(
                    "conflicting crate names: {} declares {first_name:?}, {} declares {name:?}",
                    first_file.display(),
                    file.display()
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn crate_name_attribute(contents: &str) -> Option<String> {
    for line in contents.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("#![crate_name") {
            let name = rest.split('"').nth(1)?;
            return Some(name.to_string());
        }
    }
    None
}
