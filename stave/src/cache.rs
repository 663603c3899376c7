//! Cache Keyer (spec.md §4.C): content-addresses a stavefile package to the
//! path of its cached compiled binary.
//!
//! `hash = H(toolchain version ‖ rebuild-epoch ‖ sorted(H(file_i)) ‖
//! H(template))`. Uses `blake3`, exactly as the teacher's own
//! `fs::hash_file`/`fs::hash_file_sync` do for content-addressing its build
//! cache.

use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::error::StaveError;
use crate::mainfile::TEMPLATE_SOURCE;

/// Bumped whenever the mainfile template or dispatcher ABI changes shape,
/// so stale cached binaries compiled against an older dispatcher contract
/// are never reused (SPEC_FULL.md §3).
pub const REBUILD_EPOCH: u32 = 1;

/// A resolved cache entry: the content hash and the binary path it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub hash: blake3::Hash,
    pub binary_path: PathBuf,
}

impl CacheEntry {
    /// Whether the cached binary already exists on disk.
    pub fn exists(&self) -> bool {
        self.binary_path.is_file()
    }
}

/// Compute the cache entry for `files` (already resolved to absolute paths
/// by the Source Scanner), given the host toolchain's version string and
/// the cache directory to resolve the binary path under.
#[instrument(skip(files), fields(file_count = files.len()))]
pub fn cache_key(
    files: &[PathBuf],
    toolchain_version: &str,
    cache_dir: &Path,
) -> Result<CacheEntry, StaveError> {
    let mut file_hashes: Vec<blake3::Hash> = files
        .iter()
        .map(|f| hash_file(f))
        .collect::<Result<_, _>>()?;
    file_hashes.sort_by_key(|h| *h.as_bytes());

    let mut hasher = blake3::Hasher::new();
    hasher.update(toolchain_version.as_bytes());
    hasher.update(&REBUILD_EPOCH.to_le_bytes());
    for file_hash in &file_hashes {
        hasher.update(file_hash.as_bytes());
    }
    hasher.update(blake3::hash(TEMPLATE_SOURCE.as_bytes()).as_bytes());
    let hash = hasher.finalize();

    Ok(CacheEntry {
        hash,
        binary_path: binary_path(cache_dir, &hash),
    })
}

/// Pure function of `cache_dir` and `hash`: the path `stave` would place
/// (or look for) the compiled binary at. Exposed separately from
/// [`cache_key`] so callers that already have a hash (e.g. `--clean`,
/// tests) don't need to re-hash anything.
pub fn binary_path(cache_dir: &Path, hash: &blake3::Hash) -> PathBuf {
    let mut name = hash.to_hex().to_string();
    if cfg!(windows) {
        name.push_str(".exe");
    }
    cache_dir.join(name)
}

fn hash_file(path: &Path) -> Result<blake3::Hash, StaveError> {
    let contents = std::fs::read(path)
        .map_err(|err| StaveError::Config(format!("reading {}: {err}", path.display())))?;
    Ok(blake3::hash(&contents))
}

/// Empty every file under `cache_dir`, preserving subdirectories
/// (spec.md §3 "Cache Entry": "`--clean` removes files but preserves
/// subdirectories").
#[instrument]
pub fn clean(cache_dir: &Path) -> Result<usize, StaveError> {
    if !cache_dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(cache_dir)
        .map_err(|err| StaveError::Config(format!("reading {}: {err}", cache_dir.display())))?
    {
        let entry = entry.map_err(|err| StaveError::Config(err.to_string()))?;
        let path = entry.path();
        if path.is_file() {
            std::fs::remove_file(&path)
                .map_err(|err| StaveError::Config(format!("removing {}: {err}", path.display())))?;
            removed += 1;
        } else if path.is_dir() {
            removed += clean(&path)?;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn cache_key_is_deterministic_for_identical_inputs() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.rs");
        fs::write(&file, "pub fn build() {}\n").unwrap();
        let cache_dir = dir.path().join("cache");

        let a = cache_key(&[file.clone()], "cargo 1.80.0", &cache_dir).unwrap();
        let b = cache_key(&[file], "cargo 1.80.0", &cache_dir).unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.binary_path, b.binary_path);
    }

    #[test]
    fn cache_key_changes_with_file_contents() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.rs");
        let cache_dir = dir.path().join("cache");

        fs::write(&file, "pub fn build() {}\n").unwrap();
        let a = cache_key(&[file.clone()], "cargo 1.80.0", &cache_dir).unwrap();

        fs::write(&file, "pub fn build() { /* changed */ }\n").unwrap();
        let b = cache_key(&[file], "cargo 1.80.0", &cache_dir).unwrap();

        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn cache_key_changes_with_toolchain_version() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.rs");
        fs::write(&file, "pub fn build() {}\n").unwrap();
        let cache_dir = dir.path().join("cache");

        let a = cache_key(&[file.clone()], "cargo 1.80.0", &cache_dir).unwrap();
        let b = cache_key(&[file], "cargo 1.81.0", &cache_dir).unwrap();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn cache_key_is_order_independent_over_file_set() {
        let dir = tempdir().unwrap();
        let a_file = dir.path().join("a.rs");
        let b_file = dir.path().join("b.rs");
        fs::write(&a_file, "pub fn a() {}\n").unwrap();
        fs::write(&b_file, "pub fn b() {}\n").unwrap();
        let cache_dir = dir.path().join("cache");

        let forward = cache_key(&[a_file.clone(), b_file.clone()], "cargo 1.80.0", &cache_dir).unwrap();
        let backward = cache_key(&[b_file, a_file], "cargo 1.80.0", &cache_dir).unwrap();
        assert_eq!(forward.hash, backward.hash);
    }

    #[test]
    fn clean_removes_files_but_preserves_subdirectories() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("binary-1"), b"binary").unwrap();
        let sub = dir.path().join("subdir");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("binary-2"), b"binary").unwrap();

        let removed = clean(dir.path()).unwrap();
        assert_eq!(removed, 2);
        assert!(!dir.path().join("binary-1").exists());
        assert!(sub.is_dir());
        assert!(!sub.join("binary-2").exists());
    }
}
