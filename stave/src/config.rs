//! Invocation Config (spec.md §3): the immutable settings for one outer
//! `stave` process, independent of how they were parsed. Kept free of `clap`
//! so the core engine (scanner/parser/cache/generator/compiler/runner) stays
//! testable without constructing CLI argument vectors, the same separation
//! the teacher draws between `HurryOptions` (a `clap::Args` struct meant to
//! be parsed) and the plain data it's unpacked into before reaching the
//! cache/cargo engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;

/// Default cache directory name under the user's cache directory, mirroring
/// the teacher's own `CACHE_DIR_NAME` constant for its local cache backend.
const CACHE_DIR_NAME: &str = "stave";

/// Environment variable overriding the cache directory (spec.md §6).
pub const CACHE_DIR_ENV_VAR: &str = "STAVE_CACHE_DIR";

/// Immutable settings for one outer `stave` process (spec.md §3 "Invocation
/// Config").
#[derive(Debug, Clone)]
pub struct InvocationConfig {
    /// Directory to scan for stavefiles (`-C`).
    pub source_dir: PathBuf,
    /// Directory the compiled binary should run in (`-w`).
    pub run_dir: PathBuf,
    /// Directory holding cached compiled binaries.
    pub cache_dir: PathBuf,
    /// Host toolchain command (`--cargo` / `CARGO`).
    pub toolchain_cmd: String,
    /// Per-target run timeout, if any (`-t`).
    pub timeout: Option<Duration>,
    pub verbose: bool,
    pub debug: bool,
    pub list: bool,
    pub help: bool,
    pub dry_run: bool,
    /// Force a rebuild even if a cached binary matches the content hash.
    pub force_rebuild: bool,
    /// Retain the generated mainfile next to the source directory instead of
    /// discarding it after compilation.
    pub keep_generated: bool,
    /// Requested target names, in command-line order.
    pub targets: Vec<String>,
    /// `--compile <out>`: produce a static binary at this path and skip
    /// running it.
    pub compile_output: Option<PathBuf>,
    pub goos: Option<String>,
    pub goarch: Option<String>,
    pub ldflags: Vec<String>,
}

impl InvocationConfig {
    /// Resolve the default cache directory: `STAVE_CACHE_DIR` if set,
    /// otherwise the platform cache dir under the project name "stave" (the
    /// same `directories::ProjectDirs` pattern the teacher's
    /// `cache/local/mod.rs::default_cache_dir` uses for its own cache).
    pub fn default_cache_dir() -> color_eyre::Result<PathBuf> {
        if let Ok(dir) = std::env::var(CACHE_DIR_ENV_VAR) {
            return Ok(PathBuf::from(dir));
        }
        let dirs = ProjectDirs::from("", "", CACHE_DIR_NAME)
            .ok_or_else(|| color_eyre::eyre::eyre!("could not determine cache directory"))?;
        Ok(dirs.cache_dir().to_path_buf())
    }

    /// Whether compile-only cross-target flags (`--goos`/`--goarch`/
    /// `--ldflags`) are only meaningful alongside `--compile` (spec.md §6).
    pub fn validate(&self) -> Result<(), crate::error::StaveError> {
        if self.compile_output.is_none()
            && (self.goos.is_some() || self.goarch.is_some() || !self.ldflags.is_empty())
        {
            return Err(crate::error::StaveError::Usage(
                "--goos/--goarch/--ldflags are only valid alongside --compile".to_string(),
            ));
        }
        Ok(())
    }
}

/// Absolute form of `path`, resolved against the current working directory
/// without touching the filesystem beyond what `std::path` needs.
pub fn absolute(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
