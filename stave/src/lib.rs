//! Library for `stave`.
//!
//! Not intended to be used directly — it exists so the CLI binary,
//! benchmarks, and integration tests can all share one copy of the scan →
//! parse → cache → generate → compile → run pipeline.

pub mod cache;
pub mod config;
pub mod driver;
pub mod error;
pub mod mainfile;
pub mod parse;
pub mod runner;
pub mod scan;

use tracing::instrument;

use crate::config::InvocationConfig;
use crate::error::StaveError;

/// Run the full pipeline for one `stave` invocation: scan for stavefiles,
/// parse their targets, resolve (or build) the cached binary, and run it
/// with the requested target names. Returns the child process's exit code.
///
/// This is the single place that wires every component together; the CLI
/// binary's `main` calls it once and maps the result to a process exit code,
/// the same separation the teacher draws between its `cmd::*::exec` handlers
/// and the thin `main.rs` that dispatches to them.
#[instrument(skip(config), fields(source_dir = %config.source_dir.display()))]
pub async fn run_invocation(config: &InvocationConfig) -> Result<i32, StaveError> {
    config.validate()?;

    let files = scan::scan(&config.source_dir)?;
    if files.is_empty() {
        return Err(StaveError::Config(format!(
            "no stavefiles found under {}",
            config.source_dir.display()
        )));
    }

    let metadata = parse::parse_package(&config.source_dir, &files)?;

    if !config.list && !config.help {
        for requested in &config.targets {
            if metadata.find(requested).is_none()
                && !metadata.aliases.contains_key(&requested.to_ascii_lowercase())
            {
                return Err(StaveError::Usage(format!("unknown target {requested:?}")));
            }
        }
    }

    let toolchain_version = driver::toolchain_version(&config.toolchain_cmd).await?;
    let entry = cache::cache_key(&files, &toolchain_version, &config.cache_dir)?;

    let modules = mainfile::user_modules(&files);
    let generated = mainfile::generate(&metadata, &files)?;
    driver::compile(&entry, &generated, &modules, config).await?;

    if config.compile_output.is_some() {
        return Ok(0);
    }

    let argv = runner::build_argv(config);
    runner::run(&entry.binary_path, &argv, config).await
}
