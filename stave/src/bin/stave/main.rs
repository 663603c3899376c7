//! The binary entrypoint for `stave`, a make-like command runner whose
//! stavefile is Rust source.

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::Context;
use tracing::instrument;
use tracing_subscriber::util::SubscriberInitExt;

// Since this is a binary crate, we need to ensure these modules aren't pub
// so that they can correctly warn about dead code:
// https://github.com/rust-lang/rust/issues/74970
//
// Relatedly, in this file specifically nothing should be `pub`.
mod cmd;
mod log;

use cmd::TopLevelFlags;

#[instrument]
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let top = TopLevelFlags::parse();

    let profile: Option<std::path::PathBuf> = None;
    let (logger, flame_guard) = log::make_logger(profile.as_deref(), top.color)?;
    logger.init();

    let result = run(&top).await;

    if let Some(flame_guard) = flame_guard {
        flame_guard.flush().context("flush flame_guard")?;
    }

    match result {
        Ok(code) => std::process::exit(code),
        Err(report) => {
            eprintln!("{report:?}");
            std::process::exit(stave::error::exit_code_for(&report));
        }
    }
}

/// Dispatch to `--clean`/`--init`, falling back to the main scan-parse-
/// cache-generate-compile-run pipeline (spec.md §6). Kept separate from
/// `main` so the early-exit flags short-circuit before an `InvocationConfig`
/// is even built, matching the teacher's `Command::Cache`/`Command::Cargo`
/// split at the top of its own `main`.
async fn run(top: &TopLevelFlags) -> Result<i32> {
    let source_dir = stave::config::absolute(&top.source_dir);
    let cache_dir = stave::config::InvocationConfig::default_cache_dir()?;

    if top.clean {
        cmd::clean::exec(&cache_dir)?;
        return Ok(0);
    }
    if top.init {
        cmd::init::exec(&source_dir)?;
        return Ok(0);
    }

    let timeout = top
        .parsed_timeout()
        .map_err(|err| color_eyre::eyre::eyre!(err))?;
    let run_dir = top
        .run_dir
        .clone()
        .map(stave::config::absolute)
        .unwrap_or_else(|| source_dir.clone());

    let config = stave::config::InvocationConfig {
        source_dir,
        run_dir,
        cache_dir,
        toolchain_cmd: top.toolchain_cmd.clone(),
        timeout,
        verbose: top.verbose,
        debug: top.debug,
        list: top.list,
        help: top.help,
        dry_run: top.dryrun,
        force_rebuild: top.force,
        keep_generated: top.keep,
        targets: top.targets.clone(),
        compile_output: top.compile.clone(),
        goos: top.goos.clone(),
        goarch: top.goarch.clone(),
        ldflags: top.ldflags.clone(),
    };

    let code = stave::run_invocation(&config).await?;
    Ok(code)
}
