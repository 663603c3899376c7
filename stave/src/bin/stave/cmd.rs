//! Top-level flag parsing (spec.md §6 "CLI"), structured the way the
//! teacher's `TopLevelFlags` holds global flags with the common case (here,
//! requested target names; there, `cargo` argv) passed through un-parsed via
//! `trailing_var_arg` (`packages/hurry/src/bin/hurry/main.rs`).
//!
//! `--list`/`--help`/`--clean`/`--init`/`--compile` are all plain flags
//! rather than `clap` subcommands: unlike the teacher's `cargo`/`cache`/
//! `daemon` subcommands (which each own a distinct argument grammar), every
//! one of these composes with an ordinary `[target [args…]]…` invocation, so
//! giving any of them its own subcommand would force a second top-level
//! parse just to decide which grammar applies.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::log::WhenColor;

pub mod clean;
pub mod init;

#[derive(Clone, Debug, Parser)]
#[command(
    name = "stave",
    about = "A make-like command runner whose stavefile is Rust source",
    version = clap::crate_version!(),
    disable_help_flag = true
)]
pub struct TopLevelFlags {
    /// Verbose logging (`STAVE_LOG=debug` equivalent).
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Debug logging plus span timing (`STAVE_LOG=trace` equivalent).
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Rebuild even if a cached binary matches the content hash.
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    /// List the targets and aliases this stavefile declares, then exit.
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// Print the doc comment, usage line, and aliases of the first
    /// requested target, then exit.
    #[arg(short = 'h', long = "help")]
    pub help: bool,

    /// Per-target run timeout (e.g. `30s`, `5m`).
    #[arg(short = 't', long = "timeout", value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Simulate shell commands instead of running them.
    #[arg(long = "dryrun")]
    pub dryrun: bool,

    /// Retain the generated mainfile next to the source directory.
    #[arg(long = "keep")]
    pub keep: bool,

    /// Directory to scan for stavefiles.
    #[arg(short = 'C', long = "chdir", default_value = ".")]
    pub source_dir: PathBuf,

    /// Directory the compiled binary should run in (defaults to the source
    /// directory).
    #[arg(short = 'w', long = "workdir")]
    pub run_dir: Option<PathBuf>,

    /// Host toolchain command, overriding `cargo`.
    #[arg(long = "gocmd", env = "CARGO", default_value = "cargo")]
    pub toolchain_cmd: String,

    /// Cross-compile target OS; only valid with `--compile`.
    #[arg(long = "goos")]
    pub goos: Option<String>,

    /// Cross-compile target architecture; only valid with `--compile`.
    #[arg(long = "goarch")]
    pub goarch: Option<String>,

    /// Extra `RUSTFLAGS`-equivalent linker flags; only valid with
    /// `--compile`.
    #[arg(long = "ldflags", value_delimiter = ' ')]
    pub ldflags: Vec<String>,

    /// Produce a standalone binary at this path instead of running a target.
    #[arg(long = "compile", value_name = "OUT")]
    pub compile: Option<PathBuf>,

    /// Empty the cache directory's files, preserving subdirectories.
    #[arg(long = "clean")]
    pub clean: bool,

    /// Write a starter `stavefile.rs` into the source directory.
    #[arg(long = "init")]
    pub init: bool,

    /// When to colorize output.
    #[arg(long = "color", value_enum, default_value_t = WhenColor::Auto)]
    pub color: WhenColor,

    /// Requested targets and their arguments, e.g. `build release deploy
    /// staging`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub targets: Vec<String>,
}

impl TopLevelFlags {
    /// Parse `-t`'s duration string via the same scalar+unit grammar the
    /// compiled binary's own argument coercion uses (`humantime`), so `-t`
    /// and a target's own `Duration`-typed argument accept identical syntax.
    pub fn parsed_timeout(&self) -> Result<Option<Duration>, String> {
        match &self.timeout {
            None => Ok(None),
            Some(raw) => humantime::parse_duration(raw)
                .map(Some)
                .map_err(|err| format!("invalid --timeout {raw:?}: {err}")),
        }
    }
}
