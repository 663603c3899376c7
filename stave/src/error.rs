//! Error taxonomy (spec.md §7 / SPEC_FULL.md §4.L): one variant per error
//! class, each carrying the exit code the outer `stave` process should use.
//!
//! `main` matches on [`StaveError`] (and falls back to a generic `color_eyre`
//! report for anything else) in a single place at the bottom of `main`,
//! mirroring how the teacher's `main` matches once on its `Command` enum
//! rather than scattering `std::process::exit` calls through the codebase.

use std::path::PathBuf;

use thiserror::Error;

/// The error classes from spec.md §7 that can originate in the outer
/// `stave` process, plus the exit code each maps to. `Cycle`/`Cancelled`/
/// `Fatal` are raised only inside the compiled binary
/// (`stave_runtime::RuntimeError`), since cycle detection, cancellation, and
/// `Fatal(code, ...)` are all concepts the outer process never evaluates a
/// target body to reach.
#[derive(Debug, Error)]
pub enum StaveError {
    /// Bad flag combination, unknown target, or argument coercion failure.
    #[error("{0}")]
    Usage(String),

    /// Unreadable source directory, or no source files found.
    #[error("{0}")]
    Config(String),

    /// Malformed target signature, duplicate target names across imports, or
    /// multi-package ambiguity.
    #[error("{file}: {message}")]
    Parse { file: PathBuf, message: String },

    /// The host compiler (`cargo`) exited nonzero; `stderr` is surfaced
    /// verbatim to the user.
    #[error("compile failed:\n{stderr}")]
    Compile { stderr: String },
}

impl StaveError {
    /// The process exit code this error class maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            StaveError::Usage(_) => 2,
            StaveError::Config(_) | StaveError::Parse { .. } | StaveError::Compile { .. } => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, color_eyre::Report>;

/// Recover the exit code a top-level `color_eyre::Report` should produce:
/// downcasts to [`StaveError`] for the outer-process classes, otherwise
/// falls back to `1` (generic runtime failure, spec.md §7).
pub fn exit_code_for(report: &color_eyre::Report) -> i32 {
    report
        .downcast_ref::<StaveError>()
        .map(StaveError::exit_code)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_error_exits_two() {
        assert_eq!(StaveError::Usage("bad flag".into()).exit_code(), 2);
    }

    #[test]
    fn config_and_parse_and_compile_exit_one() {
        assert_eq!(StaveError::Config("no files".into()).exit_code(), 1);
        assert_eq!(
            StaveError::Parse {
                file: PathBuf::from("a.rs"),
                message: "bad signature".into()
            }
            .exit_code(),
            1
        );
        assert_eq!(StaveError::Compile { stderr: String::new() }.exit_code(), 1);
    }

    #[test]
    fn exit_code_for_downcasts_through_report() {
        let report: color_eyre::Report = StaveError::Usage("x".into()).into();
        assert_eq!(exit_code_for(&report), 2);
    }

    #[test]
    fn exit_code_for_falls_back_to_one_for_unrelated_reports() {
        let report = color_eyre::eyre::eyre!("something else broke");
        assert_eq!(exit_code_for(&report), 1);
    }
}
