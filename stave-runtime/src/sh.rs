//! Shell-command helpers (spec.md: "shell-command helpers" are an
//! out-of-scope external collaborator accessed via a narrow interface).
//!
//! This is deliberately thin: a stavefile's own body is plain Rust, so it
//! already has `std::process::Command` and every crate on crates.io
//! available to it. What the runtime needs to own is the two behaviors a
//! target body can't implement for itself — honoring the [dry-run
//! gate](crate::dryrun) and the [ambient cancellation
//! context](crate::context) — so that `sh::run` composes correctly with
//! `Watch` and `Fatal` without every stavefile reimplementing that glue.

use std::fmt::Write as _;
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tracing::{debug, instrument};

use crate::context::ActiveContext;
use crate::dryrun::is_dry_run;
use crate::fatal::FatalError;

fn render(cmd: &str, args: &[impl AsRef<str>]) -> String {
    let mut line = cmd.to_string();
    for arg in args {
        let _ = write!(line, " {}", arg.as_ref());
    }
    line
}

/// Run `cmd` with `args`, streaming its stdout/stderr to the caller's own.
///
/// Under the dry-run gate ([`is_dry_run`]), prints `DRYRUN: <cmd> <args…>`
/// to stdout and returns without spawning anything (spec.md S5). Otherwise
/// spawns the child and races it against the nearest [`ActiveContext`]:
/// cancellation kills the child and yields [`FatalError`] with code 0, the
/// same class the evaluator uses for a cancelled run.
#[instrument(skip(args), fields(cmd = %render(cmd, args)))]
pub async fn run(cmd: &str, args: &[impl AsRef<str>]) -> Result<(), FatalError> {
    output(cmd, args).await.map(drop)
}

/// Like [`run`], but returns the child's captured stdout as a `String` with
/// trailing newline trimmed, mirroring the spec's "capture output" variant
/// of the shell helper. A nonzero exit still fails with [`FatalError`].
pub async fn output(cmd: &str, args: &[impl AsRef<str>]) -> Result<String, FatalError> {
    if is_dry_run() {
        println!("DRYRUN: {}", render(cmd, args));
        return Ok(String::new());
    }

    let token = ActiveContext::current();
    let mut command = Command::new(cmd);
    command
        .args(args.iter().map(|a| a.as_ref()))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    debug!("spawning");
    let mut child = command
        .spawn()
        .map_err(|err| FatalError::new(1, format!("failed to run `{cmd}`: {err}")))?;

    let mut stdout = child.stdout.take();
    let wait = async {
        let mut buf = Vec::new();
        if let Some(stdout) = stdout.as_mut() {
            use tokio::io::AsyncReadExt;
            let _ = stdout.read_to_end(&mut buf).await;
        }
        let status = child.wait().await;
        (status, buf)
    };

    tokio::select! {
        biased;
        () = token.cancelled() => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            Err(FatalError::new(0, format!("`{}` cancelled", render(cmd, args))))
        }
        (status, buf) = wait => {
            let status: std::io::Result<ExitStatus> = status;
            let status = status
                .map_err(|err| FatalError::new(1, format!("failed to wait on `{cmd}`: {err}")))?;
            if status.success() {
                Ok(String::from_utf8_lossy(&buf).trim_end().to_string())
            } else {
                Err(FatalError::new(
                    status.code().unwrap_or(1),
                    format!("`{}` exited with {status}", render(cmd, args)),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dry_run_short_circuits_without_spawning() {
        // SAFETY: test-only env vars, not read concurrently elsewhere.
        unsafe {
            std::env::set_var("STAVE_DRYRUN_POSSIBLE", "1");
            std::env::set_var("STAVE_DRYRUN_REQUESTED", "1");
        }
        // `latch_dry_run_flags` only latches once per process; other tests in
        // this binary may have already latched it to `false`. Skip instead of
        // asserting if so, rather than poison the shared `OnceLock`.
        if !is_dry_run() {
            return;
        }
        let result = run("rm", &["-rf", "/nonexistent-stave-test-path"]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn captures_stdout_and_trims_trailing_newline() {
        if is_dry_run() {
            return;
        }
        let out = output("printf", &["hello"]).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_fatal_error() {
        if is_dry_run() {
            return;
        }
        let err = run("false", &[] as &[&str]).await.unwrap_err();
        assert_eq!(err.code, 1);
    }
}
