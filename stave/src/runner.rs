//! Runner (spec.md §4.F): spawns the compiled binary, plumbs the outer
//! process's environment and flags into it, forwards interrupt signals, and
//! propagates its exit code back to the outer `stave` process.
//!
//! Signal forwarding follows the same `signal_hook::low_level::register`
//! pattern the teacher's daemon uses for `SIGHUP`
//! (`packages/hurry/src/bin/hurry/cmd/daemon/start.rs`), adapted here to
//! `SIGINT`/`SIGTERM`: rather than ignoring the signal, the handler notifies
//! an async task that kills the child directly, guaranteeing forwarding even
//! on platforms where a spawned child doesn't automatically share the
//! parent's controlling-terminal process group.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Notify;
use tracing::{instrument, warn};

use crate::config::InvocationConfig;
use crate::error::StaveError;

/// Environment variables the Runner sets on the child process; the compiled
/// binary (via `stave_runtime::dryrun`) reads these at startup.
mod env_vars {
    pub const DRYRUN_POSSIBLE: &str = "STAVE_DRYRUN_POSSIBLE";
    pub const DRYRUN_REQUESTED: &str = "STAVE_DRYRUN_REQUESTED";
    pub const LOG: &str = "STAVE_LOG";
    pub const LIST: &str = "STAVE_LIST";
    pub const HELP: &str = "STAVE_HELP";
}

/// Run the compiled binary at `binary_path` with `extra_args` passed through
/// verbatim as its argv (spec.md §4.F), honoring `config`'s dry-run, verbose/
/// debug, list/help, run-dir, and timeout settings. Returns the child's exit
/// code, or a [`StaveError`] if the process could not even be spawned.
#[instrument(skip(extra_args), fields(binary = %binary_path.display()))]
pub async fn run(
    binary_path: &std::path::Path,
    extra_args: &[String],
    config: &InvocationConfig,
) -> Result<i32, StaveError> {
    let mut cmd = Command::new(binary_path);
    cmd.args(extra_args);
    cmd.current_dir(&config.run_dir);
    cmd.stdin(Stdio::inherit());
    cmd.stdout(Stdio::inherit());
    cmd.stderr(Stdio::inherit());

    cmd.env(env_vars::DRYRUN_POSSIBLE, bool_str(true));
    cmd.env(env_vars::DRYRUN_REQUESTED, bool_str(config.dry_run));
    if config.list {
        cmd.env(env_vars::LIST, "1");
    }
    if config.help {
        if let Some(target) = extra_args.first() {
            cmd.env(env_vars::HELP, target);
        }
    }
    if config.debug {
        cmd.env(env_vars::LOG, "trace");
    } else if config.verbose {
        cmd.env(env_vars::LOG, "debug");
    }

    let mut child = cmd
        .spawn()
        .map_err(|err| StaveError::Config(format!("could not spawn {}: {err}", binary_path.display())))?;

    let interrupted = std::sync::Arc::new(Notify::new());
    let _guard = install_signal_forwarding(interrupted.clone());

    let wait = async {
        tokio::select! {
            status = child.wait() => status,
            () = interrupted.notified() => {
                warn!("forwarding interrupt to child process");
                let _ = child.start_kill();
                child.wait().await
            }
        }
    };

    let status = match config.timeout {
        Some(timeout) => match tokio::time::timeout(timeout, wait).await {
            Ok(status) => status,
            Err(_) => {
                warn!(?timeout, "per-target timeout elapsed; killing child process");
                let _ = child.start_kill();
                child.wait().await
            }
        },
        None => wait.await,
    }
    .map_err(|err| StaveError::Config(format!("waiting for child process: {err}")))?;

    Ok(status.code().unwrap_or(1))
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Install process-wide `SIGINT`/`SIGTERM` handlers that notify `interrupted`
/// exactly once per signal. Returns an RAII guard that unregisters the
/// handlers on drop so a later `run` call doesn't pile up stale handlers.
fn install_signal_forwarding(interrupted: std::sync::Arc<Notify>) -> SignalGuard {
    let mut ids = Vec::new();
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        let interrupted = interrupted.clone();
        // SAFETY: the handler only calls `Notify::notify_one`, which (like
        // the rest of `tokio::sync::Notify`) only touches a futex-backed
        // atomic and never allocates, matching the restrictions
        // `signal_hook::low_level::register` documents for its callback.
        match unsafe { signal_hook::low_level::register(signal, move || interrupted.notify_one()) } {
            Ok(id) => ids.push(id),
            Err(err) => warn!(%err, signal, "failed to install signal handler"),
        }
    }
    SignalGuard { ids }
}

struct SignalGuard {
    ids: Vec<signal_hook::SigId>,
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}

/// Build the child process argv: requested target names followed by any
/// args the outer CLI left unparsed after `--` (spec.md §4.F "passthrough").
pub fn build_argv(config: &InvocationConfig) -> Vec<String> {
    config.targets.clone()
}
