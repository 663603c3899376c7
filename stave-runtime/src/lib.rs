//! Runtime support linked into every compiled stavefile binary.
//!
//! `stave` (the CLI) never depends on the bodies of this crate executing —
//! it only compiles user stavefiles against it. Everything a target body can
//! call (`Deps`, `Watch`, `Fatal`, the dry-run gate, the active-context
//! lookup) lives here so the generated mainfile and the user's own functions
//! share one copy of the once registry, cycle registry, and target state.

pub mod args;
pub mod bind;
pub mod context;
pub mod dryrun;
pub mod evaluator;
pub mod fatal;
pub mod identity;
pub mod namespace;
pub mod sh;
pub mod watch;

pub use bind::{bare, bare_ctx, f, f_ctx, BoundFn, IntoBoundFn, IntoBoundFnCtx};
pub use context::ActiveContext;
pub use dryrun::{is_dry_run, latch_dry_run_flags};
pub use evaluator::{ctx_deps, deps, serial_ctx_deps, serial_deps, Evaluator};
pub use fatal::{fatal, fatalf, FatalError};
pub use identity::FnIdentity;
pub use namespace::Namespace;
pub use watch::{watch, watch_deps, WatchSupervisor};

/// Errors raised by the runtime that the dispatcher recognizes and maps to
/// process exit codes, distinct from ordinary `Err(String)` target failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    #[error("cycle detected: {}", .chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Fatal(#[from] FatalError),
}

/// Lets target bodies propagate a failed `Deps`/`CtxDeps` call with a plain
/// `?` instead of matching on `RuntimeError` themselves — target bodies only
/// ever return `Result<(), FatalError>`, so a cycle or a cancellation both
/// collapse to the generic exit-code-1 class, same as an unrecognized panic.
impl From<RuntimeError> for FatalError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Fatal(fatal) => fatal,
            RuntimeError::Cycle { .. } => FatalError::new(1, err.to_string()),
            RuntimeError::Cancelled => FatalError::new(0, err.to_string()),
        }
    }
}
