//! Dry-Run Gate (spec.md §4.I).
//!
//! `IsDryRun() = possible ∧ requested`. Both flags are latched on first read
//! so that a target body checking [`is_dry_run`] mid-run always observes the
//! same answer the whole invocation saw, even if (hypothetically) the
//! environment changed underneath it.

use std::sync::OnceLock;

static POSSIBLE: OnceLock<bool> = OnceLock::new();
static REQUESTED: OnceLock<bool> = OnceLock::new();

/// Env var the outer `stave` process sets on the child to declare "dry-run
/// is possible here" (spec.md §4.F).
const POSSIBLE_VAR: &str = "STAVE_DRYRUN_POSSIBLE";
/// Env var carrying the user's `--dryrun` request through to the child.
const REQUESTED_VAR: &str = "STAVE_DRYRUN_REQUESTED";

fn env_flag(var: &str) -> bool {
    std::env::var(var).is_ok_and(|v| matches!(v.as_str(), "1" | "true" | "yes"))
}

/// Latch both dry-run flags from the process environment. Idempotent: only
/// the first call has any effect, matching the single-assignment contract in
/// spec.md §4.I.
pub fn latch_dry_run_flags() {
    POSSIBLE.get_or_init(|| env_flag(POSSIBLE_VAR));
    REQUESTED.get_or_init(|| env_flag(REQUESTED_VAR));
}

/// Whether dry-run behavior should be active for the remainder of this
/// invocation. Implicitly latches the flags on first call if the dispatcher
/// hasn't already done so.
pub fn is_dry_run() -> bool {
    latch_dry_run_flags();
    *POSSIBLE.get().unwrap() && *REQUESTED.get().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    // `env_flag` is pure and doesn't touch the latched `OnceLock`s, so it's
    // safe to exercise directly without process-global interference.
    #[test_case("1", true; "digit one")]
    #[test_case("true", true; "lowercase true")]
    #[test_case("TRUE", false; "case sensitive, rejects uppercase")]
    #[test_case("yes", true; "yes")]
    #[test_case("0", false; "digit zero")]
    #[test_case("false", false; "lowercase false")]
    #[test_case("", false; "empty string")]
    fn env_flag_parses_expected_values(value: &str, expected: bool) {
        const VAR: &str = "STAVE_RUNTIME_TEST_DRYRUN_FLAG";
        // SAFETY: test-only var, not read concurrently by other tests.
        unsafe { std::env::set_var(VAR, value) };
        assert_eq!(env_flag(VAR), expected);
        unsafe { std::env::remove_var(VAR) };
    }
}
