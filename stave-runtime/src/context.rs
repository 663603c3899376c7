//! Ambient context plumbing (spec.md §4.J).
//!
//! Rather than threading a cancellation token through every helper
//! signature, the runtime keeps a per-task stack of active contexts. Shell
//! helpers call [`ActiveContext::current`] to pick up the nearest
//! cancellable context instead of requiring every caller to accept and
//! forward one explicitly. `CtxDeps`/`SerialCtxDeps` still accept an
//! explicit [`tokio_util::sync::CancellationToken`] for callers that want to
//! bypass the ambient lookup.

use tokio_util::sync::CancellationToken;

tokio::task_local! {
    static CONTEXT_STACK: Vec<CancellationToken>;
}

/// A handle onto the nearest cancellable context for the calling task.
pub struct ActiveContext;

impl ActiveContext {
    /// The innermost context registered for the current task, or a context
    /// that is never cancelled if none has been entered (e.g. code running
    /// outside of any target body).
    pub fn current() -> CancellationToken {
        CONTEXT_STACK
            .try_with(|stack| stack.last().cloned())
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    /// Run `fut` with `token` pushed onto the current task's context stack,
    /// restoring the previous stack once `fut` completes. Used by the
    /// [`Evaluator`](crate::evaluator::Evaluator) when invoking a target
    /// body, and by the [`WatchSupervisor`](crate::watch::WatchSupervisor)
    /// when it replaces a watched target's context with a fresh,
    /// cancellable one before each rerun.
    pub async fn enter<Fut>(token: CancellationToken, fut: Fut) -> Fut::Output
    where
        Fut: Future,
    {
        let mut stack = CONTEXT_STACK.try_with(|s| s.clone()).unwrap_or_default();
        stack.push(token);
        CONTEXT_STACK.scope(stack, fut).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn current_defaults_to_uncancelled() {
        let token = ActiveContext::current();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn enter_scopes_context_to_the_future() {
        let token = CancellationToken::new();
        token.cancel();

        let observed = ActiveContext::enter(token.clone(), async { ActiveContext::current() }).await;
        assert!(observed.is_cancelled());

        // Outside the scope, the ambient context reverts to uncancelled.
        assert!(!ActiveContext::current().is_cancelled());
    }

    #[tokio::test]
    async fn nested_enter_stacks_contexts() {
        let outer = CancellationToken::new();
        let inner = CancellationToken::new();
        inner.cancel();

        ActiveContext::enter(outer.clone(), async {
            assert!(!ActiveContext::current().is_cancelled());
            ActiveContext::enter(inner.clone(), async {
                assert!(ActiveContext::current().is_cancelled());
            })
            .await;
            // Popped back to the outer (uncancelled) context.
            assert!(!ActiveContext::current().is_cancelled());
        })
        .await;
    }
}
