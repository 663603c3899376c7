//! The Dependency Evaluator (spec.md §4.G): at-most-once-per-run target
//! execution, cycle detection, and the four public fan-out entry points
//! (`Deps`, `SerialDeps`, `CtxDeps`, `SerialCtxDeps`).

use std::sync::{Arc, OnceLock};

use dashmap::{DashMap, DashSet};
use futures::FutureExt;
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;

use crate::bind::BoundFn;
use crate::context::ActiveContext;
use crate::fatal::classify_panic;
use crate::identity::FnIdentity;
use crate::RuntimeError;

enum SlotState {
    Running,
    Done(Result<(), RuntimeError>),
}

struct OnceSlot {
    state: RwLock<SlotState>,
    notify: Notify,
}

/// Process-wide run state, reset at process exit and (for watch-only
/// entries) by the [`WatchSupervisor`](crate::watch::WatchSupervisor)
/// between rerun iterations.
pub struct Evaluator {
    onces: DashMap<FnIdentity, Arc<OnceSlot>>,
    cyclic_edges: DashSet<(Option<FnIdentity>, FnIdentity)>,
}

static EVALUATOR: OnceLock<Evaluator> = OnceLock::new();

tokio::task_local! {
    static CALL_STACK: Vec<FnIdentity>;
}

/// The identity chain from the outermost target down to the currently
/// executing call, as seen from inside a target body. Empty if called
/// outside of any evaluator-dispatched call. Used by
/// [`crate::watch`] to attribute a `Watch`/`watch_deps` registration to its
/// owning outermost target.
pub(crate) fn current_stack() -> Vec<FnIdentity> {
    CALL_STACK.try_with(|s| s.clone()).unwrap_or_default()
}

impl Evaluator {
    fn global() -> &'static Evaluator {
        EVALUATOR.get_or_init(|| Evaluator {
            onces: DashMap::new(),
            cyclic_edges: DashSet::new(),
        })
    }

    /// Remove the once-slot for `id`, if any. Used by the watch supervisor
    /// to force a target's watch-only dependencies to re-run on the next
    /// iteration while leaving everything else latched.
    pub fn reset(id: &FnIdentity) {
        Self::global().onces.remove(id);
    }

    /// Run a single bound target under once-semantics and cycle detection,
    /// within the given ambient context.
    async fn run_one(bound: BoundFn, ctx: CancellationToken) -> Result<(), RuntimeError> {
        let BoundFn { identity, body } = bound;
        let evaluator = Self::global();

        // Cycle detection happens before the once-registry is even
        // consulted: if `identity` is already our own ancestor, awaiting its
        // (possibly-existing) once-slot would deadlock against ourselves,
        // since that slot can only complete once we return. A cached edge
        // short-circuits re-encountering a known cycle without re-walking
        // the stack.
        let stack = CALL_STACK.try_with(|s| s.clone()).unwrap_or_default();
        let cyclic = stack.contains(&identity)
            || evaluator
                .cyclic_edges
                .contains(&(stack.last().cloned(), identity.clone()));
        if cyclic {
            evaluator
                .cyclic_edges
                .insert((stack.last().cloned(), identity.clone()));
            let mut chain: Vec<String> = stack.iter().map(|i| i.to_string()).collect();
            chain.push(identity.to_string());
            return Err(RuntimeError::Cycle { chain });
        }

        let (slot, is_executor) = match evaluator.onces.entry(identity.clone()) {
            dashmap::mapref::entry::Entry::Occupied(e) => (e.get().clone(), false),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let slot = Arc::new(OnceSlot {
                    state: RwLock::new(SlotState::Running),
                    notify: Notify::new(),
                });
                e.insert(slot.clone());
                (slot, true)
            }
        };

        if !is_executor {
            loop {
                {
                    let state = slot.state.read().await;
                    if let SlotState::Done(result) = &*state {
                        return result.clone();
                    }
                }
                slot.notify.notified().await;
            }
        }

        let mut next_stack = stack;
        next_stack.push(identity.clone());

        let outcome = CALL_STACK
            .scope(
                next_stack,
                ActiveContext::enter(ctx, std::panic::AssertUnwindSafe(body).catch_unwind()),
            )
            .await;

        let result = match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(fatal)) => Err(RuntimeError::Fatal(fatal)),
            Err(panic) => Err(RuntimeError::Fatal(classify_panic(panic))),
        };

        {
            let mut state = slot.state.write().await;
            *state = SlotState::Done(result.clone());
        }
        slot.notify.notify_waiters();

        result
    }

    /// Highest-priority exit code among a batch of fan-out results: the
    /// first nonzero code wins; later nonzero codes never overwrite it.
    fn aggregate(results: Vec<Result<(), RuntimeError>>) -> Result<(), RuntimeError> {
        let mut chosen: Option<RuntimeError> = None;
        for result in results {
            let Err(err) = result else { continue };
            match &chosen {
                None => chosen = Some(err),
                Some(prev) if exit_code(prev) == 0 && exit_code(&err) != 0 => {
                    chosen = Some(err);
                }
                Some(_) => {}
            }
        }
        match chosen {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn exit_code(err: &RuntimeError) -> i32 {
    match err {
        RuntimeError::Fatal(f) => f.code,
        RuntimeError::Cycle { .. } => 1,
        RuntimeError::Cancelled => 0,
    }
}

/// Run `fns` in parallel, inheriting the ambient context. Blocks until every
/// branch completes; if any failed, returns the highest-priority failure
/// after all siblings have finished.
pub async fn deps(fns: Vec<BoundFn>) -> Result<(), RuntimeError> {
    ctx_deps(ActiveContext::current(), fns).await
}

/// Run `fns` one at a time, on the caller's task, inheriting the ambient
/// context.
pub async fn serial_deps(fns: Vec<BoundFn>) -> Result<(), RuntimeError> {
    serial_ctx_deps(ActiveContext::current(), fns).await
}

/// Run `fns` in parallel under an explicit cancellation context.
pub async fn ctx_deps(ctx: CancellationToken, fns: Vec<BoundFn>) -> Result<(), RuntimeError> {
    let stack = CALL_STACK.try_with(|s| s.clone()).unwrap_or_default();
    let handles: Vec<_> = fns
        .into_iter()
        .map(|bound| {
            let ctx = ctx.clone();
            let stack = stack.clone();
            tokio::spawn(CALL_STACK.scope(stack, Evaluator::run_one(bound, ctx)))
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(match handle.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                Err(RuntimeError::Fatal(classify_panic(join_err.into_panic())))
            }
            Err(_) => Err(RuntimeError::Cancelled),
        });
    }

    Evaluator::aggregate(results)
}

/// Run `fns` one at a time, on the caller's task, under an explicit
/// cancellation context.
pub async fn serial_ctx_deps(
    ctx: CancellationToken,
    fns: Vec<BoundFn>,
) -> Result<(), RuntimeError> {
    let mut results = Vec::with_capacity(fns.len());
    for bound in fns {
        results.push(Evaluator::run_one(bound, ctx.clone()).await);
    }
    Evaluator::aggregate(results)
}

/// Test-only: drop all run state so each test starts from a clean registry.
#[cfg(any(test, feature = "test-util"))]
pub fn reset_all() {
    if let Some(evaluator) = EVALUATOR.get() {
        evaluator.onces.clear();
        evaluator.cyclic_edges.clear();
    }
}
