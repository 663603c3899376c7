//! Watch Supervisor (spec.md §4.H): glob registration, fs-notify dispatch,
//! and cancel/rerun coordination across multiple outermost targets.
//!
//! Grounded on the same `notify` + glob-set pairing
//! `watchexec`/`cargo-mutants` use for filesystem polling, adapted to
//! coalesce through a [`tokio::sync::Notify`] per target instead of a raw
//! channel, since `Notify::notify_one` already buffers at most one pending
//! permit — exactly the "many events, one rerun" coalescing spec.md asks
//! for.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use dashmap::{DashMap, DashSet};
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::bind::BoundFn;
use crate::evaluator::{self, Evaluator};
use crate::identity::FnIdentity;
use crate::RuntimeError;

const GLOB_METACHARS: [char; 4] = ['*', '?', '[', '{'];

struct TargetInner {
    patterns: std::collections::HashSet<String>,
    globset: GlobSet,
    watch_only: std::collections::HashSet<FnIdentity>,
    observers: std::collections::HashSet<FnIdentity>,
}

impl TargetInner {
    fn empty() -> Self {
        Self {
            patterns: Default::default(),
            globset: GlobSetBuilder::new().build().expect("empty globset always builds"),
            watch_only: Default::default(),
            observers: Default::default(),
        }
    }
}

struct TargetState {
    inner: Mutex<TargetInner>,
    /// Signaled on every fs event matching this target's globset; the
    /// rerun loop awaits this directly, relying on `Notify`'s single
    /// buffered permit to coalesce a burst of events into one rerun.
    rerun: Notify,
}

impl TargetState {
    fn new() -> Self {
        Self {
            inner: Mutex::new(TargetInner::empty()),
            rerun: Notify::new(),
        }
    }
}

/// Process-wide watch-mode state: one [`TargetState`] per outermost target
/// that has registered at least one glob, a singleton `notify` watcher, and
/// the set of directories already subscribed (so re-registering the same
/// glob is a no-op, per spec.md invariant 6).
pub struct WatchSupervisor {
    targets: DashMap<FnIdentity, Arc<TargetState>>,
    outermost: DashSet<FnIdentity>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    watched_dirs: DashSet<PathBuf>,
}

static SUPERVISOR: OnceLock<WatchSupervisor> = OnceLock::new();

impl WatchSupervisor {
    fn global() -> &'static WatchSupervisor {
        SUPERVISOR.get_or_init(|| WatchSupervisor {
            targets: DashMap::new(),
            outermost: DashSet::new(),
            watcher: Mutex::new(None),
            watched_dirs: DashSet::new(),
        })
    }

    /// Declare `identity` as one of the user's directly requested targets
    /// for this invocation. Called by the generated dispatcher before
    /// running any target; `watch`/`watch_deps` calls are only honored
    /// while the current call stack's root is in this set (spec.md §4.H
    /// "Activation").
    pub fn mark_outermost(identity: FnIdentity) {
        Self::global().outermost.insert(identity);
    }

    /// Whether `identity` ended up watch-active, i.e. it or one of its
    /// transitive dependencies called `watch`/`watch_deps` during the run
    /// that just completed. The dispatcher checks this right after running
    /// a requested target to decide whether to enter the Rerun Loop.
    pub fn is_watch_active(identity: &FnIdentity) -> bool {
        Self::global().targets.contains_key(identity)
    }

    /// The Rerun Loop (spec.md §4.H): block on `identity`'s rerun signal or
    /// on `ctx` cancellation. On signal, reset the once-slots of
    /// `identity`'s watch-only deps and glob-registering observers — but
    /// not its ordinary latched deps — then invoke `rerun` again. A failed
    /// rerun is logged and does not end the loop; only cancellation does,
    /// matching spec.md's "watch mode does not exit on a rerun iteration's
    /// failure".
    #[instrument(skip(ctx, rerun), fields(target = %identity))]
    pub async fn run_forever(
        identity: FnIdentity,
        ctx: CancellationToken,
        mut rerun: impl FnMut() -> BoundFn + Send + 'static,
    ) -> Result<(), RuntimeError> {
        let Some(state) = Self::global().targets.get(&identity).map(|e| e.value().clone()) else {
            return Ok(());
        };

        loop {
            tokio::select! {
                biased;
                () = ctx.cancelled() => return Ok(()),
                () = state.rerun.notified() => {
                    debug!("change detected, rerunning");
                    Self::global().reset_for_rerun(&identity);
                    if let Err(err) = evaluator::deps(vec![rerun()]).await {
                        warn!(%err, "watch rerun failed; waiting for next change");
                    }
                }
            }
        }
    }

    fn reset_for_rerun(&self, owner: &FnIdentity) {
        Evaluator::reset(owner);
        if let Some(state) = self.targets.get(owner) {
            let inner = state.inner.lock().expect("watch state mutex poisoned");
            for id in &inner.watch_only {
                Evaluator::reset(id);
            }
            for id in &inner.observers {
                Evaluator::reset(id);
            }
        }
    }

    fn state_for(&self, owner: &FnIdentity) -> Arc<TargetState> {
        self.targets
            .entry(owner.clone())
            .or_insert_with(|| Arc::new(TargetState::new()))
            .value()
            .clone()
    }

    fn register_patterns(&self, owner: FnIdentity, observer: FnIdentity, patterns: &[String]) {
        let state = self.state_for(&owner);
        let mut new_dirs = Vec::new();
        {
            let mut inner = state.inner.lock().expect("watch state mutex poisoned");
            inner.observers.insert(observer);

            let mut added_any = false;
            for pattern in patterns {
                if inner.patterns.insert(pattern.clone()) {
                    added_any = true;
                }
            }
            if !added_any {
                return;
            }

            let mut builder = GlobSetBuilder::new();
            for pattern in &inner.patterns {
                match Glob::new(pattern) {
                    Ok(glob) => {
                        builder.add(glob);
                    }
                    Err(err) => warn!(%pattern, %err, "invalid glob pattern, ignoring"),
                }
            }
            inner.globset = builder
                .build()
                .unwrap_or_else(|_| GlobSetBuilder::new().build().expect("empty globset always builds"));

            for pattern in patterns {
                new_dirs.push(literal_prefix_dir(pattern));
            }
        }

        self.ensure_watcher_started();
        self.watch_dirs(&new_dirs);
    }

    fn register_watch_only(&self, owner: FnIdentity, fns: &[BoundFn]) {
        let state = self.state_for(&owner);
        let mut inner = state.inner.lock().expect("watch state mutex poisoned");
        for bound in fns {
            inner.watch_only.insert(bound.identity().clone());
        }
    }

    fn ensure_watcher_started(&self) {
        let mut guard = self.watcher.lock().expect("watcher mutex poisoned");
        if guard.is_some() {
            return;
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(err) => warn!(%err, "filesystem watcher error"),
        });

        match watcher {
            Ok(watcher) => {
                *guard = Some(watcher);
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        WatchSupervisor::global().dispatch(&event);
                    }
                });
            }
            Err(err) => warn!(%err, "failed to start filesystem watcher"),
        }
    }

    fn watch_dirs(&self, dirs: &[PathBuf]) {
        let mut guard = self.watcher.lock().expect("watcher mutex poisoned");
        let Some(watcher) = guard.as_mut() else {
            return;
        };
        for dir in dirs {
            if !self.watched_dirs.insert(dir.clone()) {
                continue;
            }
            if let Err(err) = watcher.watch(dir, RecursiveMode::Recursive) {
                warn!(path = %dir.display(), %err, "failed to watch path");
            }
        }
    }

    fn dispatch(&self, event: &Event) {
        for path in &event.paths {
            for entry in self.targets.iter() {
                let matched = entry
                    .value()
                    .inner
                    .lock()
                    .expect("watch state mutex poisoned")
                    .globset
                    .is_match(path);
                if matched {
                    entry.value().rerun.notify_one();
                }
            }
        }
    }

    /// Test-only: drop all watch state (registered targets, outermost set)
    /// so each test starts clean. Leaves any already-started `notify`
    /// watcher running — it's harmless with no targets registered against
    /// it.
    #[cfg(any(test, feature = "test-util"))]
    pub fn reset_all() {
        let sup = Self::global();
        sup.targets.clear();
        sup.outermost.clear();
    }
}

/// Given a glob pattern, the deepest literal (non-wildcard) directory that
/// contains everything it could match — the directory actually handed to
/// the `notify` watcher. `notify`'s recursive mode already picks up newly
/// created subdirectories on its own, satisfying spec.md's "new directory
/// is added to the watcher" rule without extra bookkeeping here.
fn literal_prefix_dir(pattern: &str) -> PathBuf {
    match pattern.find(|c: char| GLOB_METACHARS.contains(&c)) {
        None => {
            let path = Path::new(pattern);
            if path.extension().is_some() {
                path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."))
            } else {
                path.to_path_buf()
            }
        }
        Some(cut) => {
            let literal = &pattern[..cut];
            match Path::new(literal).parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            }
        }
    }
}

/// Register glob patterns as the filesystem inputs that should trigger a
/// re-run of the caller's owning outermost target (spec's `Watch(globs…)`).
///
/// A no-op outside of any target's dependency tree, or when the owning
/// outermost target isn't one the user directly requested — transitive
/// dependencies of an unrelated requested target must not accidentally put
/// it into watch mode (spec.md §4.H).
pub fn watch(patterns: &[impl AsRef<str>]) {
    let stack = evaluator::current_stack();
    let (Some(owner), Some(observer)) = (stack.first().cloned(), stack.last().cloned()) else {
        debug!("watch() called outside of any target's call tree; ignoring");
        return;
    };

    let sup = WatchSupervisor::global();
    if !sup.outermost.contains(&owner) {
        debug!(%owner, "watch() registered under a non-requested outermost target; ignoring");
        return;
    }

    let patterns: Vec<String> = patterns.iter().map(|p| p.as_ref().to_string()).collect();
    sup.register_patterns(owner, observer, &patterns);
}

/// Run `fns` exactly like [`crate::deps`], but mark each as watch-only for
/// the caller's owning outermost target: on the target's next watch
/// rerun, these (and only these, plus the observers that called `watch`)
/// have their once-slots reset, while the rest of the dependency graph
/// stays latched (spec.md §4.H).
pub async fn watch_deps(fns: Vec<BoundFn>) -> Result<(), RuntimeError> {
    let stack = evaluator::current_stack();
    if let Some(owner) = stack.first().cloned() {
        let sup = WatchSupervisor::global();
        if sup.outermost.contains(&owner) {
            sup.register_watch_only(owner, &fns);
        }
    }
    evaluator::deps(fns).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_prefix_dir_strips_trailing_glob_segment() {
        assert_eq!(literal_prefix_dir("src/**/*.rs"), PathBuf::from("src"));
        assert_eq!(literal_prefix_dir("dir/*"), PathBuf::from("dir"));
    }

    #[test]
    fn literal_prefix_dir_of_a_literal_file_is_its_directory() {
        assert_eq!(literal_prefix_dir("dir/f.txt"), PathBuf::from("dir"));
    }

    #[test]
    fn literal_prefix_dir_of_a_literal_directory_is_itself() {
        assert_eq!(literal_prefix_dir("dir/subdir"), PathBuf::from("dir/subdir"));
    }

    #[tokio::test]
    async fn watch_outside_any_target_is_ignored() {
        WatchSupervisor::reset_all();
        watch(&["**/*.rs"]);
        assert_eq!(WatchSupervisor::global().targets.len(), 0);
    }

    #[tokio::test]
    async fn watch_registers_against_the_outermost_identity() {
        use crate::bind::{bare, f};

        WatchSupervisor::reset_all();
        Evaluator::reset_all();

        async fn w() -> Result<(), crate::FatalError> {
            watch(&["testdata/**"]);
            Ok(())
        }

        let id = f(w, ()).identity().clone();
        WatchSupervisor::mark_outermost(id.clone());

        evaluator::deps(vec![bare(w)]).await.unwrap();
        assert!(WatchSupervisor::is_watch_active(&id));
    }

    #[tokio::test]
    async fn idempotent_registration_keeps_one_watched_dir() {
        WatchSupervisor::reset_all();
        let owner = FnIdentity::new("Idempotent", ());
        WatchSupervisor::mark_outermost(owner.clone());
        let sup = WatchSupervisor::global();
        sup.register_patterns(owner.clone(), owner.clone(), &["a/**".to_string()]);
        sup.register_patterns(owner.clone(), owner.clone(), &["a/**".to_string()]);
        let state = sup.state_for(&owner);
        let inner = state.inner.lock().unwrap();
        assert_eq!(inner.patterns.len(), 1);
    }
}
