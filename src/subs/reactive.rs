//! Reactive runtime consumed by the subscription cache.
//!
//! - [`Tracker`]: owns the queue of invalidated computations and the
//!   after-flush task queue; [`Tracker::flush`] drains both.
//! - [`Computation`]: a re-runnable unit of work created by
//!   [`Tracker::autorun`].
//! - [`Dependency`]: a listener set that invalidates its dependents on change.
//!
//! There is no ambient "current computation". Callers that run inside a
//! computation pass it explicitly as `Option<&Computation>`.
//!
//! # Invariants
//!
//! 1. `autorun` runs its function once before returning.
//! 2. An invalidated computation is queued at most once and re-runs on the
//!    next `flush`, before any after-flush task of that flush.
//! 3. After-flush tasks run in FIFO order; work they queue is drained by the
//!    same `flush`.
//! 4. A stopped computation never runs again and runs its stop hooks once.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;
use tracing::trace;

use super::lock::mutex_lock;

const SOURCE: &str = "subs::reactive";

type Task = Box<dyn FnOnce() + Send + 'static>;
type RunFn = Box<dyn FnMut(&Computation) + Send + 'static>;

/// Deferred work queue standing in for the host's reactive flush cycle.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    pending: Mutex<VecDeque<Computation>>,
    after_flush: Mutex<VecDeque<Task>>,
    flushing: AtomicBool,
    next_id: AtomicU64,
    work: Notify,
}

impl TrackerInner {
    fn schedule(&self, computation: Computation) {
        trace!(computation = computation.id(), "computation queued for re-run");
        mutex_lock(&self.pending, SOURCE, "schedule").push_back(computation);
        self.work.notify_one();
    }
}

struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Tracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                pending: Mutex::new(VecDeque::new()),
                after_flush: Mutex::new(VecDeque::new()),
                flushing: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                work: Notify::new(),
            }),
        }
    }

    /// Run `f` now and again on every flush after it has been invalidated.
    pub fn autorun<F>(&self, f: F) -> Computation
    where
        F: FnMut(&Computation) + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let computation = Computation {
            inner: Arc::new(ComputationInner {
                id,
                tracker: Arc::downgrade(&self.inner),
                state: Mutex::new(ComputationState::default()),
                run: Mutex::new(Some(Box::new(f))),
                on_stop: Mutex::new(Vec::new()),
            }),
        };
        computation.run_once();
        computation
    }

    /// Defer `task` until the current batch of re-runs has finished.
    pub fn after_flush<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        mutex_lock(&self.inner.after_flush, SOURCE, "after_flush").push_back(Box::new(task));
        self.inner.work.notify_one();
    }

    /// Re-run invalidated computations, then after-flush tasks, until both
    /// queues are empty.
    ///
    /// Returns the number of computation re-runs. A nested call made while a
    /// flush is already in progress returns 0 and leaves the work to the outer
    /// flush.
    pub fn flush(&self) -> usize {
        if self.inner.flushing.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let _guard = FlushGuard(&self.inner.flushing);

        let mut reruns = 0;
        loop {
            let next = mutex_lock(&self.inner.pending, SOURCE, "flush.pending").pop_front();
            if let Some(computation) = next {
                if computation.rerun() {
                    reruns += 1;
                }
                continue;
            }

            let task = mutex_lock(&self.inner.after_flush, SOURCE, "flush.after_flush").pop_front();
            match task {
                Some(task) => task(),
                None => break,
            }
        }
        reruns
    }

    pub fn is_flushing(&self) -> bool {
        self.inner.flushing.load(Ordering::SeqCst)
    }

    /// True when a flush would have something to do.
    pub fn has_pending_work(&self) -> bool {
        !mutex_lock(&self.inner.pending, SOURCE, "has_pending_work.pending").is_empty()
            || !mutex_lock(&self.inner.after_flush, SOURCE, "has_pending_work.after_flush")
                .is_empty()
    }

    /// Resolves once work has been queued since the last wake-up.
    pub async fn work_available(&self) {
        self.inner.work.notified().await;
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("flushing", &self.is_flushing())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct ComputationState {
    invalidated: bool,
    stopped: bool,
    runs: u64,
}

struct ComputationInner {
    id: u64,
    tracker: Weak<TrackerInner>,
    state: Mutex<ComputationState>,
    run: Mutex<Option<RunFn>>,
    on_stop: Mutex<Vec<Task>>,
}

/// A re-runnable unit of reactive work.
#[derive(Clone)]
pub struct Computation {
    inner: Arc<ComputationInner>,
}

impl Computation {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_stopped(&self) -> bool {
        mutex_lock(&self.inner.state, SOURCE, "is_stopped").stopped
    }

    pub fn is_invalidated(&self) -> bool {
        mutex_lock(&self.inner.state, SOURCE, "is_invalidated").invalidated
    }

    /// Number of completed runs, the initial one included.
    pub fn run_count(&self) -> u64 {
        mutex_lock(&self.inner.state, SOURCE, "run_count").runs
    }

    /// Mark for re-run on the next flush.
    pub fn invalidate(&self) {
        let schedule = {
            let mut state = mutex_lock(&self.inner.state, SOURCE, "invalidate");
            if state.invalidated {
                false
            } else {
                state.invalidated = true;
                !state.stopped
            }
        };

        if !schedule {
            return;
        }
        if let Some(tracker) = self.inner.tracker.upgrade() {
            tracker.schedule(self.clone());
        }
    }

    /// Deactivate permanently and run the stop hooks.
    pub fn stop(&self) {
        {
            let mut state = mutex_lock(&self.inner.state, SOURCE, "stop");
            if state.stopped {
                return;
            }
            state.stopped = true;
            state.invalidated = true;
        }

        let hooks = mem::take(&mut *mutex_lock(&self.inner.on_stop, SOURCE, "stop.hooks"));
        let run = mutex_lock(&self.inner.run, SOURCE, "stop.run").take();
        drop(run);

        trace!(computation = self.id(), hooks = hooks.len(), "computation stopped");
        for hook in hooks {
            hook();
        }
    }

    /// Register a hook that runs when this computation stops. Runs immediately
    /// if it already has.
    pub fn on_stop<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_stopped() {
            hook();
            return;
        }
        mutex_lock(&self.inner.on_stop, SOURCE, "on_stop").push(Box::new(hook));
    }

    fn run_once(&self) {
        // `None` while the function is already on the stack or after `stop`.
        let Some(mut run) = mutex_lock(&self.inner.run, SOURCE, "run.take").take() else {
            return;
        };

        run(self);

        let mut state = mutex_lock(&self.inner.state, SOURCE, "run.finish");
        state.runs += 1;
        if !state.stopped {
            *mutex_lock(&self.inner.run, SOURCE, "run.restore") = Some(run);
        }
    }

    fn rerun(&self) -> bool {
        {
            let mut state = mutex_lock(&self.inner.state, SOURCE, "rerun");
            if state.stopped || !state.invalidated {
                return false;
            }
            state.invalidated = false;
        }
        self.run_once();
        true
    }
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("id", &self.id())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Listener set for one piece of reactive state.
#[derive(Default)]
pub struct Dependency {
    dependents: Mutex<HashMap<u64, Weak<ComputationInner>>>,
}

impl Dependency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ctx` as a dependent. Without a context this is a no-op.
    ///
    /// Returns true if `ctx` was not already registered.
    pub fn depend(&self, ctx: Option<&Computation>) -> bool {
        let Some(computation) = ctx else {
            return false;
        };
        if computation.is_stopped() {
            return false;
        }
        mutex_lock(&self.dependents, SOURCE, "depend")
            .insert(computation.id(), Arc::downgrade(&computation.inner))
            .is_none()
    }

    /// Invalidate every registered dependent and forget them; they register
    /// again when they re-run.
    pub fn changed(&self) {
        let dependents = mem::take(&mut *mutex_lock(&self.dependents, SOURCE, "changed"));
        for inner in dependents.into_values().filter_map(|weak| weak.upgrade()) {
            Computation { inner }.invalidate();
        }
    }

    pub fn has_dependents(&self) -> bool {
        !mutex_lock(&self.dependents, SOURCE, "has_dependents").is_empty()
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("dependents", &mutex_lock(&self.dependents, SOURCE, "debug").len())
            .finish()
    }
}
