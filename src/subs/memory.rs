//! In-memory subscription store.
//!
//! Stands in for the real document store in tests and in `barkeep replay`.
//! Every subscribe and stop is appended to an ordered event log, so callers can
//! assert on the exact interleaving of new and released subscriptions.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tracing::debug;

use super::lock::mutex_lock;
use super::reactive::{Computation, Dependency};
use super::request::SubscriptionRequest;
use super::store::{LiveSubscription, SubscriptionCallbacks, SubscriptionError, SubscriptionStore};

const SOURCE: &str = "subs::memory";

/// One observable store-side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    Subscribed { handle: u64, fingerprint: String },
    Ready { handle: u64, fingerprint: String },
    Failed { handle: u64, fingerprint: String, reason: String },
    Stopped { handle: u64, fingerprint: String },
}

impl StoreEvent {
    pub fn handle(&self) -> u64 {
        match self {
            Self::Subscribed { handle, .. }
            | Self::Ready { handle, .. }
            | Self::Failed { handle, .. }
            | Self::Stopped { handle, .. } => *handle,
        }
    }
}

#[derive(Debug, Default)]
struct HandleState {
    ready: bool,
    stopped: bool,
    failed: bool,
}

struct HandleShared {
    id: u64,
    name: String,
    fingerprint: String,
    state: Mutex<HandleState>,
    callbacks: SubscriptionCallbacks,
    readiness: Dependency,
}

struct MemoryInner {
    client: bool,
    auto_ready: AtomicBool,
    next_id: AtomicU64,
    live: Mutex<Vec<Arc<HandleShared>>>,
    log: Mutex<Vec<StoreEvent>>,
}

impl MemoryInner {
    fn record(&self, event: StoreEvent) {
        debug!(?event, "memory store event");
        mutex_lock(&self.log, SOURCE, "record").push(event);
    }

    fn live_named(&self, name: &str) -> Vec<Arc<HandleShared>> {
        mutex_lock(&self.live, SOURCE, "live_named")
            .iter()
            .filter(|handle| handle.name == name)
            .cloned()
            .collect()
    }

    fn mark_ready(&self, handle: &HandleShared) -> bool {
        {
            let mut state = mutex_lock(&handle.state, SOURCE, "mark_ready");
            if state.ready || state.stopped || state.failed {
                return false;
            }
            state.ready = true;
        }
        self.record(StoreEvent::Ready {
            handle: handle.id,
            fingerprint: handle.fingerprint.clone(),
        });
        handle.callbacks.notify_ready();
        handle.readiness.changed();
        true
    }
}

/// Shared, cloneable in-memory store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    /// A store on a runtime that holds live subscriptions.
    pub fn client() -> Self {
        Self::new(true)
    }

    /// A store on a runtime without live subscriptions; the cache passes
    /// requests straight through.
    pub fn server() -> Self {
        Self::new(false)
    }

    fn new(client: bool) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                client,
                auto_ready: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                live: Mutex::new(Vec::new()),
                log: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Report every new subscription ready as soon as it is opened.
    pub fn with_auto_ready(self, auto_ready: bool) -> Self {
        self.inner.auto_ready.store(auto_ready, Ordering::SeqCst);
        self
    }

    /// Deliver the initial data set for every live subscription to `name`.
    ///
    /// Returns the number of handles that became ready.
    pub fn mark_ready(&self, name: &str) -> usize {
        self.inner
            .live_named(name)
            .iter()
            .filter(|handle| self.inner.mark_ready(handle))
            .count()
    }

    /// Fail every live subscription to `name` with `error`.
    pub fn fail(&self, name: &str, error: &SubscriptionError) -> usize {
        let mut failed = 0;
        for handle in self.inner.live_named(name) {
            {
                let mut state = mutex_lock(&handle.state, SOURCE, "fail");
                if state.stopped || state.failed {
                    continue;
                }
                state.failed = true;
                state.ready = false;
            }
            self.inner.record(StoreEvent::Failed {
                handle: handle.id,
                fingerprint: handle.fingerprint.clone(),
                reason: error.reason.clone(),
            });
            handle.callbacks.notify_error(error);
            handle.readiness.changed();
            failed += 1;
        }
        failed
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        mutex_lock(&self.inner.log, SOURCE, "events").clone()
    }

    pub fn clear_events(&self) {
        mutex_lock(&self.inner.log, SOURCE, "clear_events").clear();
    }

    /// Total subscriptions ever opened.
    pub fn subscribe_count(&self) -> usize {
        mutex_lock(&self.inner.log, SOURCE, "subscribe_count")
            .iter()
            .filter(|event| matches!(event, StoreEvent::Subscribed { .. }))
            .count()
    }

    pub fn live_count(&self) -> usize {
        mutex_lock(&self.inner.live, SOURCE, "live_count").len()
    }

    /// Fingerprints of live subscriptions, oldest first; duplicates appear
    /// while two handles back the same request.
    pub fn live_fingerprints(&self) -> Vec<String> {
        mutex_lock(&self.inner.live, SOURCE, "live_fingerprints")
            .iter()
            .map(|handle| handle.fingerprint.clone())
            .collect()
    }
}

impl SubscriptionStore for MemoryStore {
    fn is_client_runtime(&self) -> bool {
        self.inner.client
    }

    fn subscribe(
        &self,
        request: &SubscriptionRequest,
        callbacks: SubscriptionCallbacks,
    ) -> Box<dyn LiveSubscription> {
        let shared = Arc::new(HandleShared {
            id: self.inner.next_id.fetch_add(1, Ordering::SeqCst),
            name: request.name().to_string(),
            fingerprint: request.fingerprint().to_string(),
            state: Mutex::new(HandleState::default()),
            callbacks,
            readiness: Dependency::new(),
        });

        self.inner.record(StoreEvent::Subscribed {
            handle: shared.id,
            fingerprint: shared.fingerprint.clone(),
        });
        mutex_lock(&self.inner.live, SOURCE, "subscribe").push(shared.clone());

        if self.inner.auto_ready.load(Ordering::SeqCst) {
            self.inner.mark_ready(&shared);
        }

        Box::new(MemoryHandle {
            shared,
            store: Arc::downgrade(&self.inner),
        })
    }
}

struct MemoryHandle {
    shared: Arc<HandleShared>,
    store: Weak<MemoryInner>,
}

impl LiveSubscription for MemoryHandle {
    fn ready(&self, ctx: Option<&Computation>) -> bool {
        self.shared.readiness.depend(ctx);
        mutex_lock(&self.shared.state, SOURCE, "ready").ready
    }

    fn stop(&self) {
        {
            let mut state = mutex_lock(&self.shared.state, SOURCE, "stop");
            if state.stopped {
                return;
            }
            state.stopped = true;
            state.ready = false;
        }

        let Some(store) = self.store.upgrade() else {
            return;
        };
        mutex_lock(&store.live, SOURCE, "stop").retain(|handle| handle.id != self.shared.id);
        store.record(StoreEvent::Stopped {
            handle: self.shared.id,
            fingerprint: self.shared.fingerprint.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::subs::reactive::Tracker;

    fn request(name: &str) -> SubscriptionRequest {
        SubscriptionRequest::new(name)
    }

    #[test]
    fn subscribe_and_stop_are_logged_once() {
        let store = MemoryStore::client();
        let handle = store.subscribe(&request("products"), SubscriptionCallbacks::default());

        assert_eq!(store.live_count(), 1);
        handle.stop();
        handle.stop();

        assert_eq!(store.live_count(), 0);
        let events = store.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StoreEvent::Subscribed { handle: 1, .. }));
        assert!(matches!(events[1], StoreEvent::Stopped { handle: 1, .. }));
    }

    #[test]
    fn mark_ready_fires_callback_and_invalidates_dependents() {
        let store = MemoryStore::client();
        let ready_calls = Arc::new(AtomicUsize::new(0));
        let seen = ready_calls.clone();
        let handle: Arc<dyn LiveSubscription> = Arc::from(store.subscribe(
            &request("products"),
            SubscriptionCallbacks {
                on_ready: Some(Arc::new(move || {
                    seen.fetch_add(1, Ordering::SeqCst);
                })),
                on_error: None,
            },
        ));

        let tracker = Tracker::new();
        let observed = Arc::new(AtomicBool::new(false));
        let watched = handle.clone();
        let flag = observed.clone();
        tracker.autorun(move |computation| {
            flag.store(watched.ready(Some(computation)), Ordering::SeqCst);
        });
        assert!(!observed.load(Ordering::SeqCst));

        assert_eq!(store.mark_ready("products"), 1);
        assert_eq!(store.mark_ready("products"), 0);
        tracker.flush();

        assert!(observed.load(Ordering::SeqCst));
        assert_eq!(ready_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn auto_ready_marks_on_subscribe() {
        let store = MemoryStore::client().with_auto_ready(true);
        let handle = store.subscribe(&request("stock"), SubscriptionCallbacks::default());
        assert!(handle.ready(None));
    }

    #[test]
    fn fail_reports_reason_to_error_callback() {
        let store = MemoryStore::client();
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let seen = reasons.clone();
        let _handle = store.subscribe(
            &request("z"),
            SubscriptionCallbacks {
                on_ready: None,
                on_error: Some(Arc::new(move |error: &SubscriptionError| {
                    seen.lock().expect("reasons lock").push(error.reason.clone());
                })),
            },
        );

        assert_eq!(store.fail("z", &SubscriptionError::new("not authorized")), 1);
        assert_eq!(*reasons.lock().expect("reasons lock"), vec!["not authorized"]);
        assert_eq!(store.mark_ready("z"), 0);
    }

    #[test]
    fn server_store_is_not_client_runtime() {
        assert!(!MemoryStore::server().is_client_runtime());
        assert!(MemoryStore::client().is_client_runtime());
    }
}
