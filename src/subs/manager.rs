//! The subscription cache.
//!
//! Many callers ask for the same handful of publications. [`SubscriptionCache`]
//! folds their requests into one bounded, deduplicated, time-expiring set of
//! live subscriptions and exposes a single aggregate readiness signal.
//!
//! All store work happens in the reconciliation epoch, a [`Computation`] that
//! re-runs whenever demand or readiness changes. Each run:
//!
//! 1. expires entries untouched for longer than the expiration window,
//! 2. evicts least recently touched entries beyond the capacity limit,
//! 3. materializes a live handle for every survivor,
//! 4. recomputes the aggregate readiness signal,
//! 5. releases the handles of whatever was dropped.
//!
//! Dropped handles are released only after survivors are materialized, and
//! `reset` stops the superseded epoch only after the replacement has run and
//! the tracker has flushed, so no wanted subscription is ever left without a
//! live handle.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::callbacks::Callbacks;
use super::clock::{Clock, SystemClock};
use super::config::SubsConfig;
use super::lock::mutex_lock;
use super::reactive::{Computation, Dependency, Tracker};
use super::registry::{CacheEntry, Registry};
use super::request::{Fingerprint, SubscriptionRequest};
use super::store::{ErrorFn, LiveSubscription, SubscriptionError, SubscriptionStore};

const SOURCE: &str = "subs::manager";

const METRIC_REQUEST_TOTAL: &str = "barkeep_subs_request_total";
const METRIC_EVICT_TOTAL: &str = "barkeep_subs_evict_total";
const METRIC_ERROR_TOTAL: &str = "barkeep_subs_error_total";
const METRIC_TRACKED: &str = "barkeep_subs_tracked";
const METRIC_RECONCILE_MS: &str = "barkeep_subs_reconcile_ms";

type EpochHandles = HashMap<Fingerprint, EpochHandle>;

/// A live store handle together with the entry it was opened for.
struct EpochHandle {
    entry: Arc<CacheEntry>,
    live: Box<dyn LiveSubscription>,
}

impl EpochHandle {
    /// Whether this handle may keep serving `entry`: it must have been opened
    /// for that very entry, and the entry must not have failed since.
    fn serves(&self, entry: &Arc<CacheEntry>, failed: bool) -> bool {
        !failed && Arc::ptr_eq(&self.entry, entry)
    }
}

/// Bounded, deduplicating cache of live subscriptions.
///
/// Cloning is cheap and yields another view of the same cache.
#[derive(Clone)]
pub struct SubscriptionCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    config: SubsConfig,
    store: Arc<dyn SubscriptionStore>,
    tracker: Tracker,
    clock: Arc<dyn Clock>,
    registry: Mutex<Registry>,
    ready: AtomicBool,
    readiness: Dependency,
    epoch: Mutex<Option<Computation>>,
}

impl SubscriptionCache {
    pub fn new(config: SubsConfig, store: Arc<dyn SubscriptionStore>, tracker: Tracker) -> Self {
        Self::with_clock(config, store, tracker, Arc::new(SystemClock))
    }

    /// Build a cache that reads time from `clock`. Starts the first epoch.
    pub fn with_clock(
        config: SubsConfig,
        store: Arc<dyn SubscriptionStore>,
        tracker: Tracker,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let inner = Arc::new(CacheInner {
            config,
            store,
            tracker,
            clock,
            registry: Mutex::new(Registry::new()),
            ready: AtomicBool::new(false),
            readiness: Dependency::new(),
            epoch: Mutex::new(None),
        });

        let epoch = spawn_epoch(&inner);
        *mutex_lock(&inner.epoch, SOURCE, "new") = Some(epoch);

        Self { inner }
    }

    /// Request a subscription on behalf of the caller running in `ctx`.
    ///
    /// Never fails; store-side failures reach the caller's error callback and
    /// are otherwise handled by dropping the entry on the next epoch.
    pub fn subscribe(
        &self,
        ctx: Option<&Computation>,
        request: SubscriptionRequest,
        callbacks: Callbacks,
    ) -> SubscriptionHandle {
        if request.is_noop() {
            return self.cached_handle();
        }

        if !self.inner.store.is_client_runtime() {
            counter!(METRIC_REQUEST_TOTAL, "outcome" => "passthrough").increment(1);
            let native = self.inner.store.subscribe(&request, callbacks.into_native());
            return SubscriptionHandle {
                kind: HandleKind::Direct(native),
            };
        }

        let now = self.inner.clock.now();
        let fingerprint = request.fingerprint();
        let created = {
            let mut registry = mutex_lock(&self.inner.registry, SOURCE, "subscribe");
            if registry.touch(&fingerprint, now).is_some() {
                false
            } else {
                registry.insert(self.new_entry(request, callbacks, now));
                true
            }
        };

        if created {
            counter!(METRIC_REQUEST_TOTAL, "outcome" => "miss").increment(1);
            debug!(fingerprint = %fingerprint, "subscription entry created");
            self.inner.ready.store(false, Ordering::SeqCst);
            notify_changed(&self.inner, ctx);
            rerun_subs(&self.inner, ctx);
        } else {
            counter!(METRIC_REQUEST_TOTAL, "outcome" => "hit").increment(1);
        }

        self.cached_handle()
    }

    /// Aggregate readiness. Registers `ctx` as a dependent.
    ///
    /// False while nothing is tracked.
    pub fn ready(&self, ctx: Option<&Computation>) -> bool {
        self.inner.ready(ctx)
    }

    /// Replace the reconciliation epoch with a fresh one.
    ///
    /// The replacement runs immediately and opens a new handle for every
    /// tracked entry; the previous epoch, and with it every old handle, is
    /// stopped once the tracker has flushed.
    pub fn reset(&self) {
        let next = spawn_epoch(&self.inner);
        let previous = mutex_lock(&self.inner.epoch, SOURCE, "reset").replace(next);

        debug!(had_previous = previous.is_some(), "subscription epoch replaced");
        if let Some(previous) = previous {
            self.inner.tracker.after_flush(move || previous.stop());
        }
    }

    /// Forget every entry now; handles are released by the next epoch.
    pub fn clear(&self) {
        let dropped = mutex_lock(&self.inner.registry, SOURCE, "clear").clear();
        if dropped > 0 {
            counter!(METRIC_EVICT_TOTAL, "reason" => "clear").increment(dropped as u64);
        }
        debug!(dropped, "subscription cache cleared");
        rerun_subs(&self.inner, None);
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.inner.registry, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        mutex_lock(&self.inner.registry, SOURCE, "is_empty").is_empty()
    }

    /// Tracked fingerprints, least recently touched first.
    pub fn fingerprints(&self) -> Vec<Fingerprint> {
        mutex_lock(&self.inner.registry, SOURCE, "fingerprints").fingerprints()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        mutex_lock(&self.inner.registry, SOURCE, "contains").contains(fingerprint)
    }

    /// Point-in-time view of every tracked entry, least recently touched first.
    pub fn entries(&self) -> Vec<EntrySnapshot> {
        mutex_lock(&self.inner.registry, SOURCE, "entries")
            .entries()
            .iter()
            .map(|entry| EntrySnapshot {
                fingerprint: entry.fingerprint().clone(),
                identifier: entry.identifier().to_string(),
                touched_at: entry.touched_at(),
                ready: entry.is_ready(),
            })
            .collect()
    }

    pub fn config(&self) -> &SubsConfig {
        &self.inner.config
    }

    pub fn tracker(&self) -> &Tracker {
        &self.inner.tracker
    }

    fn cached_handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            kind: HandleKind::Cached(Arc::downgrade(&self.inner)),
        }
    }

    fn new_entry(
        &self,
        request: SubscriptionRequest,
        callbacks: Callbacks,
        now: OffsetDateTime,
    ) -> Arc<CacheEntry> {
        let cache = Arc::downgrade(&self.inner);
        let identifier = request.identifier();
        Arc::new_cyclic(|entry: &Weak<CacheEntry>| {
            let on_error = error_handler(cache, entry.clone(), identifier);
            CacheEntry::new(request, callbacks.normalize(on_error), now)
        })
    }
}

impl fmt::Debug for SubscriptionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionCache")
            .field("config", &self.inner.config)
            .field("tracked", &self.len())
            .field("ready", &self.inner.ready.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl CacheInner {
    fn ready(&self, ctx: Option<&Computation>) -> bool {
        self.readiness.depend(ctx);
        if mutex_lock(&self.registry, SOURCE, "ready").is_empty() {
            return false;
        }
        self.ready.load(Ordering::SeqCst)
    }

    fn current_epoch(&self) -> Option<Computation> {
        mutex_lock(&self.epoch, SOURCE, "current_epoch").clone()
    }

    fn reconcile(self: &Arc<Self>, computation: &Computation, handles: &Mutex<EpochHandles>) {
        let started_at = Instant::now();
        let cutoff = self
            .clock
            .now()
            .checked_sub(self.config.expiration_window())
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let limit = self.config.capacity_limit_non_zero().get();

        let (expired, evicted, survivors) = {
            let mut registry = mutex_lock(&self.registry, SOURCE, "reconcile");
            let expired = registry.expire(cutoff);
            let evicted = registry.evict_overflow(limit);
            (expired, evicted, registry.entries())
        };

        for entry in &expired {
            debug!(subscription = entry.identifier(), "subscription expired");
        }
        for entry in &evicted {
            debug!(subscription = entry.identifier(), "subscription evicted for capacity");
        }
        if !expired.is_empty() {
            counter!(METRIC_EVICT_TOTAL, "reason" => "expired").increment(expired.len() as u64);
        }
        if !evicted.is_empty() {
            counter!(METRIC_EVICT_TOTAL, "reason" => "capacity").increment(evicted.len() as u64);
        }

        let mut previous = mem::take(&mut *mutex_lock(handles, SOURCE, "reconcile.take"));
        let mut current = EpochHandles::with_capacity(survivors.len());
        let mut superseded = Vec::new();
        let mut all_ready = !survivors.is_empty();

        for entry in &survivors {
            let failed = entry.take_failed();
            let live = match previous.remove(entry.fingerprint()) {
                Some(held) if held.serves(entry, failed) => held.live,
                held => {
                    if failed {
                        debug!(subscription = entry.identifier(), "resubscribing after failure");
                    }
                    superseded.extend(held.map(|held| held.live));
                    self.store
                        .subscribe(entry.request(), entry.callbacks().clone())
                }
            };
            let ready = live.ready(Some(computation));
            entry.set_ready(ready);
            all_ready &= ready;
            current.insert(
                entry.fingerprint().clone(),
                EpochHandle {
                    entry: entry.clone(),
                    live,
                },
            );
        }

        *mutex_lock(handles, SOURCE, "reconcile.store") = current;
        let released = previous.len() + superseded.len();
        for live in previous.into_values().map(|held| held.live).chain(superseded) {
            live.stop();
        }
        if computation.is_stopped() {
            release_handles(handles);
        }

        let was_ready = self.ready.swap(all_ready, Ordering::SeqCst);
        if was_ready != all_ready {
            notify_changed(self, Some(computation));
        }

        gauge!(METRIC_TRACKED).set(survivors.len() as f64);
        histogram!(METRIC_RECONCILE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        debug!(
            epoch = computation.id(),
            tracked = survivors.len(),
            released,
            ready = all_ready,
            "subscription epoch reconciled"
        );
    }
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        let epoch = match self.epoch.get_mut() {
            Ok(epoch) => epoch.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(epoch) = epoch {
            epoch.stop();
        }
    }
}

fn spawn_epoch(inner: &Arc<CacheInner>) -> Computation {
    let cache = Arc::downgrade(inner);
    let handles: Arc<Mutex<EpochHandles>> = Arc::default();

    let owned = handles.clone();
    let computation = inner.tracker.autorun(move |computation| {
        if let Some(cache) = cache.upgrade() {
            cache.reconcile(computation, &owned);
        }
    });
    computation.on_stop(move || release_handles(&handles));
    computation
}

fn release_handles(handles: &Mutex<EpochHandles>) {
    let released = mem::take(&mut *mutex_lock(handles, SOURCE, "release_handles"));
    for held in released.into_values() {
        held.live.stop();
    }
}

/// Notify readiness dependents; deferred to the end of the flush when called
/// from inside a computation.
fn notify_changed(inner: &Arc<CacheInner>, ctx: Option<&Computation>) {
    if ctx.is_none() {
        inner.readiness.changed();
        return;
    }
    let cache = Arc::downgrade(inner);
    inner.tracker.after_flush(move || {
        if let Some(cache) = cache.upgrade() {
            cache.readiness.changed();
        }
    });
}

/// Invalidate the current epoch; deferred to the end of the flush when called
/// from inside a computation.
fn rerun_subs(inner: &Arc<CacheInner>, ctx: Option<&Computation>) {
    if ctx.is_none() {
        if let Some(epoch) = inner.current_epoch() {
            epoch.invalidate();
        }
        return;
    }
    defer_rerun(inner);
}

fn defer_rerun(inner: &Arc<CacheInner>) {
    let cache = Arc::downgrade(inner);
    inner.tracker.after_flush(move || {
        if let Some(epoch) = cache.upgrade().and_then(|cache| cache.current_epoch()) {
            epoch.invalidate();
        }
    });
}

fn error_handler(cache: Weak<CacheInner>, entry: Weak<CacheEntry>, identifier: String) -> ErrorFn {
    Arc::new(move |error: &SubscriptionError| {
        warn!(
            subscription = %identifier,
            reason = %error.reason,
            code = error.code.as_deref(),
            "subscription failed"
        );
        counter!(METRIC_ERROR_TOTAL).increment(1);

        if let Some(entry) = entry.upgrade() {
            entry.mark_failed();
            entry.expire_now();
        }
        if let Some(cache) = cache.upgrade() {
            defer_rerun(&cache);
        }
    })
}

/// What a caller gets back from [`SubscriptionCache::subscribe`].
pub struct SubscriptionHandle {
    kind: HandleKind,
}

enum HandleKind {
    /// Backed by the cache; readiness is the cache's aggregate signal.
    Cached(Weak<CacheInner>),
    /// Forwarded to the store uncached.
    Direct(Box<dyn LiveSubscription>),
}

impl SubscriptionHandle {
    pub fn ready(&self, ctx: Option<&Computation>) -> bool {
        match &self.kind {
            HandleKind::Cached(cache) => cache.upgrade().is_some_and(|cache| cache.ready(ctx)),
            HandleKind::Direct(handle) => handle.ready(ctx),
        }
    }

    /// Stop a forwarded subscription. Cached subscriptions belong to the
    /// cache, so this is a no-op for them.
    pub fn stop(&self) {
        if let HandleKind::Direct(handle) = &self.kind {
            handle.stop();
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self.kind, HandleKind::Cached(_))
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("cached", &self.is_cached())
            .finish()
    }
}

/// One tracked entry as seen from outside the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot {
    pub fingerprint: Fingerprint,
    pub identifier: String,
    pub touched_at: OffsetDateTime,
    pub ready: bool,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use time::Duration;

    use super::*;
    use crate::subs::clock::ManualClock;
    use crate::subs::memory::{MemoryStore, StoreEvent};

    struct Fixture {
        store: MemoryStore,
        clock: Arc<ManualClock>,
        tracker: Tracker,
        cache: SubscriptionCache,
    }

    fn fixture(capacity_limit: usize, expiration_window_minutes: u64) -> Fixture {
        fixture_with(MemoryStore::client(), capacity_limit, expiration_window_minutes)
    }

    fn fixture_with(
        store: MemoryStore,
        capacity_limit: usize,
        expiration_window_minutes: u64,
    ) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let tracker = Tracker::new();
        let cache = SubscriptionCache::with_clock(
            SubsConfig {
                capacity_limit,
                expiration_window_minutes,
            },
            Arc::new(store.clone()),
            tracker.clone(),
            clock.clone(),
        );
        Fixture {
            store,
            clock,
            tracker,
            cache,
        }
    }

    fn request(name: &str) -> SubscriptionRequest {
        SubscriptionRequest::new(name)
    }

    #[test]
    fn empty_cache_is_not_ready() {
        let fx = fixture(10, 50);
        assert!(!fx.cache.ready(None));
        assert!(fx.cache.is_empty());
        assert_eq!(fx.store.subscribe_count(), 0);
    }

    #[test]
    fn subscribe_defers_store_work_to_flush() {
        let fx = fixture(10, 50);
        fx.cache.subscribe(None, request("products"), Callbacks::None);

        assert_eq!(fx.cache.len(), 1);
        assert_eq!(fx.store.subscribe_count(), 0);

        fx.tracker.flush();
        assert_eq!(fx.store.subscribe_count(), 1);
        assert_eq!(fx.store.live_count(), 1);
    }

    #[test]
    fn equal_requests_share_one_entry() {
        let fx = fixture(10, 50);
        let params = serde_json::json!({ "shift": 2, "bar": "main" });
        let reordered = serde_json::json!({ "bar": "main", "shift": 2 });

        fx.cache.subscribe(
            None,
            SubscriptionRequest::with_params("sales", vec![params]),
            Callbacks::None,
        );
        fx.cache.subscribe(
            None,
            SubscriptionRequest::with_params("sales", vec![reordered]),
            Callbacks::None,
        );
        fx.tracker.flush();

        assert_eq!(fx.cache.len(), 1);
        assert_eq!(fx.store.subscribe_count(), 1);
    }

    #[test]
    fn empty_name_is_noop() {
        let fx = fixture(10, 50);
        let handle = fx.cache.subscribe(None, request(""), Callbacks::None);
        fx.tracker.flush();

        assert!(handle.is_cached());
        assert!(!handle.ready(None));
        assert!(fx.cache.is_empty());
        assert_eq!(fx.store.subscribe_count(), 0);
    }

    #[test]
    fn server_runtime_passes_through() {
        let store = MemoryStore::server().with_auto_ready(true);
        let tracker = Tracker::new();
        let cache =
            SubscriptionCache::new(SubsConfig::default(), Arc::new(store.clone()), tracker.clone());

        let handle = cache.subscribe(None, request("products"), Callbacks::None);
        assert!(!handle.is_cached());
        assert!(handle.ready(None));
        assert!(cache.is_empty());
        assert_eq!(store.subscribe_count(), 1);

        handle.stop();
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn readiness_follows_every_handle() {
        let fx = fixture(10, 50);
        fx.cache.subscribe(None, request("a"), Callbacks::None);
        fx.cache.subscribe(None, request("b"), Callbacks::None);
        fx.tracker.flush();
        assert!(!fx.cache.ready(None));

        fx.store.mark_ready("a");
        fx.tracker.flush();
        assert!(!fx.cache.ready(None));

        fx.store.mark_ready("b");
        fx.tracker.flush();
        assert!(fx.cache.ready(None));
        assert!(fx.cache.entries().iter().all(|entry| entry.ready));
    }

    #[test]
    fn new_entry_drops_readiness_until_reconciled() {
        let fx = fixture_with(MemoryStore::client().with_auto_ready(true), 10, 50);
        fx.cache.subscribe(None, request("a"), Callbacks::None);
        fx.tracker.flush();
        assert!(fx.cache.ready(None));

        fx.cache.subscribe(None, request("b"), Callbacks::None);
        assert!(!fx.cache.ready(None));
        fx.tracker.flush();
        assert!(fx.cache.ready(None));
    }

    #[test]
    fn readiness_dependents_rerun_on_change() {
        let fx = fixture(10, 50);
        let observed = Arc::new(Mutex::new(Vec::new()));

        let cache = fx.cache.clone();
        let seen = observed.clone();
        fx.tracker.autorun(move |computation| {
            let handle = cache.subscribe(Some(computation), request("stock"), Callbacks::None);
            seen.lock()
                .expect("observed lock")
                .push(handle.ready(Some(computation)));
        });
        fx.tracker.flush();
        fx.store.mark_ready("stock");
        fx.tracker.flush();

        let observed = observed.lock().expect("observed lock");
        assert_eq!(observed.first(), Some(&false));
        assert_eq!(observed.last(), Some(&true));
        assert_eq!(fx.store.subscribe_count(), 1);
    }

    #[test]
    fn capacity_evicts_least_recently_touched() {
        let fx = fixture(2, 50);
        for name in ["a", "b", "c"] {
            fx.cache.subscribe(None, request(name), Callbacks::None);
        }
        fx.tracker.flush();

        let names: Vec<String> = fx
            .cache
            .fingerprints()
            .iter()
            .map(|fingerprint| fingerprint.to_string())
            .collect();
        assert_eq!(names, vec![r#"["b"]"#, r#"["c"]"#]);
        assert!(!fx.cache.contains(&request("a").fingerprint()));
    }

    #[test]
    fn retouch_protects_from_eviction() {
        let fx = fixture(2, 50);
        fx.cache.subscribe(None, request("a"), Callbacks::None);
        fx.cache.subscribe(None, request("b"), Callbacks::None);
        fx.cache.subscribe(None, request("a"), Callbacks::None);
        fx.cache.subscribe(None, request("c"), Callbacks::None);
        fx.tracker.flush();

        assert!(fx.cache.contains(&request("a").fingerprint()));
        assert!(!fx.cache.contains(&request("b").fingerprint()));
    }

    #[test]
    fn expiration_drops_stale_entries_on_next_epoch() {
        let fx = fixture(10, 50);
        fx.cache.subscribe(None, request("x"), Callbacks::None);
        fx.tracker.flush();

        fx.clock.advance(Duration::minutes(49));
        fx.cache.subscribe(None, request("y"), Callbacks::None);
        fx.tracker.flush();
        assert_eq!(fx.cache.len(), 2);

        fx.clock.advance(Duration::minutes(2));
        fx.cache.subscribe(None, request("z"), Callbacks::None);
        fx.tracker.flush();

        assert!(!fx.cache.contains(&request("x").fingerprint()));
        assert!(fx.cache.contains(&request("y").fingerprint()));
        assert_eq!(fx.store.live_count(), 2);
    }

    #[test]
    fn error_expires_entry_and_runs_caller_handler() {
        let fx = fixture(10, 50);
        let caller_errors = Arc::new(AtomicUsize::new(0));
        let seen = caller_errors.clone();
        fx.cache.subscribe(
            None,
            request("z"),
            Callbacks::on_error(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        fx.tracker.flush();

        fx.store.fail("z", &SubscriptionError::new("not authorized"));
        fx.tracker.flush();

        assert_eq!(caller_errors.load(Ordering::SeqCst), 1);
        assert!(fx.cache.is_empty());
        assert_eq!(fx.store.live_count(), 0);
    }

    #[test]
    fn clear_releases_every_handle() {
        let fx = fixture(10, 50);
        fx.cache.subscribe(None, request("a"), Callbacks::None);
        fx.cache.subscribe(None, request("b"), Callbacks::None);
        fx.tracker.flush();
        assert_eq!(fx.store.live_count(), 2);

        fx.cache.clear();
        assert!(fx.cache.is_empty());
        fx.tracker.flush();

        assert_eq!(fx.store.live_count(), 0);
        assert!(!fx.cache.ready(None));
    }

    #[test]
    fn reset_opens_new_handles_before_stopping_old() {
        let fx = fixture(10, 50);
        fx.cache.subscribe(None, request("p"), Callbacks::None);
        fx.tracker.flush();
        fx.store.clear_events();

        fx.cache.reset();
        assert_eq!(fx.store.live_count(), 2);
        fx.tracker.flush();

        let events = fx.store.events();
        assert!(matches!(events[0], StoreEvent::Subscribed { handle: 2, .. }));
        assert!(matches!(events[1], StoreEvent::Stopped { handle: 1, .. }));
        assert_eq!(fx.store.live_count(), 1);
    }

    #[test]
    fn dropping_cache_releases_handles() {
        let fx = fixture(10, 50);
        fx.cache.subscribe(None, request("a"), Callbacks::None);
        fx.tracker.flush();
        assert_eq!(fx.store.live_count(), 1);

        drop(fx.cache);
        assert_eq!(fx.store.live_count(), 0);
    }
}
