//! Registry of tracked subscriptions.
//!
//! One unbounded `LruCache` serves as both the fingerprint → entry map and the
//! eviction order (least recently touched at the head), so the two can never
//! disagree. Capacity is enforced by the reconciliation epoch, not on insert:
//! between an insert and the next epoch the registry may run over its limit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use lru::LruCache;
use time::OffsetDateTime;

use super::lock::mutex_lock;
use super::request::{Fingerprint, SubscriptionRequest};
use super::store::SubscriptionCallbacks;

const SOURCE: &str = "subs::registry";

/// One distinct subscription tracked by the cache.
pub(crate) struct CacheEntry {
    request: SubscriptionRequest,
    fingerprint: Fingerprint,
    identifier: String,
    callbacks: SubscriptionCallbacks,
    touched_at: Mutex<OffsetDateTime>,
    ready: AtomicBool,
    failed: AtomicBool,
}

impl CacheEntry {
    pub(crate) fn new(
        request: SubscriptionRequest,
        callbacks: SubscriptionCallbacks,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            fingerprint: request.fingerprint(),
            identifier: request.identifier(),
            request,
            callbacks,
            touched_at: Mutex::new(now),
            ready: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        }
    }

    pub(crate) fn request(&self) -> &SubscriptionRequest {
        &self.request
    }

    pub(crate) fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub(crate) fn identifier(&self) -> &str {
        &self.identifier
    }

    pub(crate) fn callbacks(&self) -> &SubscriptionCallbacks {
        &self.callbacks
    }

    pub(crate) fn touched_at(&self) -> OffsetDateTime {
        *mutex_lock(&self.touched_at, SOURCE, "touched_at")
    }

    pub(crate) fn touch(&self, now: OffsetDateTime) {
        *mutex_lock(&self.touched_at, SOURCE, "touch") = now;
    }

    /// Make this entry older than any expiration window.
    pub(crate) fn expire_now(&self) {
        *mutex_lock(&self.touched_at, SOURCE, "expire_now") = OffsetDateTime::UNIX_EPOCH;
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Record that the store reported a failure for this entry's handle.
    pub(crate) fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    /// Clear the failure mark, returning whether it was set.
    pub(crate) fn take_failed(&self) -> bool {
        self.failed.swap(false, Ordering::SeqCst)
    }
}

pub(crate) struct Registry {
    entries: LruCache<Fingerprint, Arc<CacheEntry>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
        }
    }

    /// Refresh an existing entry and move it to the tail.
    pub(crate) fn touch(
        &mut self,
        fingerprint: &Fingerprint,
        now: OffsetDateTime,
    ) -> Option<Arc<CacheEntry>> {
        let entry = self.entries.get(fingerprint)?.clone();
        entry.touch(now);
        Some(entry)
    }

    /// Add a new entry at the tail.
    pub(crate) fn insert(&mut self, entry: Arc<CacheEntry>) {
        self.entries.push(entry.fingerprint().clone(), entry);
    }

    /// Drop every entry last touched before `cutoff`, head first.
    pub(crate) fn expire(&mut self, cutoff: OffsetDateTime) -> Vec<Arc<CacheEntry>> {
        let stale: Vec<Fingerprint> = self
            .entries
            .iter()
            .rev()
            .filter(|(_, entry)| entry.touched_at() < cutoff)
            .map(|(fingerprint, _)| fingerprint.clone())
            .collect();

        stale
            .iter()
            .filter_map(|fingerprint| self.entries.pop(fingerprint))
            .collect()
    }

    /// Drop entries from the head until at most `limit` remain.
    pub(crate) fn evict_overflow(&mut self, limit: usize) -> Vec<Arc<CacheEntry>> {
        let mut evicted = Vec::new();
        while self.entries.len() > limit {
            match self.entries.pop_lru() {
                Some((_, entry)) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    /// All entries, least recently touched first.
    pub(crate) fn entries(&self) -> Vec<Arc<CacheEntry>> {
        self.entries
            .iter()
            .rev()
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    pub(crate) fn fingerprints(&self) -> Vec<Fingerprint> {
        self.entries
            .iter()
            .rev()
            .map(|(fingerprint, _)| fingerprint.clone())
            .collect()
    }

    pub(crate) fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains(fingerprint)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }
}
