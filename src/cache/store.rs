//! Time-bounded response store.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::cache::entry::{fits, CacheEntry, MAX_KEY_LEN};
use crate::observability::metrics;

/// A thread-safe cache of backend responses keyed by raw request bytes.
///
/// Entries are kept newest-first, so when a key was inserted more than once
/// the most recent value wins. Expired entries are purged lazily on every
/// lookup and insert. There is no capacity bound.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<VecDeque<CacheEntry>>,
}

impl ResponseCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a stored response. Does not refresh the entry's lifetime.
    pub fn lookup(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.lookup_at(key, Instant::now())
    }

    /// [`lookup`](Self::lookup) against an explicit clock reading.
    pub fn lookup_at(&self, key: &[u8], now: Instant) -> Option<Vec<u8>> {
        let mut entries = self.lock();
        sweep(&mut entries, now);

        // Oversized keys are never stored, so they can only miss.
        let hit = if key.len() > MAX_KEY_LEN {
            None
        } else {
            entries
                .iter()
                .find(|entry| entry.matches(key))
                .map(|entry| entry.value().to_vec())
        };
        metrics::record_cache_lookup(hit.is_some());
        hit
    }

    /// Store a response. A zero `ttl` never expires.
    ///
    /// A key over [`MAX_KEY_LEN`] or a value over
    /// [`MAX_VALUE_LEN`](crate::cache::MAX_VALUE_LEN) is not stored, and
    /// neither is anything that fails to allocate. The cache is left
    /// unchanged in those cases.
    pub fn insert(&self, key: &[u8], value: &[u8], ttl: Duration) {
        self.insert_at(key, value, ttl, Instant::now());
    }

    /// [`insert`](Self::insert) against an explicit clock reading.
    pub fn insert_at(&self, key: &[u8], value: &[u8], ttl: Duration, now: Instant) {
        let mut entries = self.lock();
        sweep(&mut entries, now);

        if !fits(key, value) {
            tracing::debug!(key_len = key.len(), value_len = value.len(), "Cache insert skipped: entry too large");
            return;
        }
        let Some(entry) = CacheEntry::try_new(key, value, ttl, now) else {
            tracing::debug!(key_len = key.len(), "Cache insert dropped: allocation failed");
            return;
        };
        if entries.try_reserve(1).is_err() {
            tracing::debug!(key_len = key.len(), "Cache insert dropped: allocation failed");
            return;
        }
        entries.push_front(entry);
        metrics::record_cache_size(entries.len());
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn expire(&self) -> usize {
        self.expire_at(Instant::now())
    }

    /// [`expire`](Self::expire) against an explicit clock reading.
    pub fn expire_at(&self, now: Instant) -> usize {
        sweep(&mut self.lock(), now)
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock().clear();
        metrics::record_cache_size(0);
    }
}

fn sweep(entries: &mut VecDeque<CacheEntry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|entry| !entry.is_expired(now));
    let removed = before - entries.len();
    if removed > 0 {
        tracing::trace!(removed, remaining = entries.len(), "Expired cache entries purged");
        metrics::record_cache_size(entries.len());
    }
    removed
}
