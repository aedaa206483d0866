//! Cache usage counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered with a cached value (fresh or stale).
    pub hits: u64,
    /// Reads that found nothing usable in the cache.
    pub misses: u64,
    /// Reads answered "absent" from a tombstone.
    pub tombstone_hits: u64,
    /// Calls made to the loader.
    pub loader_calls: u64,
    /// Reads that returned an expired envelope.
    pub stale_serves: u64,
    /// Lock attempts lost to another holder.
    pub lock_contention: u64,
    /// Backend calls that failed.
    pub backend_errors: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0). Tombstone hits count as hits.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits + self.tombstone_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Live counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    tombstone_hits: AtomicU64,
    loader_calls: AtomicU64,
    stale_serves: AtomicU64,
    lock_contention: AtomicU64,
    backend_errors: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn tombstone_hit(&self) {
        self.tombstone_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn loader_call(&self) {
        self.loader_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stale_serve(&self) {
        self.stale_serves.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn lock_contended(&self) {
        self.lock_contention.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn backend_error(&self) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            tombstone_hits: self.tombstone_hits.load(Ordering::Relaxed),
            loader_calls: self.loader_calls.load(Ordering::Relaxed),
            stale_serves: self.stale_serves.load(Ordering::Relaxed),
            lock_contention: self.lock_contention.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
        }
    }
}
