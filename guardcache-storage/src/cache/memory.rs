//! In-process cache backend.
//!
//! Honors the same atomicity contract as the Redis backend within one
//! process. Expiry is measured with `tokio::time::Instant`, so tests running
//! on a paused clock see TTLs elapse when they advance time.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use guardcache_core::BackendError;
use tokio::time::Instant;

use super::traits::CacheBackend;

#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

/// Cache backend backed by a `HashMap` behind a mutex.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    slots: Mutex<HashMap<String, Slot>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_slots<R>(
        &self,
        operation: &'static str,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, Slot>, Instant) -> R,
    ) -> Result<R, BackendError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| BackendError::unavailable(operation, key, "backend mutex poisoned"))?;
        let now = Instant::now();
        // Expire lazily: only the touched key is checked.
        if slots.get(key).map_or(false, |slot| !slot.is_live(now)) {
            slots.remove(key);
        }
        Ok(f(&mut slots, now))
    }

    /// Remaining TTL of a live key; `Some(None)` for keys without expiry.
    pub fn ttl_of(&self, key: &str) -> Option<Option<Duration>> {
        self.with_slots("TTL", key, |slots, now| {
            slots
                .get(key)
                .map(|slot| slot.expires_at.map(|deadline| deadline - now))
        })
        .ok()
        .flatten()
    }

    /// True if a live value is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    /// Raw bytes stored under `key`, if live.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.with_slots("GET", key, |slots, _| {
            slots.get(key).map(|slot| slot.value.clone())
        })
        .ok()
        .flatten()
    }

    /// Store raw bytes without going through the async API.
    pub fn insert_raw(&self, key: &str, value: impl Into<Vec<u8>>, ttl: Option<Duration>) {
        let value = value.into();
        let _ = self.with_slots("SET", key, |slots, now| {
            slots.insert(
                key.to_string(),
                Slot {
                    value,
                    expires_at: ttl.map(|ttl| now + ttl),
                },
            );
        });
    }

    /// Number of live keys. Sweeps every expired key.
    pub fn len(&self) -> usize {
        self.with_slots("DBSIZE", "*", |slots, now| {
            slots.retain(|_, slot| slot.is_live(now));
            slots.len()
        })
        .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every key.
    pub fn clear(&self) {
        let _ = self.with_slots("FLUSHDB", "*", |slots, _| slots.clear());
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.with_slots("GET", key, |slots, _| {
            slots.get(key).map(|slot| slot.value.clone())
        })
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        self.with_slots("SET", key, |slots, now| {
            slots.insert(
                key.to_string(),
                Slot {
                    value: value.to_vec(),
                    expires_at: ttl.map(|ttl| now + ttl),
                },
            );
        })
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        self.with_slots("SET NX", key, |slots, now| {
            if slots.contains_key(key) {
                return false;
            }
            slots.insert(
                key.to_string(),
                Slot {
                    value: value.to_vec(),
                    expires_at: Some(now + ttl),
                },
            );
            true
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        self.with_slots("DEL", key, |slots, _| slots.remove(key).is_some())
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        expected: &[u8],
    ) -> Result<bool, BackendError> {
        self.with_slots("CAD", key, |slots, _| {
            match slots.get(key) {
                Some(slot) if slot.value == expected => {
                    slots.remove(key);
                    true
                }
                _ => false,
            }
        })
    }
}
