//! guardcache Test Utilities
//!
//! Centralized test infrastructure for the guardcache workspace:
//! - Backend decorators that count calls or simulate an outage
//! - A scripted loader standing in for the authoritative store
//! - Proptest generators for configuration and keys
//! - Fixtures for common cache states

// Re-export the in-memory backend from its source crate
pub use guardcache_storage::InMemoryBackend;

// Re-export core types for convenience
pub use guardcache_core::{
    BackendError, CacheConfig, CacheError, CacheResult, Envelope, KeySpace, LoaderError,
    LockMode, LockRetryPolicy,
};

use async_trait::async_trait;
use guardcache_storage::{CacheBackend, Loader};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// BACKEND DECORATORS
// ============================================================================

/// Number of calls seen by a [`CountingBackend`], per operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendCalls {
    pub gets: u64,
    pub sets: u64,
    pub set_if_absents: u64,
    pub deletes: u64,
    pub compare_and_deletes: u64,
}

/// Backend decorator counting every call before forwarding it.
#[derive(Debug, Default)]
pub struct CountingBackend<B> {
    inner: B,
    gets: AtomicU64,
    sets: AtomicU64,
    set_if_absents: AtomicU64,
    deletes: AtomicU64,
    compare_and_deletes: AtomicU64,
}

impl<B> CountingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            gets: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            set_if_absents: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            compare_and_deletes: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn calls(&self) -> BackendCalls {
        BackendCalls {
            gets: self.gets.load(Ordering::SeqCst),
            sets: self.sets.load(Ordering::SeqCst),
            set_if_absents: self.set_if_absents.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
            compare_and_deletes: self.compare_and_deletes.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl<B: CacheBackend> CacheBackend for CountingBackend<B> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        self.set_if_absents.fetch_add(1, Ordering::SeqCst);
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        expected: &[u8],
    ) -> Result<bool, BackendError> {
        self.compare_and_deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.compare_and_delete(key, expected).await
    }
}

/// Backend decorator that can be switched into an outage.
///
/// Reads and writes fail independently so tests can model a backend that
/// serves reads but rejects writes.
#[derive(Debug, Default)]
pub struct FailingBackend<B> {
    inner: B,
    reads_down: AtomicBool,
    writes_down: AtomicBool,
}

impl<B> FailingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            reads_down: AtomicBool::new(false),
            writes_down: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Take the whole backend down or bring it back.
    pub fn set_available(&self, available: bool) {
        self.reads_down.store(!available, Ordering::SeqCst);
        self.writes_down.store(!available, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.reads_down.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.writes_down.store(fail, Ordering::SeqCst);
    }

    fn check(&self, flag: &AtomicBool, operation: &'static str, key: &str) -> Result<(), BackendError> {
        if flag.load(Ordering::SeqCst) {
            Err(BackendError::unavailable(operation, key, "simulated outage"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<B: CacheBackend> CacheBackend for FailingBackend<B> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.check(&self.reads_down, "GET", key)?;
        self.inner.get(key).await
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        self.check(&self.writes_down, "SET", key)?;
        self.inner.set(key, value, ttl).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        self.check(&self.writes_down, "SET NX", key)?;
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        self.check(&self.writes_down, "DEL", key)?;
        self.inner.delete(key).await
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        expected: &[u8],
    ) -> Result<bool, BackendError> {
        self.check(&self.writes_down, "CAD", key)?;
        self.inner.compare_and_delete(key, expected).await
    }
}

// ============================================================================
// SCRIPTED LOADER
// ============================================================================

/// Loader answering from a fixed table, standing in for the store.
///
/// Ids present in the table load their value, ids marked failing return a
/// [`LoaderError`], every other id is reported as not found. Every call is
/// counted, per id and in total.
#[derive(Debug)]
pub struct ScriptedLoader<V> {
    values: Mutex<HashMap<u64, V>>,
    failing: Mutex<HashSet<u64>>,
    delay: Duration,
    calls: Mutex<HashMap<u64, u64>>,
    total: AtomicU64,
}

impl<V: Clone> ScriptedLoader<V> {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            delay: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
            total: AtomicU64::new(0),
        }
    }

    /// Add a value to the table.
    pub fn with_value(self, id: u64, value: V) -> Self {
        self.put(id, value);
        self
    }

    /// Make `id` fail on every call.
    pub fn with_failure(self, id: u64) -> Self {
        self.fail(id);
        self
    }

    /// Sleep for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Insert or replace the stored value for `id`.
    pub fn put(&self, id: u64, value: V) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(id, value);
        }
    }

    /// Remove `id` so it loads as not found.
    pub fn remove(&self, id: u64) {
        if let Ok(mut values) = self.values.lock() {
            values.remove(&id);
        }
    }

    pub fn fail(&self, id: u64) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(id);
        }
    }

    pub fn recover(&self, id: u64) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.remove(&id);
        }
    }

    pub fn total_calls(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, id: u64) -> u64 {
        self.calls
            .lock()
            .map(|calls| calls.get(&id).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl<V: Clone> Default for ScriptedLoader<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> Loader<u64, V> for ScriptedLoader<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn load(&self, id: &u64) -> Result<Option<V>, LoaderError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(*id).or_insert(0) += 1;
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failing = self
            .failing
            .lock()
            .map(|failing| failing.contains(id))
            .unwrap_or(false);
        if failing {
            return Err(LoaderError::new(format!("scripted failure for id {}", id)));
        }

        Ok(self
            .values
            .lock()
            .ok()
            .and_then(|values| values.get(id).cloned()))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for guardcache configuration and keys.

    use super::*;
    use proptest::prelude::*;

    /// Generate an entity id.
    pub fn arb_entity_id() -> impl Strategy<Value = u64> {
        1u64..1_000_000
    }

    /// Generate a data key prefix such as `cache:shop:`.
    pub fn arb_data_prefix() -> impl Strategy<Value = String> {
        "[a-z]{1,8}(:[a-z]{1,8}){0,2}:"
            .prop_filter("must not overlap the lock namespace", |p| !p.starts_with("lock"))
    }

    /// Generate a per-call data TTL.
    pub fn arb_ttl() -> impl Strategy<Value = Duration> {
        (1u64..86_400).prop_map(Duration::from_secs)
    }

    /// Generate a lock mode.
    pub fn arb_lock_mode() -> impl Strategy<Value = LockMode> {
        prop_oneof![Just(LockMode::Cooperative), Just(LockMode::Fenced)]
    }

    /// Generate a lock retry policy that passes validation.
    pub fn arb_lock_retry_policy() -> impl Strategy<Value = LockRetryPolicy> {
        (1u32..200, 1u64..500, 0u64..5_000, 1.0f64..4.0).prop_map(
            |(max_attempts, initial_ms, extra_ms, multiplier)| LockRetryPolicy {
                max_attempts,
                initial_backoff: Duration::from_millis(initial_ms),
                max_backoff: Duration::from_millis(initial_ms + extra_ms),
                backoff_multiplier: multiplier,
            },
        )
    }

    /// Generate a valid CacheConfig.
    pub fn arb_valid_config() -> impl Strategy<Value = CacheConfig> {
        (
            1u64..3_600,
            2u64..60,
            arb_lock_retry_policy(),
            1usize..32,
            1usize..4_096,
            arb_lock_mode(),
            "[a-z]{1,8}:",
        )
            .prop_flat_map(
                |(null_secs, lock_secs, lock_retry, workers, capacity, lock_mode, namespace)| {
                    (1u64..=lock_secs * 1_000).prop_map(move |loader_ms| CacheConfig {
                        null_ttl: Duration::from_secs(null_secs),
                        lock_ttl: Duration::from_secs(lock_secs),
                        lock_retry: lock_retry.clone(),
                        rebuild_workers: workers,
                        rebuild_queue_capacity: capacity,
                        loader_timeout: Duration::from_millis(loader_ms),
                        lock_mode,
                        lock_namespace: namespace.clone(),
                    })
                },
            )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common cache states.

    use super::*;
    use chrono::{TimeDelta, Utc};
    use serde::Serialize;

    /// Config with short lock polling and small pools, for fast tests.
    pub fn fast_config() -> CacheConfig {
        CacheConfig::default()
            .with_null_ttl(Duration::from_secs(5))
            .with_lock_ttl(Duration::from_secs(2))
            .with_lock_retry(LockRetryPolicy::fixed(Duration::from_millis(10), 50))
            .with_loader_timeout(Duration::from_secs(1))
            .with_rebuild_workers(2)
            .with_rebuild_queue_capacity(16)
    }

    /// Key space `test:` / `lock:test:`.
    pub fn test_keyspace() -> KeySpace {
        KeySpace::namespaced("test:", "lock:").expect("static prefixes are valid")
    }

    /// Serialized envelope that expired `age` ago.
    pub fn expired_envelope<T: Serialize>(data: Option<T>, age: Duration) -> Vec<u8> {
        let age = TimeDelta::from_std(age).unwrap_or(TimeDelta::seconds(1));
        let envelope = Envelope::new(data, Utc::now() - age);
        guardcache_core::encode(&envelope).expect("fixture envelope serializes")
    }

    /// Serialized envelope fresh for another `ttl`.
    pub fn fresh_envelope<T: Serialize>(data: Option<T>, ttl: Duration) -> Vec<u8> {
        let envelope = Envelope::expiring_in(data, ttl);
        guardcache_core::encode(&envelope).expect("fixture envelope serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_counting_backend_counts() {
        let backend = CountingBackend::new(InMemoryBackend::new());
        backend.set("k", b"v", None).await.unwrap();
        backend.get("k").await.unwrap();
        backend.get("missing").await.unwrap();
        backend.delete("k").await.unwrap();

        let calls = backend.calls();
        assert_eq!(calls.gets, 2);
        assert_eq!(calls.sets, 1);
        assert_eq!(calls.deletes, 1);
    }

    #[tokio::test]
    async fn test_failing_backend_toggles() {
        let backend = FailingBackend::new(InMemoryBackend::new());
        backend.set_available(false);
        assert!(backend.get("k").await.is_err());
        assert!(backend.set("k", b"v", None).await.is_err());

        backend.set_available(true);
        backend.fail_writes(true);
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(backend.set_if_absent("k", b"v", Duration::from_secs(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_loader() {
        let loader = ScriptedLoader::new()
            .with_value(1, "one".to_string())
            .with_failure(2);

        assert_eq!(loader.load(&1).await.unwrap(), Some("one".to_string()));
        assert!(loader.load(&2).await.is_err());
        assert_eq!(loader.load(&3).await.unwrap(), None);
        assert_eq!(loader.total_calls(), 3);
        assert_eq!(loader.calls_for(1), 1);

        loader.recover(2);
        loader.put(2, "two".to_string());
        assert_eq!(loader.load(&2).await.unwrap(), Some("two".to_string()));
        assert_eq!(loader.calls_for(2), 2);
    }

    #[test]
    fn test_fast_config_is_valid() {
        assert!(fixtures::fast_config().validate().is_ok());
    }

    proptest! {
        #[test]
        fn prop_generated_configs_validate(config in generators::arb_valid_config()) {
            prop_assert!(config.validate().is_ok());
        }

        #[test]
        fn prop_generated_prefixes_form_keyspaces(prefix in generators::arb_data_prefix()) {
            prop_assert!(KeySpace::namespaced(prefix, "lock:").is_ok());
        }
    }
}
