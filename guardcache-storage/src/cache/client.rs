//! Cache-Aside Client
//!
//! `CacheClient` composes a backend, the distributed lock and the rebuild
//! pool into the three read strategies:
//!
//! - [`CacheClient::query_with_pass_through`] caches confirmed misses as
//!   tombstones so nonexistent ids stop reaching the store.
//! - [`CacheClient::query_with_mutex`] lets one caller per id rebuild a cold
//!   key while the others poll.
//! - [`CacheClient::query_with_logical_expire`] serves expired envelopes and
//!   refreshes them in the background.
//!
//! Backend failures on the read path fail open to the loader. Backend write
//! failures on the read path are logged and ignored. Loader failures reach
//! the caller unchanged and are never cached.

use std::fmt;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use guardcache_core::{
    decode, encode, CacheConfig, CacheEntry, CacheError, CacheKey, CacheResult, Cacheable,
    Envelope, KeySpace, LockError, TOMBSTONE,
};
use serde::Serialize;
use tokio::time::Instant;

use super::lock::{DistributedLock, HeldLock};
use super::rebuild::{RebuildJob, RebuildMetricsSnapshot, RebuildPool};
use super::stats::{CacheStats, StatsRecorder};
use super::traits::{CacheBackend, Loader};

/// Outcome of reading one data key.
enum Lookup<T> {
    Hit(T),
    Tombstone,
    Miss,
    Unavailable,
}

/// Cache-aside client shared by every read path of a process.
pub struct CacheClient<B: ?Sized> {
    backend: Arc<B>,
    config: CacheConfig,
    lock: DistributedLock<B>,
    pool: Arc<RebuildPool>,
    stats: Arc<StatsRecorder>,
}

impl<B: ?Sized> Clone for CacheClient<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
            lock: self.lock.clone(),
            pool: Arc::clone(&self.pool),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<B: ?Sized> fmt::Debug for CacheClient<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheClient")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl<B> CacheClient<B>
where
    B: CacheBackend + ?Sized + 'static,
{
    /// Validate `config` and start a rebuild pool sized from it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(backend: Arc<B>, config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        let pool = Arc::new(RebuildPool::start(
            config.rebuild_workers,
            config.rebuild_queue_capacity,
        ));
        Ok(Self::assemble(backend, config, pool))
    }

    /// Build a client around an existing rebuild pool.
    pub fn with_pool(
        backend: Arc<B>,
        config: CacheConfig,
        pool: Arc<RebuildPool>,
    ) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self::assemble(backend, config, pool))
    }

    fn assemble(backend: Arc<B>, config: CacheConfig, pool: Arc<RebuildPool>) -> Self {
        let lock = DistributedLock::new(Arc::clone(&backend), config.lock_ttl, config.lock_mode);
        Self {
            backend,
            config,
            lock,
            pool,
            stats: Arc::new(StatsRecorder::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Key space for `data_prefix`, with its lock prefix derived from the
    /// configured lock namespace.
    pub fn keyspace(&self, data_prefix: &str) -> CacheResult<KeySpace> {
        Ok(KeySpace::namespaced(
            data_prefix,
            &self.config.lock_namespace,
        )?)
    }

    // ========================================================================
    // DIRECT READS & WRITES
    // ========================================================================

    /// Read the value under `key` without loading on a miss.
    ///
    /// Absent keys, tombstones and corrupt entries read as `None`, as does an
    /// unavailable backend.
    pub async fn get<V: Cacheable>(&self, key: &CacheKey) -> CacheResult<Option<V>> {
        match self.lookup::<V>(key).await {
            Lookup::Hit(value) => Ok(Some(value)),
            Lookup::Tombstone | Lookup::Miss | Lookup::Unavailable => Ok(None),
        }
    }

    /// Write `value` under `key`. A `None` TTL keeps the key until it is
    /// deleted.
    pub async fn set<V>(&self, key: &CacheKey, value: &V, ttl: Option<Duration>) -> CacheResult<()>
    where
        V: Serialize + Sync + ?Sized,
    {
        let bytes = encode(value)?;
        self.backend.set(key.as_str(), &bytes, ttl).await?;
        Ok(())
    }

    /// Write `value` wrapped in an envelope fresh for `ttl`, with no backend
    /// TTL.
    pub async fn set_with_logical_expire<V>(
        &self,
        key: &CacheKey,
        value: &V,
        ttl: Duration,
    ) -> CacheResult<()>
    where
        V: Serialize + Sync,
    {
        let bytes = encode(&Envelope::expiring_in(value, ttl))?;
        self.backend.set(key.as_str(), &bytes, None).await?;
        Ok(())
    }

    /// Delete the cached entry for `id`. Returns true if a key was removed.
    pub async fn invalidate<Id>(&self, keyspace: &KeySpace, id: &Id) -> CacheResult<bool>
    where
        Id: fmt::Display + Sync + ?Sized,
    {
        self.remove(&keyspace.data_key(id)).await
    }

    /// Delete `key`. Returns true if it existed.
    pub async fn remove(&self, key: &CacheKey) -> CacheResult<bool> {
        let removed = self.backend.delete(key.as_str()).await?;
        tracing::debug!(key = %key, removed, "Cache entry invalidated");
        Ok(removed)
    }

    /// Load `id` and store it as an envelope, seeding the logical-expiration
    /// strategy. A confirmed miss is stored as an envelope with no data.
    pub async fn warm<Id, V, L>(
        &self,
        keyspace: &KeySpace,
        id: &Id,
        loader: &L,
        ttl: Duration,
    ) -> CacheResult<Option<V>>
    where
        Id: fmt::Display + Send + Sync,
        V: Cacheable,
        L: Loader<Id, V> + ?Sized,
    {
        let key = keyspace.data_key(id);
        let loaded = self.call_loader(loader, id).await?;
        let bytes = encode(&Envelope::expiring_in(&loaded, ttl))?;
        self.backend.set(key.as_str(), &bytes, None).await?;
        tracing::info!(key = %key, found = loaded.is_some(), "Cache entry warmed");
        Ok(loaded)
    }

    // ========================================================================
    // STRATEGY A: PASS-THROUGH
    // ========================================================================

    /// Read `id`, loading and caching it on a miss. Confirmed misses are
    /// cached as tombstones for `null_ttl`.
    pub async fn query_with_pass_through<Id, V, L>(
        &self,
        keyspace: &KeySpace,
        id: &Id,
        loader: &L,
        ttl: Duration,
    ) -> CacheResult<Option<V>>
    where
        Id: fmt::Display + Send + Sync,
        V: Cacheable,
        L: Loader<Id, V> + ?Sized,
    {
        let key = keyspace.data_key(id);
        match self.lookup::<V>(&key).await {
            Lookup::Hit(value) => return Ok(Some(value)),
            Lookup::Tombstone => return Ok(None),
            Lookup::Miss | Lookup::Unavailable => {}
        }

        let loaded = self.call_loader(loader, id).await?;
        self.write_loaded(&key, loaded.as_ref(), ttl).await;
        Ok(loaded)
    }

    // ========================================================================
    // STRATEGY B: MUTEX
    // ========================================================================

    /// Read `id`; on a miss only the caller holding the rebuild lock calls
    /// the loader, everyone else polls the cache.
    ///
    /// Fails with [`LockError::AcquisitionExhausted`] once the retry policy
    /// runs out.
    pub async fn query_with_mutex<Id, V, L>(
        &self,
        keyspace: &KeySpace,
        id: &Id,
        loader: &L,
        ttl: Duration,
    ) -> CacheResult<Option<V>>
    where
        Id: fmt::Display + Send + Sync,
        V: Cacheable,
        L: Loader<Id, V> + ?Sized,
    {
        let key = keyspace.data_key(id);
        let lock_key = keyspace.lock_key(id);
        let policy = &self.config.lock_retry;
        let started = Instant::now();

        for attempt in 0..policy.max_attempts {
            match self.lookup::<V>(&key).await {
                Lookup::Hit(value) => return Ok(Some(value)),
                Lookup::Tombstone => return Ok(None),
                Lookup::Unavailable => return self.load_unguarded(&key, id, loader, ttl).await,
                Lookup::Miss => {}
            }

            match self.lock.try_acquire(&lock_key).await {
                Ok(Some(guard)) => {
                    let held = HeldLock::new(self.lock.clone(), guard);
                    return self.rebuild_under_lock(held, &key, id, loader, ttl).await;
                }
                Ok(None) => {
                    self.stats.lock_contended();
                    if attempt + 1 < policy.max_attempts {
                        let backoff = policy.backoff_for(attempt);
                        tracing::trace!(key = %lock_key, attempt, ?backoff, "Lock busy, polling");
                        tokio::time::sleep(backoff).await;
                    }
                }
                Err(e) => {
                    self.stats.backend_error();
                    tracing::warn!(key = %lock_key, error = %e, "Lock unavailable, loading without it");
                    return self.load_unguarded(&key, id, loader, ttl).await;
                }
            }
        }

        Err(LockError::AcquisitionExhausted {
            key: lock_key.to_string(),
            attempts: policy.max_attempts,
            waited: started.elapsed(),
        }
        .into())
    }

    async fn rebuild_under_lock<Id, V, L>(
        &self,
        held: HeldLock<B>,
        key: &CacheKey,
        id: &Id,
        loader: &L,
        ttl: Duration,
    ) -> CacheResult<Option<V>>
    where
        Id: fmt::Display + Send + Sync,
        V: Cacheable,
        L: Loader<Id, V> + ?Sized,
    {
        // Another holder may have filled the key between our miss and our lock.
        match self.lookup::<V>(key).await {
            Lookup::Hit(value) => {
                held.release().await;
                return Ok(Some(value));
            }
            Lookup::Tombstone => {
                held.release().await;
                return Ok(None);
            }
            Lookup::Miss | Lookup::Unavailable => {}
        }

        let outcome = AssertUnwindSafe(self.load_with_timeout(key, id, loader))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(loaded)) => {
                self.write_loaded(key, loaded.as_ref(), ttl).await;
                held.release().await;
                Ok(loaded)
            }
            Ok(Err(e)) => {
                held.release().await;
                Err(e)
            }
            Err(panic) => {
                held.release().await;
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn load_unguarded<Id, V, L>(
        &self,
        key: &CacheKey,
        id: &Id,
        loader: &L,
        ttl: Duration,
    ) -> CacheResult<Option<V>>
    where
        Id: fmt::Display + Send + Sync,
        V: Cacheable,
        L: Loader<Id, V> + ?Sized,
    {
        let loaded = self.call_loader(loader, id).await?;
        self.write_loaded(key, loaded.as_ref(), ttl).await;
        Ok(loaded)
    }

    // ========================================================================
    // STRATEGY C: LOGICAL EXPIRATION
    // ========================================================================

    /// Read `id` from a pre-warmed envelope.
    ///
    /// Never waits for a refresh: an expired envelope is returned as is
    /// while one background task reloads it. A key that was never warmed
    /// reads as absent; see [`CacheClient::warm`].
    pub async fn query_with_logical_expire<Id, V, L>(
        &self,
        keyspace: &KeySpace,
        id: &Id,
        loader: Arc<L>,
        ttl: Duration,
    ) -> CacheResult<Option<V>>
    where
        Id: fmt::Display + Clone + Send + Sync + 'static,
        V: Cacheable,
        L: Loader<Id, V> + 'static,
    {
        let key = keyspace.data_key(id);
        let envelope = match self.lookup::<Envelope<Option<V>>>(&key).await {
            Lookup::Hit(envelope) => envelope,
            Lookup::Miss | Lookup::Tombstone => {
                tracing::debug!(key = %key, "Logical key not warmed");
                return Ok(None);
            }
            Lookup::Unavailable => {
                let loaded = self.call_loader(loader.as_ref(), id).await?;
                self.write_envelope(&key, &loaded, ttl).await;
                return Ok(loaded);
            }
        };

        if envelope.is_fresh() {
            return Ok(envelope.into_data());
        }

        self.stats.stale_serve();
        let lock_key = keyspace.lock_key(id);
        let held = match self.lock.try_acquire(&lock_key).await {
            Ok(Some(guard)) => HeldLock::new(self.lock.clone(), guard),
            Ok(None) => {
                self.stats.lock_contended();
                tracing::debug!(key = %key, "Refresh already in flight, serving stale");
                return Ok(envelope.into_data());
            }
            Err(e) => {
                self.stats.backend_error();
                tracing::warn!(key = %lock_key, error = %e, "Lock unavailable, serving stale");
                return Ok(envelope.into_data());
            }
        };

        // A refresh may have landed between our read and our lock.
        if let Lookup::Hit(current) = self.lookup::<Envelope<Option<V>>>(&key).await {
            if current.is_fresh() {
                held.release().await;
                return Ok(current.into_data());
            }
        }

        let task = RebuildTask {
            backend: Arc::clone(&self.backend),
            held,
            key: key.clone(),
            id: id.clone(),
            loader,
            ttl,
            loader_timeout: self.config.loader_timeout,
            stats: Arc::clone(&self.stats),
            _value: PhantomData::<fn() -> V>,
        };

        match self.pool.submit(Box::new(task)) {
            Ok(()) => tracing::debug!(key = %key, "Logical refresh scheduled"),
            Err(rejected) => rejected.job.abandon().await,
        }

        Ok(envelope.into_data())
    }

    // ========================================================================
    // LIFECYCLE & STATS
    // ========================================================================

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    pub fn rebuild_metrics(&self) -> RebuildMetricsSnapshot {
        self.pool.metrics()
    }

    /// Wait until every scheduled refresh has finished.
    pub async fn wait_for_rebuilds(&self) {
        self.pool.wait_idle().await;
    }

    /// Drain pending refreshes and stop the rebuild workers.
    pub async fn shutdown(&self) -> RebuildMetricsSnapshot {
        self.pool.shutdown().await
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    async fn lookup<T: Cacheable>(&self, key: &CacheKey) -> Lookup<T> {
        let raw = match self.backend.get(key.as_str()).await {
            Ok(raw) => raw,
            Err(e) => {
                self.stats.backend_error();
                tracing::warn!(key = %key, error = %e, "Cache read failed, falling back to loader");
                return Lookup::Unavailable;
            }
        };

        match CacheEntry::from_raw(raw) {
            CacheEntry::Absent => {
                self.stats.miss();
                tracing::debug!(key = %key, "Cache miss");
                Lookup::Miss
            }
            CacheEntry::Tombstone => {
                self.stats.tombstone_hit();
                tracing::debug!(key = %key, "Cache tombstone hit");
                Lookup::Tombstone
            }
            CacheEntry::Populated(bytes) => match decode::<T>(&bytes) {
                Ok(value) => {
                    self.stats.hit();
                    tracing::debug!(key = %key, "Cache hit");
                    Lookup::Hit(value)
                }
                Err(e) => {
                    self.stats.miss();
                    tracing::warn!(key = %key, error = %e, "Corrupt cache entry, treating as miss");
                    Lookup::Miss
                }
            },
        }
    }

    async fn call_loader<Id, V, L>(&self, loader: &L, id: &Id) -> CacheResult<Option<V>>
    where
        Id: Send + Sync,
        L: Loader<Id, V> + ?Sized,
    {
        self.stats.loader_call();
        Ok(loader.load(id).await?)
    }

    async fn load_with_timeout<Id, V, L>(
        &self,
        key: &CacheKey,
        id: &Id,
        loader: &L,
    ) -> CacheResult<Option<V>>
    where
        Id: Send + Sync,
        L: Loader<Id, V> + ?Sized,
    {
        let timeout = self.config.loader_timeout;
        tokio::time::timeout(timeout, self.call_loader(loader, id))
            .await
            .map_err(|_| CacheError::LoaderTimeout {
                key: key.to_string(),
                timeout,
            })?
    }

    /// Best-effort write of a loader result: the value with `ttl`, or a
    /// tombstone with the null TTL.
    async fn write_loaded<V: Cacheable>(&self, key: &CacheKey, loaded: Option<&V>, ttl: Duration) {
        let (bytes, ttl) = match loaded {
            Some(value) => match encode(value) {
                Ok(bytes) => (bytes, ttl),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Value not cacheable, skipping write");
                    return;
                }
            },
            None => (TOMBSTONE.to_vec(), self.config.null_ttl),
        };

        if let Err(e) = self.backend.set(key.as_str(), &bytes, Some(ttl)).await {
            self.stats.backend_error();
            tracing::warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    async fn write_envelope<V: Cacheable>(&self, key: &CacheKey, loaded: &Option<V>, ttl: Duration) {
        let bytes = match encode(&Envelope::expiring_in(loaded, ttl)) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Envelope not cacheable, skipping write");
                return;
            }
        };
        if let Err(e) = self.backend.set(key.as_str(), &bytes, None).await {
            self.stats.backend_error();
            tracing::warn!(key = %key, error = %e, "Cache write failed");
        }
    }
}

// ============================================================================
// REBUILD TASK
// ============================================================================

/// Background refresh of one logical-expiry key. Owns the rebuild lock and
/// releases it on every exit path.
struct RebuildTask<B, Id, V, L>
where
    B: CacheBackend + ?Sized + 'static,
{
    backend: Arc<B>,
    held: HeldLock<B>,
    key: CacheKey,
    id: Id,
    loader: Arc<L>,
    ttl: Duration,
    loader_timeout: Duration,
    stats: Arc<StatsRecorder>,
    _value: PhantomData<fn() -> V>,
}

impl<B, Id, V, L> RebuildTask<B, Id, V, L>
where
    B: CacheBackend + ?Sized + 'static,
    Id: Send + Sync + 'static,
    V: Cacheable,
    L: Loader<Id, V> + 'static,
{
    async fn refresh(&self) -> CacheResult<()> {
        self.stats.loader_call();
        let loaded = tokio::time::timeout(self.loader_timeout, self.loader.load(&self.id))
            .await
            .map_err(|_| CacheError::LoaderTimeout {
                key: self.key.to_string(),
                timeout: self.loader_timeout,
            })??;

        let bytes = encode(&Envelope::expiring_in(&loaded, self.ttl))?;
        self.backend.set(self.key.as_str(), &bytes, None).await?;
        tracing::debug!(key = %self.key, found = loaded.is_some(), "Logical key refreshed");
        Ok(())
    }
}

impl<B, Id, V, L> RebuildJob for RebuildTask<B, Id, V, L>
where
    B: CacheBackend + ?Sized + 'static,
    Id: Send + Sync + 'static,
    V: Cacheable,
    L: Loader<Id, V> + 'static,
{
    fn describe(&self) -> String {
        self.key.to_string()
    }

    fn run(self: Box<Self>) -> BoxFuture<'static, CacheResult<()>> {
        async move {
            let outcome = AssertUnwindSafe(self.refresh()).catch_unwind().await;
            let RebuildTask { held, .. } = *self;
            held.release().await;
            match outcome {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        .boxed()
    }

    fn abandon(self: Box<Self>) -> BoxFuture<'static, ()> {
        async move {
            let RebuildTask { held, key, .. } = *self;
            tracing::debug!(key = %key, "Refresh abandoned, releasing lock");
            held.release().await;
        }
        .boxed()
    }
}
