//! Per-key rebuild locks on the cache backend.
//!
//! A lock is a backend key created with set-if-absent and a TTL. Only the
//! caller whose set-if-absent succeeded holds it. The TTL bounds how long a
//! crashed holder can block everyone else.
//!
//! Two release disciplines exist, selected by [`LockMode`]:
//!
//! - `Cooperative`: the lock holds a constant marker and release deletes the
//!   key unconditionally. A holder that outlives its TTL may delete a lock a
//!   later caller acquired.
//! - `Fenced`: every acquisition writes a fresh token and release only
//!   deletes the key if it still holds that token.

use std::sync::Arc;
use std::time::Duration;

use guardcache_core::constants::COOPERATIVE_LOCK_MARKER;
use guardcache_core::{BackendError, LockKey, LockMode};
use uuid::Uuid;

use super::traits::CacheBackend;

/// Proof of a successful acquisition. Consumed by [`DistributedLock::release`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a held lock must be released"]
pub struct LockGuard {
    key: LockKey,
    token: Vec<u8>,
}

impl LockGuard {
    pub fn key(&self) -> &LockKey {
        &self.key
    }

    /// Value written to the lock key by this acquisition.
    pub fn token(&self) -> &[u8] {
        &self.token
    }
}

/// Lock primitive over any [`CacheBackend`].
pub struct DistributedLock<B: ?Sized> {
    backend: Arc<B>,
    ttl: Duration,
    mode: LockMode,
}

impl<B: ?Sized> Clone for DistributedLock<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            ttl: self.ttl,
            mode: self.mode,
        }
    }
}

impl<B> DistributedLock<B>
where
    B: CacheBackend + ?Sized,
{
    pub fn new(backend: Arc<B>, ttl: Duration, mode: LockMode) -> Self {
        Self { backend, ttl, mode }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Attempt to take the lock once. `Ok(None)` means another holder has it.
    pub async fn try_acquire(&self, key: &LockKey) -> Result<Option<LockGuard>, BackendError> {
        let token = match self.mode {
            LockMode::Cooperative => COOPERATIVE_LOCK_MARKER.as_bytes().to_vec(),
            LockMode::Fenced => Uuid::new_v4().to_string().into_bytes(),
        };

        let acquired = self
            .backend
            .set_if_absent(key.as_str(), &token, self.ttl)
            .await?;

        if acquired {
            tracing::debug!(key = %key, mode = %self.mode, "Lock acquired");
            Ok(Some(LockGuard {
                key: key.clone(),
                token,
            }))
        } else {
            tracing::trace!(key = %key, "Lock held elsewhere");
            Ok(None)
        }
    }

    /// Release a held lock.
    ///
    /// Returns true if this call removed the lock key. Failures are logged
    /// and swallowed: the TTL reclaims the lock regardless.
    pub async fn release(&self, guard: LockGuard) -> bool {
        let result = match self.mode {
            LockMode::Cooperative => self.backend.delete(guard.key.as_str()).await,
            LockMode::Fenced => {
                self.backend
                    .compare_and_delete(guard.key.as_str(), &guard.token)
                    .await
            }
        };

        match result {
            Ok(true) => {
                tracing::debug!(key = %guard.key, "Lock released");
                true
            }
            Ok(false) => {
                tracing::warn!(
                    key = %guard.key,
                    mode = %self.mode,
                    "Lock was no longer held at release; TTL may have elapsed"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    key = %guard.key,
                    error = %e,
                    "Failed to release lock; it will expire after its TTL"
                );
                false
            }
        }
    }
}

/// A held lock that releases itself when dropped unreleased.
///
/// A read future cancelled mid-rebuild (timeout, `select!`, disconnect)
/// drops its `HeldLock`; the release then runs on a spawned task instead of
/// waiting out the lock TTL.
pub(crate) struct HeldLock<B>
where
    B: CacheBackend + ?Sized + 'static,
{
    lock: DistributedLock<B>,
    guard: Option<LockGuard>,
}

impl<B> HeldLock<B>
where
    B: CacheBackend + ?Sized + 'static,
{
    pub(crate) fn new(lock: DistributedLock<B>, guard: LockGuard) -> Self {
        Self {
            lock,
            guard: Some(guard),
        }
    }

    pub(crate) async fn release(mut self) -> bool {
        match self.guard.take() {
            Some(guard) => self.lock.release(guard).await,
            None => false,
        }
    }
}

impl<B> Drop for HeldLock<B>
where
    B: CacheBackend + ?Sized + 'static,
{
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(key = %guard.key, "Lock holder dropped, releasing in background");
                let lock = self.lock.clone();
                handle.spawn(async move {
                    lock.release(guard).await;
                });
            }
            Err(_) => {
                tracing::warn!(
                    key = %guard.key,
                    "Lock holder dropped outside a runtime; lock expires after its TTL"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryBackend;
    use guardcache_core::KeySpace;

    fn lock_key(id: u64) -> LockKey {
        KeySpace::new("cache:shop:", "lock:shop:")
            .unwrap()
            .lock_key(&id)
    }

    #[tokio::test]
    async fn test_only_one_holder() {
        let backend = Arc::new(InMemoryBackend::new());
        let lock = DistributedLock::new(backend.clone(), Duration::from_secs(10), LockMode::Cooperative);
        let key = lock_key(1);

        let guard = lock.try_acquire(&key).await.unwrap().expect("first acquire wins");
        assert_eq!(guard.token(), b"1");
        assert!(lock.try_acquire(&key).await.unwrap().is_none());

        assert!(lock.release(guard).await);
        assert!(lock.try_acquire(&key).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_reclaims_abandoned_lock() {
        let backend = Arc::new(InMemoryBackend::new());
        let lock = DistributedLock::new(backend.clone(), Duration::from_secs(10), LockMode::Cooperative);
        let key = lock_key(2);

        let _abandoned = lock.try_acquire(&key).await.unwrap().unwrap();
        assert_eq!(backend.ttl_of(key.as_str()), Some(Some(Duration::from_secs(10))));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(lock.try_acquire(&key).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooperative_release_can_remove_successor_lock() {
        let backend = Arc::new(InMemoryBackend::new());
        let lock = DistributedLock::new(backend.clone(), Duration::from_secs(1), LockMode::Cooperative);
        let key = lock_key(3);

        let stale = lock.try_acquire(&key).await.unwrap().unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        let _successor = lock.try_acquire(&key).await.unwrap().unwrap();

        assert!(lock.release(stale).await);
        assert!(!backend.contains(key.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fenced_release_keeps_successor_lock() {
        let backend = Arc::new(InMemoryBackend::new());
        let lock = DistributedLock::new(backend.clone(), Duration::from_secs(1), LockMode::Fenced);
        let key = lock_key(4);

        let stale = lock.try_acquire(&key).await.unwrap().unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        let successor = lock.try_acquire(&key).await.unwrap().unwrap();
        assert_ne!(stale.token(), successor.token());

        assert!(!lock.release(stale).await);
        assert!(backend.contains(key.as_str()));

        assert!(lock.release(successor).await);
        assert!(!backend.contains(key.as_str()));
    }

    #[tokio::test]
    async fn test_held_lock_release_disarms_drop() {
        let backend = Arc::new(InMemoryBackend::new());
        let lock = DistributedLock::new(backend.clone(), Duration::from_secs(10), LockMode::Fenced);
        let key = lock_key(5);

        let held = HeldLock::new(lock.clone(), lock.try_acquire(&key).await.unwrap().unwrap());
        assert!(held.release().await);

        let successor = lock.try_acquire(&key).await.unwrap().unwrap();
        tokio::task::yield_now().await;
        assert!(backend.contains(key.as_str()));
        assert!(lock.release(successor).await);
    }

    #[tokio::test]
    async fn test_dropped_held_lock_releases_in_background() {
        let backend = Arc::new(InMemoryBackend::new());
        let lock = DistributedLock::new(backend.clone(), Duration::from_secs(10), LockMode::Cooperative);
        let key = lock_key(6);

        let held = HeldLock::new(lock.clone(), lock.try_acquire(&key).await.unwrap().unwrap());
        drop(held);
        assert!(backend.contains(key.as_str()));

        for _ in 0..10 {
            if !backend.contains(key.as_str()) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!backend.contains(key.as_str()));
    }
}
