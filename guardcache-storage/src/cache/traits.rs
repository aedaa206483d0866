//! Cache backend and loader traits.
//!
//! The backend is the remote key-value store shared by every server
//! instance; the loader is the caller's view of the authoritative store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use guardcache_core::{BackendError, LoaderError};

/// Key-value cache backend.
///
/// Every method is a single remote call. Implementations must not retry:
/// the strategies decide how a failure degrades.
///
/// # TTLs
///
/// `None` means the key never expires. Logical-expiry envelopes are written
/// that way; their freshness lives inside the value.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read a key. `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Unconditionally write a key.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>)
        -> Result<(), BackendError>;

    /// Atomically create a key if it does not exist.
    ///
    /// Returns true iff this call created the key.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, BackendError>;

    /// Delete a key. Returns true if a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, BackendError>;

    /// Atomically delete a key only if it currently holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &[u8])
        -> Result<bool, BackendError>;
}

#[async_trait]
impl<B> CacheBackend for Arc<B>
where
    B: CacheBackend + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        (**self).get(key).await
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        (**self).set(key, value, ttl).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        (**self).set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        (**self).delete(key).await
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        expected: &[u8],
    ) -> Result<bool, BackendError> {
        (**self).compare_and_delete(key, expected).await
    }
}

/// Loader for retrieving entities from the authoritative store.
///
/// `Ok(None)` means the store confirmed the entity does not exist; only that
/// answer is ever cached negatively. Errors reach the caller unchanged.
#[async_trait]
pub trait Loader<Id, V>: Send + Sync {
    async fn load(&self, id: &Id) -> Result<Option<V>, LoaderError>;
}

/// Adapter turning an async closure into a [`Loader`].
#[derive(Clone)]
pub struct FnLoader<F> {
    f: F,
}

/// Build a loader from `|id| async move { ... }`.
pub fn loader_fn<F>(f: F) -> FnLoader<F> {
    FnLoader { f }
}

#[async_trait]
impl<Id, V, F, Fut> Loader<Id, V> for FnLoader<F>
where
    Id: Clone + Send + Sync + 'static,
    V: Send + 'static,
    F: Fn(Id) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<V>, LoaderError>> + Send + 'static,
{
    async fn load(&self, id: &Id) -> Result<Option<V>, LoaderError> {
        (self.f)(id.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_loader_forwards_id() {
        let loader = loader_fn(|id: u64| async move {
            if id == 42 {
                Ok(Some(format!("Shop{}", id)))
            } else {
                Ok(None)
            }
        });

        assert_eq!(loader.load(&42).await.unwrap(), Some("Shop42".to_string()));
        assert_eq!(loader.load(&99).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fn_loader_propagates_error() {
        let loader = loader_fn(|_id: u64| async move {
            Err::<Option<String>, _>(LoaderError::new("database down"))
        });

        let err = loader.load(&1).await.unwrap_err();
        assert_eq!(err.message(), "database down");
    }
}
