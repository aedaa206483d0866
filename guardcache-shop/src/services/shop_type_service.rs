//! Shop Type Service
//!
//! The full shop type list is small and rarely changes, so it is cached as a
//! single entry with no TTL and dropped explicitly when types change.

use std::sync::Arc;

use guardcache_core::CacheKey;
use guardcache_storage::{CacheBackend, CacheClient};

use crate::constants::CACHE_SHOP_TYPE_KEY;
use crate::error::{ShopError, ShopResult};
use crate::model::ShopType;
use crate::store::ShopStore;

/// Cached access to the ordered shop type list.
#[derive(Clone)]
pub struct ShopTypeService {
    cache: CacheClient<dyn CacheBackend>,
    store: Arc<dyn ShopStore>,
    key: CacheKey,
}

impl ShopTypeService {
    pub fn new(cache: CacheClient<dyn CacheBackend>, store: Arc<dyn ShopStore>) -> Self {
        Self {
            cache,
            store,
            key: CacheKey::new(CACHE_SHOP_TYPE_KEY),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// All shop types in ascending `sort` order.
    ///
    /// # Errors
    /// [`ShopError::ShopTypesNotFound`] when the store has no types. An empty
    /// list is never cached.
    pub async fn list(&self) -> ShopResult<Vec<ShopType>> {
        if let Some(types) = self.cache.get::<Vec<ShopType>>(&self.key).await? {
            if !types.is_empty() {
                return Ok(types);
            }
        }

        let mut types = self.store.list_shop_types().await?;
        if types.is_empty() {
            return Err(ShopError::ShopTypesNotFound);
        }
        types.sort_by_key(|t| t.sort);

        if let Err(e) = self.cache.set(&self.key, &types, None).await {
            tracing::warn!(key = %self.key, error = %e, "Failed to cache shop types");
        }
        Ok(types)
    }

    /// Drop the cached list so the next [`list`](Self::list) reloads it.
    pub async fn invalidate(&self) -> ShopResult<bool> {
        Ok(self.cache.remove(&self.key).await?)
    }
}

impl std::fmt::Debug for ShopTypeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopTypeService")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================
