//! Shop Service
//!
//! Shop reads through any of the three cache-aside strategies, updates that
//! invalidate the cached copy, and warm-up for logical expiration.

use std::sync::Arc;
use std::time::Duration;

use guardcache_core::{CacheError, KeySpace};
use guardcache_storage::{CacheBackend, CacheClient};

use crate::config::{ReadStrategy, ShopCacheConfig};
use crate::constants::CACHE_SHOP_KEY;
use crate::error::{ShopError, ShopResult};
use crate::model::Shop;
use crate::store::{ShopStore, StoreLoader};

/// Outcome of warming a batch of shops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmupReport {
    /// Shops written as fresh envelopes.
    pub warmed: u64,
    /// Ids the store did not know; written as empty envelopes.
    pub missing: u64,
    /// Ids whose load or write failed.
    pub failed: u64,
}

/// Cached access to shops.
#[derive(Clone)]
pub struct ShopService {
    cache: CacheClient<dyn CacheBackend>,
    store: Arc<dyn ShopStore>,
    loader: Arc<StoreLoader>,
    keyspace: KeySpace,
    config: ShopCacheConfig,
}

impl ShopService {
    /// Build a service keyed under `cache:shop:`.
    pub fn new(
        cache: CacheClient<dyn CacheBackend>,
        store: Arc<dyn ShopStore>,
        config: ShopCacheConfig,
    ) -> ShopResult<Self> {
        config.validate().map_err(CacheError::from)?;
        let keyspace = cache.keyspace(CACHE_SHOP_KEY)?;
        let loader = Arc::new(StoreLoader::new(Arc::clone(&store)));
        Ok(Self {
            cache,
            store,
            loader,
            keyspace,
            config,
        })
    }

    pub fn cache(&self) -> &CacheClient<dyn CacheBackend> {
        &self.cache
    }

    pub fn keyspace(&self) -> &KeySpace {
        &self.keyspace
    }

    pub fn config(&self) -> &ShopCacheConfig {
        &self.config
    }

    /// Read a shop with the configured default strategy.
    pub async fn query(&self, id: u64) -> ShopResult<Shop> {
        self.query_by_id(id, self.config.read_strategy).await
    }

    /// Read a shop with an explicit strategy.
    ///
    /// # Errors
    /// [`ShopError::ShopNotFound`] when the shop does not exist, or (for
    /// logical expiration) has not been warmed.
    pub async fn query_by_id(&self, id: u64, strategy: ReadStrategy) -> ShopResult<Shop> {
        let found = match strategy {
            ReadStrategy::PassThrough => {
                self.cache
                    .query_with_pass_through(
                        &self.keyspace,
                        &id,
                        self.loader.as_ref(),
                        self.config.shop_ttl,
                    )
                    .await?
            }
            ReadStrategy::Mutex => {
                self.cache
                    .query_with_mutex(
                        &self.keyspace,
                        &id,
                        self.loader.as_ref(),
                        self.config.shop_ttl,
                    )
                    .await?
            }
            ReadStrategy::LogicalExpire => {
                self.cache
                    .query_with_logical_expire(
                        &self.keyspace,
                        &id,
                        Arc::clone(&self.loader),
                        self.config.logical_ttl,
                    )
                    .await?
            }
        };

        found.ok_or(ShopError::ShopNotFound { id })
    }

    /// Write `shop` to the store, then drop its cached copy.
    ///
    /// # Errors
    /// [`ShopError::Validation`] when `shop.id` is missing. A failed
    /// invalidation is reported after the store write has already happened;
    /// the stale entry then lives until its TTL.
    pub async fn update(&self, shop: &Shop) -> ShopResult<()> {
        let id = shop.id.ok_or_else(|| ShopError::Validation {
            field: "id",
            reason: "shop id must not be empty".to_string(),
        })?;

        self.store.update_shop(id, shop).await?;

        if let Err(e) = self.cache.invalidate(&self.keyspace, &id).await {
            tracing::warn!(shop_id = id, error = %e, "Shop updated but cache invalidation failed");
            return Err(e.into());
        }

        tracing::info!(shop_id = id, "Shop updated");
        Ok(())
    }

    /// Load one shop and store it as a logical-expiration envelope fresh
    /// for `ttl`. Returns whether the shop exists.
    pub async fn warm(&self, id: u64, ttl: Duration) -> ShopResult<bool> {
        let loaded = self
            .cache
            .warm(&self.keyspace, &id, self.loader.as_ref(), ttl)
            .await?;
        Ok(loaded.is_some())
    }

    /// Warm every id in `ids` with the configured logical TTL.
    ///
    /// Individual failures are logged and counted; they do not stop the batch.
    pub async fn warm_all(&self, ids: impl IntoIterator<Item = u64>) -> WarmupReport {
        let mut report = WarmupReport::default();
        for id in ids {
            match self.warm(id, self.config.logical_ttl).await {
                Ok(true) => report.warmed += 1,
                Ok(false) => report.missing += 1,
                Err(e) => {
                    tracing::error!(shop_id = id, error = %e, "Failed to warm shop");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            warmed = report.warmed,
            missing = report.missing,
            failed = report.failed,
            "Shop warm-up finished"
        );
        report
    }
}

impl std::fmt::Debug for ShopService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopService")
            .field("keyspace", &self.keyspace)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================
