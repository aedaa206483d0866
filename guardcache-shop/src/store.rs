//! Authoritative shop storage.
//!
//! [`ShopStore`] is the database seam. [`StoreLoader`] adapts a store into
//! the cache's [`Loader`] so read strategies can fall back to it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use guardcache_core::LoaderError;
use guardcache_storage::Loader;

use crate::error::StoreError;
use crate::model::{Shop, ShopType};

/// Source of truth for shops and shop types.
#[async_trait]
pub trait ShopStore: Send + Sync {
    /// `Ok(None)` when no shop has this id.
    async fn get_shop(&self, id: u64) -> Result<Option<Shop>, StoreError>;

    /// Overwrite an existing shop. Fails with [`StoreError::ShopMissing`]
    /// when the id is unknown.
    async fn update_shop(&self, id: u64, shop: &Shop) -> Result<(), StoreError>;

    /// Every shop type, in ascending `sort` order.
    async fn list_shop_types(&self) -> Result<Vec<ShopType>, StoreError>;
}

/// Loader reading shops from a [`ShopStore`].
pub struct StoreLoader {
    store: Arc<dyn ShopStore>,
}

impl StoreLoader {
    pub fn new(store: Arc<dyn ShopStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Loader<u64, Shop> for StoreLoader {
    async fn load(&self, id: &u64) -> Result<Option<Shop>, LoaderError> {
        self.store
            .get_shop(*id)
            .await
            .map_err(LoaderError::from_source)
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Process-local [`ShopStore`] for tests, demos and warm-up from a file.
#[derive(Debug)]
pub struct InMemoryShopStore {
    shops: RwLock<HashMap<u64, Shop>>,
    shop_types: RwLock<Vec<ShopType>>,
    available: AtomicBool,
    latency: Duration,
    shop_reads: AtomicU64,
    type_reads: AtomicU64,
}

impl Default for InMemoryShopStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryShopStore {
    pub fn new() -> Self {
        Self {
            shops: RwLock::new(HashMap::new()),
            shop_types: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
            latency: Duration::ZERO,
            shop_reads: AtomicU64::new(0),
            type_reads: AtomicU64::new(0),
        }
    }

    /// Store seeded with `shops`. Shops without an id are skipped.
    pub fn with_shops(shops: impl IntoIterator<Item = Shop>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.shops.write() {
            map.extend(shops.into_iter().filter_map(|shop| shop.id.map(|id| (id, shop))));
        }
        store
    }

    pub fn with_shop_types(self, types: impl IntoIterator<Item = ShopType>) -> Self {
        if let Ok(mut list) = self.shop_types.write() {
            list.extend(types);
        }
        self
    }

    /// Delay every read by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Insert or replace a shop outside the update path.
    pub fn insert(&self, id: u64, shop: Shop) {
        if let Ok(mut map) = self.shops.write() {
            map.insert(id, shop);
        }
    }

    pub fn remove(&self, id: u64) {
        if let Ok(mut map) = self.shops.write() {
            map.remove(&id);
        }
    }

    /// Simulate the database going away or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn shop_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .shops
            .read()
            .map(|map| map.keys().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Number of `get_shop` calls served so far.
    pub fn shop_reads(&self) -> u64 {
        self.shop_reads.load(Ordering::SeqCst)
    }

    /// Number of `list_shop_types` calls served so far.
    pub fn type_reads(&self) -> u64 {
        self.type_reads.load(Ordering::SeqCst)
    }

    async fn check_available(&self) -> Result<(), StoreError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable {
                reason: "store marked unavailable".to_string(),
            })
        }
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable {
        reason: "store lock poisoned".to_string(),
    }
}

#[async_trait]
impl ShopStore for InMemoryShopStore {
    async fn get_shop(&self, id: u64) -> Result<Option<Shop>, StoreError> {
        self.shop_reads.fetch_add(1, Ordering::SeqCst);
        self.check_available().await?;
        let map = self.shops.read().map_err(|_| poisoned())?;
        Ok(map.get(&id).cloned())
    }

    async fn update_shop(&self, id: u64, shop: &Shop) -> Result<(), StoreError> {
        self.check_available().await?;
        let mut map = self.shops.write().map_err(|_| poisoned())?;
        let slot = map.get_mut(&id).ok_or(StoreError::ShopMissing { id })?;
        *slot = Shop {
            id: Some(id),
            updated_at: Some(Utc::now()),
            ..shop.clone()
        };
        Ok(())
    }

    async fn list_shop_types(&self) -> Result<Vec<ShopType>, StoreError> {
        self.type_reads.fetch_add(1, Ordering::SeqCst);
        self.check_available().await?;
        let mut types = self.shop_types.read().map_err(|_| poisoned())?.clone();
        types.sort_by_key(|t| t.sort);
        Ok(types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_and_update() {
        let store = InMemoryShopStore::with_shops([Shop::new(1, "Noodle Bar")]);
        assert_eq!(store.get_shop(1).await.unwrap().unwrap().name, "Noodle Bar");
        assert_eq!(store.get_shop(2).await.unwrap(), None);

        let mut renamed = Shop::new(1, "Noodle Bar II");
        renamed.id = None;
        store.update_shop(1, &renamed).await.unwrap();

        let stored = store.get_shop(1).await.unwrap().unwrap();
        assert_eq!(stored.name, "Noodle Bar II");
        assert_eq!(stored.id, Some(1));
        assert!(stored.updated_at.is_some());
        assert_eq!(store.shop_reads(), 3);
    }

    #[tokio::test]
    async fn test_update_unknown_shop() {
        let store = InMemoryShopStore::new();
        let err = store.update_shop(5, &Shop::new(5, "Ghost")).await.unwrap_err();
        assert_eq!(err, StoreError::ShopMissing { id: 5 });
    }

    #[tokio::test]
    async fn test_shop_types_sorted() {
        let store = InMemoryShopStore::new().with_shop_types([
            ShopType::new(2, "KTV", 3),
            ShopType::new(1, "Food", 1),
            ShopType::new(3, "Spa", 2),
        ]);
        let names: Vec<_> = store
            .list_shop_types()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["Food", "Spa", "KTV"]);
    }

    #[tokio::test]
    async fn test_loader_maps_store_failure() {
        let store = Arc::new(InMemoryShopStore::with_shops([Shop::new(3, "Bakery")]));
        let loader = StoreLoader::new(store.clone());
        assert_eq!(loader.load(&3).await.unwrap().unwrap().name, "Bakery");

        store.set_available(false);
        let err = loader.load(&3).await.unwrap_err();
        assert!(err.message().contains("unavailable"));
    }
}
