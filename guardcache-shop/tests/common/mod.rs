//! Shared fixtures for shop integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use guardcache_shop::{
    InMemoryShopStore, Shop, ShopCacheConfig, ShopService, ShopType, ShopTypeService,
};
use guardcache_storage::{CacheBackend, CacheClient};
use guardcache_test_utils::fixtures::fast_config;
use guardcache_test_utils::{CountingBackend, FailingBackend, InMemoryBackend};

pub const SHOP_TTL: Duration = Duration::from_secs(60);

pub type TestBackend = FailingBackend<CountingBackend<InMemoryBackend>>;

/// One service stack over an outage-capable, call-counting in-memory backend.
pub struct Harness {
    pub backend: Arc<TestBackend>,
    pub store: Arc<InMemoryShopStore>,
    pub shops: ShopService,
    pub shop_types: ShopTypeService,
}

impl Harness {
    pub fn new(store: InMemoryShopStore) -> Self {
        Self::with_config(store, ShopCacheConfig::default().with_shop_ttl(SHOP_TTL))
    }

    pub fn with_config(store: InMemoryShopStore, config: ShopCacheConfig) -> Self {
        let backend = Arc::new(FailingBackend::new(CountingBackend::new(InMemoryBackend::new())));
        let store = Arc::new(store);
        let cache = CacheClient::<dyn CacheBackend>::new(backend.clone(), fast_config())
            .expect("fast config is valid");
        let shops = ShopService::new(cache.clone(), store.clone(), config)
            .expect("shop config is valid");
        let shop_types = ShopTypeService::new(cache, store.clone());
        Self {
            backend,
            store,
            shops,
            shop_types,
        }
    }

    /// The in-memory map behind the decorators.
    pub fn memory(&self) -> &InMemoryBackend {
        self.backend.inner().inner()
    }
}

pub fn shop(id: u64) -> Shop {
    Shop::new(id, format!("Shop{}", id))
}

pub fn sample_store() -> InMemoryShopStore {
    InMemoryShopStore::with_shops((1..=5).map(shop)).with_shop_types([
        ShopType::new(1, "Food", 1),
        ShopType::new(2, "KTV", 2),
        ShopType::new(3, "Spa", 3),
    ])
}

pub fn sample_shops_json() -> &'static str {
    include_str!("../../data/shops.sample.json")
}
