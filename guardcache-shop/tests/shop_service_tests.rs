//! End-to-end tests for the shop read paths.

mod common;

use std::time::Duration;

use common::{sample_store, shop, Harness, SHOP_TTL};
use guardcache_core::CacheError;
use guardcache_shop::{InMemoryShopStore, ReadStrategy, Shop, ShopError};
use guardcache_test_utils::fixtures::expired_envelope;
use guardcache_test_utils::BackendCalls;

#[tokio::test(start_paused = true)]
async fn pass_through_caches_hits_and_tombstones() {
    let store = InMemoryShopStore::with_shops([Shop::new(42, "Shop42")]);
    let h = Harness::new(store);

    let found = h.shops.query_by_id(42, ReadStrategy::PassThrough).await.unwrap();
    assert_eq!(found.name, "Shop42");
    assert_eq!(h.memory().ttl_of("cache:shop:42"), Some(Some(SHOP_TTL)));

    let err = h.shops.query_by_id(99, ReadStrategy::PassThrough).await.unwrap_err();
    assert!(matches!(err, ShopError::ShopNotFound { id: 99 }));
    assert_eq!(h.memory().raw("cache:shop:99"), Some(Vec::new()));
    assert_eq!(
        h.memory().ttl_of("cache:shop:99"),
        Some(Some(h.shops.cache().config().null_ttl))
    );

    h.shops.query_by_id(99, ReadStrategy::PassThrough).await.unwrap_err();
    h.shops.query_by_id(42, ReadStrategy::PassThrough).await.unwrap();
    assert_eq!(h.store.shop_reads(), 2);
    assert_eq!(
        h.backend.inner().calls(),
        BackendCalls {
            gets: 4,
            sets: 2,
            ..Default::default()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn tombstone_expiry_reveals_new_shop() {
    let h = Harness::new(InMemoryShopStore::new());

    h.shops.query(7).await.unwrap_err();
    h.store.insert(7, shop(7));
    assert!(h.shops.query(7).await.unwrap_err().is_not_found());

    tokio::time::advance(h.shops.cache().config().null_ttl).await;
    assert_eq!(h.shops.query(7).await.unwrap(), shop(7));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mutex_reads_load_each_shop_once() {
    let h = Harness::new(sample_store().with_latency(Duration::from_millis(50)));

    let readers: Vec<_> = (0..16)
        .map(|_| {
            let shops = h.shops.clone();
            tokio::spawn(async move { shops.query_by_id(3, ReadStrategy::Mutex).await })
        })
        .collect();

    for reader in readers {
        let found = reader.await.unwrap().unwrap();
        assert_eq!(found, shop(3));
    }
    assert_eq!(h.store.shop_reads(), 1);
    assert!(!h.memory().contains("lock:cache:shop:3"));
}

#[tokio::test]
async fn logical_read_serves_stale_then_refreshes() {
    let h = Harness::new(sample_store());
    h.memory().insert_raw(
        "cache:shop:2",
        expired_envelope(Some(Shop::new(2, "Before")), Duration::from_secs(5)),
        None,
    );
    h.store.insert(2, Shop::new(2, "After"));

    let stale = h.shops.query_by_id(2, ReadStrategy::LogicalExpire).await.unwrap();
    assert_eq!(stale.name, "Before");

    h.shops.cache().wait_for_rebuilds().await;
    let fresh = h.shops.query_by_id(2, ReadStrategy::LogicalExpire).await.unwrap();
    assert_eq!(fresh.name, "After");
    assert_eq!(h.store.shop_reads(), 1);
    assert!(!h.memory().contains("lock:cache:shop:2"));
}

#[tokio::test]
async fn logical_read_of_deleted_shop_becomes_not_found() {
    let h = Harness::new(sample_store());
    h.memory().insert_raw(
        "cache:shop:4",
        expired_envelope(Some(shop(4)), Duration::from_secs(5)),
        None,
    );
    h.store.remove(4);

    assert_eq!(
        h.shops.query_by_id(4, ReadStrategy::LogicalExpire).await.unwrap(),
        shop(4)
    );
    h.shops.cache().wait_for_rebuilds().await;

    let err = h
        .shops
        .query_by_id(4, ReadStrategy::LogicalExpire)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn every_strategy_fails_open_when_cache_is_down() {
    let h = Harness::new(sample_store());
    h.backend.set_available(false);

    for strategy in ReadStrategy::ALL {
        let found = h.shops.query_by_id(1, strategy).await.unwrap();
        assert_eq!(found, shop(1), "strategy {}", strategy);
    }
    assert_eq!(h.store.shop_reads(), 3);
    assert!(h.shops.cache().stats().backend_errors >= 3);
}

#[tokio::test]
async fn store_failure_reaches_caller_and_is_not_cached() {
    let h = Harness::new(sample_store());
    h.store.set_available(false);

    for strategy in [ReadStrategy::PassThrough, ReadStrategy::Mutex] {
        let err = h.shops.query_by_id(1, strategy).await.unwrap_err();
        assert!(
            matches!(&err, ShopError::Cache(e) if e.is_loader_failure()),
            "unexpected error {:?}",
            err
        );
    }
    assert!(!h.memory().contains("cache:shop:1"));
    assert!(!h.memory().contains("lock:cache:shop:1"));

    h.store.set_available(true);
    assert_eq!(h.shops.query(1).await.unwrap(), shop(1));
}

#[tokio::test]
async fn update_writes_store_then_invalidates() {
    let h = Harness::new(sample_store());
    h.shops.query(5).await.unwrap();

    let mut renamed = shop(5);
    renamed.name = "Renamed".to_string();
    h.shops.update(&renamed).await.unwrap();

    assert!(!h.memory().contains("cache:shop:5"));
    assert_eq!(h.shops.query(5).await.unwrap().name, "Renamed");
}

#[tokio::test]
async fn update_reports_failed_invalidation() {
    let h = Harness::new(sample_store());
    h.shops.query(5).await.unwrap();
    h.backend.fail_writes(true);

    let mut renamed = shop(5);
    renamed.name = "Renamed".to_string();
    let err = h.shops.update(&renamed).await.unwrap_err();
    assert!(matches!(err, ShopError::Cache(CacheError::Backend(_))));

    // The store already holds the new value; the cache still serves the old.
    h.backend.fail_writes(false);
    assert_eq!(h.shops.query(5).await.unwrap().name, "Shop5");
}

#[tokio::test]
async fn shop_types_cached_and_ordered() {
    let h = Harness::new(sample_store());

    let types = h.shop_types.list().await.unwrap();
    let names: Vec<_> = types.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["Food", "KTV", "Spa"]);
    assert_eq!(h.memory().ttl_of("cache:shopType"), Some(None));

    h.shop_types.list().await.unwrap();
    assert_eq!(h.store.type_reads(), 1);
}

#[tokio::test]
async fn missing_shop_types_are_not_cached() {
    let h = Harness::new(InMemoryShopStore::new());

    assert!(h.shop_types.list().await.unwrap_err().is_not_found());
    assert!(!h.memory().contains("cache:shopType"));
}
