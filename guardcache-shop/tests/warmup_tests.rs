//! Warm-up from the sample shop file.

mod common;

use std::time::Duration;

use common::{sample_shops_json, Harness};
use guardcache_shop::{InMemoryShopStore, ReadStrategy, Shop, WarmupReport};

fn sample_store() -> InMemoryShopStore {
    let shops: Vec<Shop> = serde_json::from_str(sample_shops_json()).unwrap();
    InMemoryShopStore::with_shops(shops)
}

#[tokio::test]
async fn warm_all_seeds_logical_reads() {
    let h = Harness::new(sample_store());
    let ids = h.store.shop_ids();
    assert_eq!(ids, [1, 2, 3]);

    let report = h.shops.warm_all(ids.clone()).await;
    assert_eq!(
        report,
        WarmupReport {
            warmed: 3,
            missing: 0,
            failed: 0
        }
    );

    for id in ids {
        assert_eq!(h.memory().ttl_of(&format!("cache:shop:{}", id)), Some(None));
        let shop = h
            .shops
            .query_by_id(id, ReadStrategy::LogicalExpire)
            .await
            .unwrap();
        assert_eq!(shop.id, Some(id));
    }
    assert_eq!(h.store.shop_reads(), 3);
}

#[tokio::test]
async fn warm_reports_missing_and_failed() {
    let h = Harness::new(sample_store());

    assert!(!h.shops.warm(404, Duration::from_secs(20)).await.unwrap());
    assert!(h
        .shops
        .query_by_id(404, ReadStrategy::LogicalExpire)
        .await
        .unwrap_err()
        .is_not_found());

    h.backend.fail_writes(true);
    let report = h.shops.warm_all([1]).await;
    assert_eq!(report.failed, 1);
}

#[test]
fn sample_file_parses() {
    let shops: Vec<Shop> = serde_json::from_str(sample_shops_json()).unwrap();
    assert_eq!(shops.len(), 3);
    assert_eq!(shops[1].name, "Cai Family Noodles");
    assert_eq!(shops[2].images, "");
}
