//! Cache Warm-up Binary
//!
//! Seeds Redis with logical-expiration entries for every shop in a JSON file
//! (an array of shops, camelCase fields).
//!
//! Usage:
//!   guardcache-warmup shops.json
//!   GUARDCACHE_WARMUP_FILE=shops.json guardcache-warmup
//!
//! Redis and cache settings come from the usual `GUARDCACHE_*` variables.

use std::process::ExitCode;
use std::sync::Arc;

use guardcache_core::{BackendError, CacheConfig, CacheError, RedisConfig};
use guardcache_shop::{
    init_tracing, InMemoryShopStore, Shop, ShopCacheConfig, ShopError, ShopService,
};
use guardcache_storage::{CacheBackend, CacheClient, RedisBackend};
use thiserror::Error;
use tracing_subscriber::util::TryInitError;

#[derive(Debug, Error)]
enum WarmupError {
    #[error("no input file: pass a path or set GUARDCACHE_WARMUP_FILE")]
    MissingInput,

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid shop file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("failed to init tracing: {0}")]
    Telemetry(#[from] TryInitError),

    #[error("redis: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Shop(#[from] ShopError),
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("guardcache-warmup: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns the number of shops that could not be warmed.
async fn run() -> Result<u64, WarmupError> {
    init_tracing()?;

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("GUARDCACHE_WARMUP_FILE").ok())
        .filter(|p| !p.trim().is_empty())
        .ok_or(WarmupError::MissingInput)?;

    let contents = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| WarmupError::Read {
            path: path.clone(),
            source,
        })?;
    let shops: Vec<Shop> = serde_json::from_str(&contents).map_err(|source| WarmupError::Parse {
        path: path.clone(),
        source,
    })?;

    let store = Arc::new(InMemoryShopStore::with_shops(shops));
    let ids = store.shop_ids();
    tracing::info!(path = %path, shops = ids.len(), "Loaded shops for warm-up");

    let redis_config = RedisConfig::from_env();
    let backend: Arc<dyn CacheBackend> = Arc::new(RedisBackend::connect(&redis_config).await?);
    let cache = CacheClient::new(backend, CacheConfig::from_env())?;
    let service = ShopService::new(cache.clone(), store, ShopCacheConfig::from_env())?;

    let report = service.warm_all(ids).await;
    cache.shutdown().await;

    Ok(report.failed)
}
