//! guardcache shop services
//!
//! Shop and shop type reads served through the guardcache cache-aside
//! strategies, backed by a pluggable [`ShopStore`]. Also hosts the
//! `guardcache-warmup` binary that seeds logical-expiration entries.
//!
//! ```ignore
//! let cache = CacheClient::<dyn CacheBackend>::new(backend, CacheConfig::from_env())?;
//! let shops = ShopService::new(cache, store, ShopCacheConfig::from_env())?;
//! let shop = shops.query_by_id(42, ReadStrategy::Mutex).await?;
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod model;
pub mod services;
pub mod store;
pub mod telemetry;

pub use config::{ReadStrategy, ShopCacheConfig};
pub use error::{ShopError, ShopResult, StoreError};
pub use model::{Shop, ShopType};
pub use services::{ShopService, ShopTypeService, WarmupReport};
pub use store::{InMemoryShopStore, ShopStore, StoreLoader};
pub use telemetry::init_tracing;
