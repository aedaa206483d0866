//! Cache-aside layer over a shared key-value backend.
//!
//! Three read strategies guard the authoritative store against the classic
//! stampede failures:
//!
//! - penetration: lookups for ids that do not exist are answered from a
//!   short-lived tombstone instead of the store
//! - breakdown: a per-id distributed lock lets one caller rebuild a cold key
//!   while concurrent callers poll the cache
//! - expiry storms: logical-expiry envelopes are served stale while one
//!   background worker refreshes them
//!
//! # Example
//!
//! ```ignore
//! let client = CacheClient::new(backend, CacheConfig::from_env())?;
//! let shops = client.keyspace("cache:shop:")?;
//!
//! let shop: Option<Shop> = client
//!     .query_with_mutex(&shops, &id, &loader, Duration::from_secs(1800))
//!     .await?;
//! ```

pub mod client;
pub mod lock;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod rebuild;
pub mod stats;
pub mod traits;

pub use client::CacheClient;
pub use lock::{DistributedLock, LockGuard};
pub use memory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use self::redis::RedisBackend;
pub use rebuild::{RebuildJob, RebuildMetrics, RebuildMetricsSnapshot, RebuildPool, Rejected};
pub use stats::CacheStats;
pub use traits::{loader_fn, CacheBackend, FnLoader, Loader};
