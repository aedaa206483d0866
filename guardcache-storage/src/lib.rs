//! guardcache Storage - Backends and Cache-Aside Strategies
//!
//! Backend adapters (Redis, in-memory), the distributed rebuild lock, the
//! background rebuild pool and the `CacheClient` read strategies built on
//! top of them. Shared types live in `guardcache-core`.

pub mod cache;

pub use cache::{
    loader_fn, CacheBackend, CacheClient, CacheStats, DistributedLock, FnLoader, InMemoryBackend,
    Loader, LockGuard, RebuildJob, RebuildMetrics, RebuildMetricsSnapshot, RebuildPool, Rejected,
};
#[cfg(feature = "redis")]
pub use cache::RedisBackend;
