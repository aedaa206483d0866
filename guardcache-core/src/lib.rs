//! guardcache Core - Shared Types
//!
//! Keys, envelopes, the value codec, errors and configuration used by the
//! cache-aside strategies. This crate does no I/O.

pub mod config;
pub mod constants;
pub mod entry;
pub mod envelope;
pub mod error;
pub mod key;

pub use config::{CacheConfig, LockMode, LockRetryPolicy, RedisConfig};
pub use entry::{decode, encode, CacheEntry, Cacheable, TOMBSTONE};
pub use envelope::Envelope;
pub use error::{
    BackendError, CacheError, CacheResult, CodecError, ConfigError, LoaderError, LockError,
    SchedulerError,
};
pub use key::{CacheKey, KeySpace, LockKey};
