//! Shop cache configuration
//!
//! TTLs and the default read strategy for [`ShopService`](crate::ShopService).
//! Loaded from `GUARDCACHE_SHOP_*` variables with defaults from
//! [`constants`](crate::constants).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use guardcache_core::ConfigError;
use serde::{Deserialize, Serialize};

use crate::constants::{CACHE_SHOP_LOGICAL_TTL_SECS, CACHE_SHOP_TTL_SECS};

/// Which cache-aside strategy serves a shop read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReadStrategy {
    /// Tombstones for missing shops.
    #[default]
    PassThrough,
    /// One rebuild per shop across all instances.
    Mutex,
    /// Stale reads with background refresh. Requires warmed keys.
    LogicalExpire,
}

impl ReadStrategy {
    pub const ALL: [ReadStrategy; 3] = [
        ReadStrategy::PassThrough,
        ReadStrategy::Mutex,
        ReadStrategy::LogicalExpire,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadStrategy::PassThrough => "pass-through",
            ReadStrategy::Mutex => "mutex",
            ReadStrategy::LogicalExpire => "logical-expire",
        }
    }
}

impl fmt::Display for ReadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReadStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "pass-through" | "passthrough" => Ok(ReadStrategy::PassThrough),
            "mutex" => Ok(ReadStrategy::Mutex),
            "logical-expire" | "logical" => Ok(ReadStrategy::LogicalExpire),
            _ => Err(ConfigError::InvalidValue {
                field: "read_strategy".to_string(),
                value: s.to_string(),
                reason: "expected \"pass-through\", \"mutex\" or \"logical-expire\"".to_string(),
            }),
        }
    }
}

/// Settings for the shop read paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopCacheConfig {
    /// Backend TTL for pass-through and mutex reads.
    pub shop_ttl: Duration,
    /// Envelope lifetime for logical-expiration reads and warm-up.
    pub logical_ttl: Duration,
    /// Strategy used by [`ShopService::query`](crate::ShopService::query).
    pub read_strategy: ReadStrategy,
}

impl Default for ShopCacheConfig {
    fn default() -> Self {
        Self {
            shop_ttl: Duration::from_secs(CACHE_SHOP_TTL_SECS),
            logical_ttl: Duration::from_secs(CACHE_SHOP_LOGICAL_TTL_SECS),
            read_strategy: ReadStrategy::default(),
        }
    }
}

impl ShopCacheConfig {
    /// Load from `GUARDCACHE_SHOP_TTL_SECS`, `GUARDCACHE_SHOP_LOGICAL_TTL_SECS`
    /// and `GUARDCACHE_SHOP_READ_STRATEGY`.
    ///
    /// Unparsable values fall back to their defaults with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let shop_ttl = env_secs("GUARDCACHE_SHOP_TTL_SECS").unwrap_or(defaults.shop_ttl);
        let logical_ttl =
            env_secs("GUARDCACHE_SHOP_LOGICAL_TTL_SECS").unwrap_or(defaults.logical_ttl);

        let read_strategy = match std::env::var("GUARDCACHE_SHOP_READ_STRATEGY") {
            Ok(raw) => raw.parse().unwrap_or_else(|e: ConfigError| {
                tracing::warn!(error = %e, "Ignoring GUARDCACHE_SHOP_READ_STRATEGY");
                defaults.read_strategy
            }),
            Err(_) => defaults.read_strategy,
        };

        Self {
            shop_ttl,
            logical_ttl,
            read_strategy,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, ttl) in [("shop_ttl", self.shop_ttl), ("logical_ttl", self.logical_ttl)] {
            if ttl.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: format!("{:?}", ttl),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn with_shop_ttl(mut self, ttl: Duration) -> Self {
        self.shop_ttl = ttl;
        self
    }

    pub fn with_logical_ttl(mut self, ttl: Duration) -> Self {
        self.logical_ttl = ttl;
        self
    }

    pub fn with_read_strategy(mut self, strategy: ReadStrategy) -> Self {
        self.read_strategy = strategy;
        self
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
