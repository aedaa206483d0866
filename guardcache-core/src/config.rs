//! Configuration types
//!
//! Process-wide cache settings. Per-call TTLs are passed to each query; every
//! other knob lives here and can be loaded from the environment.

use crate::constants::*;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// LOCK MODE
// ============================================================================

/// How rebuild locks are marked and released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LockMode {
    /// Constant marker, release is a plain delete.
    #[default]
    Cooperative,
    /// Random token per holder, release is compare-and-delete.
    Fenced,
}

impl LockMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::Cooperative => "cooperative",
            LockMode::Fenced => "fenced",
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LockMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cooperative" => Ok(LockMode::Cooperative),
            "fenced" => Ok(LockMode::Fenced),
            _ => Err(ConfigError::invalid(
                "lock_mode",
                s,
                "expected \"cooperative\" or \"fenced\"",
            )),
        }
    }
}

// ============================================================================
// LOCK RETRY POLICY
// ============================================================================

/// Backoff applied by the mutex strategy after losing a lock race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for LockRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_LOCK_RETRY_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_LOCK_RETRY_INITIAL_MS),
            max_backoff: Duration::from_millis(DEFAULT_LOCK_RETRY_MAX_MS),
            backoff_multiplier: DEFAULT_LOCK_RETRY_MULTIPLIER,
        }
    }
}

impl LockRetryPolicy {
    /// Fixed-interval polling, the classic "sleep and try again" loop.
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: interval,
            max_backoff: interval,
            backoff_multiplier: 1.0,
        }
    }

    /// Exponential backoff capped at `max_backoff`.
    pub fn exponential(
        initial_backoff: Duration,
        max_backoff: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier: 2.0,
        }
    }

    /// Wait before the retry that follows failed attempt number `attempt`
    /// (zero based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .max(1.0)
            .powi(attempt.min(i32::MAX as u32) as i32);
        let nanos = self.initial_backoff.as_nanos() as f64 * factor;
        let capped = nanos.min(self.max_backoff.as_nanos() as f64);
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_nanos(capped as u64)
        } else {
            self.max_backoff
        }
    }

    /// Upper bound on the total time spent sleeping before giving up.
    pub fn worst_case_wait(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.backoff_for(attempt))
            .sum()
    }
}

// ============================================================================
// CACHE CONFIGURATION
// ============================================================================

/// Process-wide configuration for the cache client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL of tombstones written after the loader confirms a miss.
    pub null_ttl: Duration,
    /// TTL of rebuild lock keys; bounds how long a dead holder blocks others.
    pub lock_ttl: Duration,
    /// Retry policy for the mutex strategy.
    pub lock_retry: LockRetryPolicy,
    /// Number of background rebuild workers.
    pub rebuild_workers: usize,
    /// Pending rebuilds accepted before `submit` starts rejecting.
    pub rebuild_queue_capacity: usize,
    /// Time budget for a loader call made while holding a lock.
    pub loader_timeout: Duration,
    /// Lock marking and release discipline.
    pub lock_mode: LockMode,
    /// Namespace used to derive lock prefixes from data prefixes.
    pub lock_namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            null_ttl: Duration::from_secs(DEFAULT_NULL_TTL_SECS),
            lock_ttl: Duration::from_secs(DEFAULT_LOCK_TTL_SECS),
            lock_retry: LockRetryPolicy::default(),
            rebuild_workers: DEFAULT_REBUILD_WORKERS,
            rebuild_queue_capacity: DEFAULT_REBUILD_QUEUE_CAPACITY,
            loader_timeout: Duration::from_millis(DEFAULT_LOADER_TIMEOUT_MS),
            lock_mode: LockMode::default(),
            lock_namespace: DEFAULT_LOCK_NAMESPACE.to_string(),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create CacheConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `GUARDCACHE_NULL_TTL_SECS`: tombstone TTL (default: 120)
    /// - `GUARDCACHE_LOCK_TTL_SECS`: lock key TTL (default: 10)
    /// - `GUARDCACHE_LOCK_RETRY_INITIAL_MS`: first retry wait (default: 50)
    /// - `GUARDCACHE_LOCK_RETRY_MAX_MS`: retry wait cap (default: 1000)
    /// - `GUARDCACHE_LOCK_RETRY_MULTIPLIER`: backoff multiplier (default: 1.0)
    /// - `GUARDCACHE_LOCK_RETRY_MAX_ATTEMPTS`: attempts before failing (default: 250)
    /// - `GUARDCACHE_REBUILD_WORKERS`: rebuild pool size (default: 10)
    /// - `GUARDCACHE_REBUILD_QUEUE_CAPACITY`: pending rebuild limit (default: 1024)
    /// - `GUARDCACHE_LOADER_TIMEOUT_MS`: loader budget under a lock (default: 5000)
    /// - `GUARDCACHE_LOCK_MODE`: "cooperative" or "fenced" (default: cooperative)
    /// - `GUARDCACHE_LOCK_NAMESPACE`: lock key namespace (default: "lock:")
    pub fn from_env() -> Self {
        let null_ttl = Duration::from_secs(env_parse(
            "GUARDCACHE_NULL_TTL_SECS",
            DEFAULT_NULL_TTL_SECS,
        ));

        let lock_ttl = Duration::from_secs(env_parse(
            "GUARDCACHE_LOCK_TTL_SECS",
            DEFAULT_LOCK_TTL_SECS,
        ));

        let lock_retry = LockRetryPolicy {
            max_attempts: env_parse(
                "GUARDCACHE_LOCK_RETRY_MAX_ATTEMPTS",
                DEFAULT_LOCK_RETRY_MAX_ATTEMPTS,
            ),
            initial_backoff: Duration::from_millis(env_parse(
                "GUARDCACHE_LOCK_RETRY_INITIAL_MS",
                DEFAULT_LOCK_RETRY_INITIAL_MS,
            )),
            max_backoff: Duration::from_millis(env_parse(
                "GUARDCACHE_LOCK_RETRY_MAX_MS",
                DEFAULT_LOCK_RETRY_MAX_MS,
            )),
            backoff_multiplier: env_parse(
                "GUARDCACHE_LOCK_RETRY_MULTIPLIER",
                DEFAULT_LOCK_RETRY_MULTIPLIER,
            ),
        };

        let rebuild_workers = env_parse("GUARDCACHE_REBUILD_WORKERS", DEFAULT_REBUILD_WORKERS);

        let rebuild_queue_capacity = env_parse(
            "GUARDCACHE_REBUILD_QUEUE_CAPACITY",
            DEFAULT_REBUILD_QUEUE_CAPACITY,
        );

        let loader_timeout = Duration::from_millis(env_parse(
            "GUARDCACHE_LOADER_TIMEOUT_MS",
            DEFAULT_LOADER_TIMEOUT_MS,
        ));

        let lock_mode = std::env::var("GUARDCACHE_LOCK_MODE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        let lock_namespace = std::env::var("GUARDCACHE_LOCK_NAMESPACE")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_LOCK_NAMESPACE.to_string());

        Self {
            null_ttl,
            lock_ttl,
            lock_retry,
            rebuild_workers,
            rebuild_queue_capacity,
            loader_timeout,
            lock_mode,
            lock_namespace,
        }
    }

    /// Check the invariants the strategies rely on.
    ///
    /// A retry budget shorter than `lock_ttl` is accepted. With such a budget
    /// a waiter returns `LockError::AcquisitionExhausted` while the lock of a
    /// crashed holder is still live; see [`CacheConfig::retry_outlasts_lock_ttl`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.null_ttl.is_zero() {
            return Err(ConfigError::invalid(
                "null_ttl",
                self.null_ttl,
                "tombstones must expire after a positive interval",
            ));
        }
        if self.lock_ttl.is_zero() {
            return Err(ConfigError::invalid(
                "lock_ttl",
                self.lock_ttl,
                "lock keys must carry a positive TTL",
            ));
        }
        if self.lock_retry.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "lock_retry.max_attempts",
                self.lock_retry.max_attempts,
                "at least one attempt is required",
            ));
        }
        if !self.lock_retry.backoff_multiplier.is_finite()
            || self.lock_retry.backoff_multiplier < 1.0
        {
            return Err(ConfigError::invalid(
                "lock_retry.backoff_multiplier",
                self.lock_retry.backoff_multiplier,
                "must be a finite value >= 1.0",
            ));
        }
        if self.lock_retry.initial_backoff > self.lock_retry.max_backoff {
            return Err(ConfigError::IncompatibleOptions {
                option_a: "lock_retry.initial_backoff".to_string(),
                option_b: "lock_retry.max_backoff".to_string(),
            });
        }
        if self.rebuild_workers == 0 {
            return Err(ConfigError::invalid(
                "rebuild_workers",
                self.rebuild_workers,
                "the rebuild pool needs at least one worker",
            ));
        }
        if self.rebuild_queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "rebuild_queue_capacity",
                self.rebuild_queue_capacity,
                "the rebuild queue needs room for one task",
            ));
        }
        if self.loader_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "loader_timeout",
                self.loader_timeout,
                "loader calls need a positive time budget",
            ));
        }
        if self.loader_timeout > self.lock_ttl {
            // A loader allowed to outlive the lock lets a second rebuild start
            // while the first is still running.
            return Err(ConfigError::IncompatibleOptions {
                option_a: "loader_timeout".to_string(),
                option_b: "lock_ttl".to_string(),
            });
        }
        if self.lock_namespace.is_empty() {
            return Err(ConfigError::invalid(
                "lock_namespace",
                &self.lock_namespace,
                "an empty namespace makes lock keys collide with data keys",
            ));
        }
        Ok(())
    }

    /// Whether a waiter keeps polling for at least one full lock TTL.
    pub fn retry_outlasts_lock_ttl(&self) -> bool {
        self.lock_retry.worst_case_wait() >= self.lock_ttl
    }

    /// Set the tombstone TTL.
    pub fn with_null_ttl(mut self, ttl: Duration) -> Self {
        self.null_ttl = ttl;
        self
    }

    /// Set the lock TTL.
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Set the lock retry policy.
    pub fn with_lock_retry(mut self, policy: LockRetryPolicy) -> Self {
        self.lock_retry = policy;
        self
    }

    /// Set the rebuild pool size.
    pub fn with_rebuild_workers(mut self, workers: usize) -> Self {
        self.rebuild_workers = workers;
        self
    }

    /// Set the rebuild queue capacity.
    pub fn with_rebuild_queue_capacity(mut self, capacity: usize) -> Self {
        self.rebuild_queue_capacity = capacity;
        self
    }

    /// Set the loader timeout.
    pub fn with_loader_timeout(mut self, timeout: Duration) -> Self {
        self.loader_timeout = timeout;
        self
    }

    /// Set the lock mode.
    pub fn with_lock_mode(mut self, mode: LockMode) -> Self {
        self.lock_mode = mode;
        self
    }

    /// Set the lock namespace.
    pub fn with_lock_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.lock_namespace = namespace.into();
        self
    }
}

// ============================================================================
// REDIS CONFIGURATION
// ============================================================================

/// Connection settings for the Redis backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
        }
    }
}

impl RedisConfig {
    /// Create RedisConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `GUARDCACHE_REDIS_URL`: connection URL (default: redis://127.0.0.1:6379)
    pub fn from_env() -> Self {
        let url = std::env::var("GUARDCACHE_REDIS_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());
        Self { url }
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lock_ttl, Duration::from_secs(10));
        assert_eq!(config.rebuild_workers, 10);
        assert_eq!(config.lock_mode, LockMode::Cooperative);
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::new()
            .with_null_ttl(Duration::from_secs(30))
            .with_lock_ttl(Duration::from_secs(5))
            .with_lock_retry(LockRetryPolicy::fixed(Duration::from_millis(10), 3))
            .with_rebuild_workers(2)
            .with_rebuild_queue_capacity(4)
            .with_loader_timeout(Duration::from_secs(1))
            .with_lock_mode(LockMode::Fenced)
            .with_lock_namespace("mutex:");

        assert_eq!(config.null_ttl, Duration::from_secs(30));
        assert_eq!(config.lock_ttl, Duration::from_secs(5));
        assert_eq!(config.lock_retry.max_attempts, 3);
        assert_eq!(config.rebuild_workers, 2);
        assert_eq!(config.rebuild_queue_capacity, 4);
        assert_eq!(config.loader_timeout, Duration::from_secs(1));
        assert_eq!(config.lock_mode, LockMode::Fenced);
        assert_eq!(config.lock_namespace, "mutex:");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = CacheConfig::new().with_rebuild_workers(0);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "rebuild_workers"));
    }

    #[test]
    fn test_validate_rejects_loader_timeout_beyond_lock_ttl() {
        let config = CacheConfig::new()
            .with_lock_ttl(Duration::from_secs(1))
            .with_loader_timeout(Duration::from_secs(2));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IncompatibleOptions { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_namespace() {
        let config = CacheConfig::new().with_lock_namespace("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lock_mode_parse() {
        assert_eq!("fenced".parse::<LockMode>().unwrap(), LockMode::Fenced);
        assert_eq!(" Cooperative ".parse::<LockMode>().unwrap(), LockMode::Cooperative);
        assert!("sloppy".parse::<LockMode>().is_err());
        assert_eq!(LockMode::Fenced.to_string(), "fenced");
    }

    #[test]
    fn test_fixed_backoff_is_constant() {
        let policy = LockRetryPolicy::fixed(Duration::from_millis(50), 10);
        assert_eq!(policy.backoff_for(0), Duration::from_millis(50));
        assert_eq!(policy.backoff_for(7), Duration::from_millis(50));
        assert_eq!(policy.worst_case_wait(), Duration::from_millis(450));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = LockRetryPolicy::exponential(
            Duration::from_millis(10),
            Duration::from_millis(100),
            10,
        );
        assert_eq!(policy.backoff_for(0), Duration::from_millis(10));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(20));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(40));
        assert_eq!(policy.backoff_for(5), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(u32::MAX), Duration::from_millis(100));
    }

    #[test]
    fn test_default_retry_budget_outlasts_lock_ttl() {
        let config = CacheConfig::default();
        assert_eq!(config.lock_retry.max_attempts, 250);
        assert_eq!(
            config.lock_retry.worst_case_wait(),
            Duration::from_millis(12_450)
        );
        assert!(config.retry_outlasts_lock_ttl());

        let short = config.with_lock_retry(LockRetryPolicy::fixed(Duration::from_millis(50), 100));
        assert!(!short.retry_outlasts_lock_ttl());
        assert!(short.validate().is_ok());
    }

    #[test]
    fn test_redis_config_default() {
        assert_eq!(RedisConfig::default().url, "redis://127.0.0.1:6379");
    }
}
