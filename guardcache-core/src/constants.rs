//! Constants for guardcache
//!
//! Default values for every process-wide setting. `CacheConfig::from_env`
//! falls back to these when a variable is unset or unparsable.

// ============================================================================
// TTLs
// ============================================================================

/// Default TTL for tombstones written after a confirmed miss (2 minutes)
pub const DEFAULT_NULL_TTL_SECS: u64 = 120;

/// Default TTL of the rebuild mutex key (10 seconds)
pub const DEFAULT_LOCK_TTL_SECS: u64 = 10;

// ============================================================================
// LOCK RETRY
// ============================================================================

/// Initial wait before retrying a lost lock race
pub const DEFAULT_LOCK_RETRY_INITIAL_MS: u64 = 50;

/// Upper bound for a single retry wait
pub const DEFAULT_LOCK_RETRY_MAX_MS: u64 = 1_000;

/// Backoff multiplier; 1.0 keeps the polling interval fixed
pub const DEFAULT_LOCK_RETRY_MULTIPLIER: f64 = 1.0;

/// Maximum number of lock attempts before giving up.
///
/// At the default 50 ms poll this waits 12.45 s, longer than one default
/// lock TTL, so a holder that died without releasing is outlasted.
pub const DEFAULT_LOCK_RETRY_MAX_ATTEMPTS: u32 = 250;

// ============================================================================
// REBUILD POOL
// ============================================================================

/// Number of rebuild workers
pub const DEFAULT_REBUILD_WORKERS: usize = 10;

/// Pending rebuild tasks accepted before submissions are rejected
pub const DEFAULT_REBUILD_QUEUE_CAPACITY: usize = 1024;

/// Time budget for one loader call made under a lock
pub const DEFAULT_LOADER_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// KEYS
// ============================================================================

/// Namespace prepended to a data prefix to form its lock prefix
pub const DEFAULT_LOCK_NAMESPACE: &str = "lock:";

/// Marker stored under cooperative lock keys
pub const COOPERATIVE_LOCK_MARKER: &str = "1";

// ============================================================================
// REDIS
// ============================================================================

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
