//! Constants for the shop services
//!
//! Key prefixes and TTLs used by the shop read paths. `ShopCacheConfig`
//! falls back to these when its environment variables are unset.

// ============================================================================
// KEYS
// ============================================================================

/// Data prefix for cached shops
pub const CACHE_SHOP_KEY: &str = "cache:shop:";

/// Single key holding the ordered shop type list
pub const CACHE_SHOP_TYPE_KEY: &str = "cache:shopType";

// ============================================================================
// TTLs
// ============================================================================

/// Backend TTL for shops cached by the pass-through and mutex reads (30 minutes)
pub const CACHE_SHOP_TTL_SECS: u64 = 1_800;

/// Logical TTL for shops served with logical expiration
pub const CACHE_SHOP_LOGICAL_TTL_SECS: u64 = 20;

// ============================================================================
// TELEMETRY
// ============================================================================

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "guardcache=debug,info";
