//! Namespaced cache keys.
//!
//! A `KeySpace` pairs the data prefix of one entity type with the prefix of
//! its rebuild locks. `CacheKey` and `LockKey` can only be built through a
//! key space, so a data key and a lock key for the same id never collide.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key prefixes for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeySpace {
    data_prefix: String,
    lock_prefix: String,
}

impl KeySpace {
    /// Create a key space from explicit data and lock prefixes.
    ///
    /// Fails when either prefix is empty or when one prefix is a prefix of
    /// the other, since `lock_prefix + id` could then equal
    /// `data_prefix + other_id`.
    pub fn new(
        data_prefix: impl Into<String>,
        lock_prefix: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let data_prefix = data_prefix.into();
        let lock_prefix = lock_prefix.into();

        if data_prefix.is_empty() {
            return Err(ConfigError::invalid(
                "data_prefix",
                &data_prefix,
                "prefix must not be empty",
            ));
        }
        if lock_prefix.is_empty() {
            return Err(ConfigError::invalid(
                "lock_prefix",
                &lock_prefix,
                "prefix must not be empty",
            ));
        }
        if data_prefix.starts_with(&lock_prefix) || lock_prefix.starts_with(&data_prefix) {
            return Err(ConfigError::IncompatibleOptions {
                option_a: format!("data_prefix={}", data_prefix),
                option_b: format!("lock_prefix={}", lock_prefix),
            });
        }

        Ok(Self {
            data_prefix,
            lock_prefix,
        })
    }

    /// Derive the lock prefix by prepending `namespace` to the data prefix.
    pub fn namespaced(
        data_prefix: impl Into<String>,
        namespace: &str,
    ) -> Result<Self, ConfigError> {
        let data_prefix = data_prefix.into();
        let lock_prefix = format!("{}{}", namespace, data_prefix);
        Self::new(data_prefix, lock_prefix)
    }

    pub fn data_prefix(&self) -> &str {
        &self.data_prefix
    }

    pub fn lock_prefix(&self) -> &str {
        &self.lock_prefix
    }

    /// Key holding the cached value, tombstone or envelope for `id`.
    pub fn data_key<Id: fmt::Display + ?Sized>(&self, id: &Id) -> CacheKey {
        CacheKey(format!("{}{}", self.data_prefix, id))
    }

    /// Key guarding rebuilds of `id`.
    pub fn lock_key<Id: fmt::Display + ?Sized>(&self, id: &Id) -> LockKey {
        LockKey(format!("{}{}", self.lock_prefix, id))
    }
}

/// Fully qualified key of a cached entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// A standalone key for a singleton entry that belongs to no key space.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fully qualified key of a rebuild lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey(String);

impl LockKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LockKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
