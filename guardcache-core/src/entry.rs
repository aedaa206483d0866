//! Raw cache entries and the value codec.
//!
//! Values are stored as JSON. An empty (or whitespace-only) value is a
//! tombstone: the store confirmed the entity does not exist.

use crate::error::CodecError;
use serde::{de::DeserializeOwned, Serialize};

/// Bytes written for a tombstone.
pub const TOMBSTONE: &[u8] = b"";

/// Marker trait for values that can pass through the cache.
pub trait Cacheable: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Cacheable for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// A cache slot as observed through the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    /// Key not present.
    Absent,
    /// Present but blank: confirmed missing upstream.
    Tombstone,
    /// Present with a serialized value or envelope.
    Populated(Vec<u8>),
}

impl CacheEntry {
    /// Classify what a backend `get` returned.
    pub fn from_raw(raw: Option<Vec<u8>>) -> Self {
        match raw {
            None => CacheEntry::Absent,
            Some(bytes) if is_blank(&bytes) => CacheEntry::Tombstone,
            Some(bytes) => CacheEntry::Populated(bytes),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, CacheEntry::Absent)
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, CacheEntry::Tombstone)
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| b.is_ascii_whitespace())
}

/// Serialize a value for storage.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|e| CodecError::Serialize {
        reason: e.to_string(),
    })
}

/// Deserialize a stored value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Deserialize {
        reason: e.to_string(),
    })
}
