//! Error types for the shop services.

use guardcache_core::CacheError;
use thiserror::Error;

/// Failures reported by a [`ShopStore`](crate::store::ShopStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Shop store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Shop {id} does not exist")]
    ShopMissing { id: u64 },
}

/// Errors returned by [`ShopService`](crate::ShopService) and
/// [`ShopTypeService`](crate::ShopTypeService).
#[derive(Debug, Error)]
pub enum ShopError {
    #[error("Shop {id} does not exist")]
    ShopNotFound { id: u64 },

    #[error("No shop types exist")]
    ShopTypesNotFound,

    #[error("Validation failed for {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl ShopError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ShopError::ShopNotFound { .. } | ShopError::ShopTypesNotFound
        )
    }
}

/// Result type alias for shop operations.
pub type ShopResult<T> = Result<T, ShopError>;
