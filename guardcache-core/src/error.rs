//! Error types for guardcache operations

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Cache backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend unavailable during {operation} on {key}: {reason}")]
    Unavailable {
        operation: &'static str,
        key: String,
        reason: String,
    },

    #[error("Backend connection failed: {reason}")]
    Connection { reason: String },
}

impl BackendError {
    /// Shorthand for a failed remote call against a single key.
    pub fn unavailable(operation: &'static str, key: &str, reason: impl Into<String>) -> Self {
        BackendError::Unavailable {
            operation,
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Distributed lock errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("Lock acquisition exhausted for {key} after {attempts} attempts ({waited:?} waited)")]
    AcquisitionExhausted {
        key: String,
        attempts: u32,
        waited: Duration,
    },
}

/// Background rebuild scheduler errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Rebuild queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Rebuild scheduler is shut down")]
    ShutDown,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, value: impl fmt::Debug, reason: &str) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: format!("{:?}", value),
            reason: reason.to_string(),
        }
    }
}

/// Value (de)serialization errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Serialization failed: {reason}")]
    Serialize { reason: String },

    #[error("Deserialization failed: {reason}")]
    Deserialize { reason: String },
}

/// Failure reported by a loader while reading the authoritative store.
///
/// The cache never inspects or rewrites this error: it reaches the caller
/// exactly as the loader produced it, and it is never cached as a tombstone.
#[derive(Debug, Clone)]
pub struct LoaderError {
    message: String,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl LoaderError {
    /// Create a loader error from a plain message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying store error, keeping it reachable through `source()`.
    pub fn from_source<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: error.to_string(),
            source: Some(Arc::new(error)),
        }
    }

    /// The loader's own description of the failure.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LoaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Master error type for all guardcache errors.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Loader timed out after {timeout:?} for {key}")]
    LoaderTimeout { key: String, timeout: Duration },
}

impl CacheError {
    /// True when the error came from the cache backend rather than the store.
    pub fn is_backend(&self) -> bool {
        matches!(self, CacheError::Backend(_))
    }

    /// True when the loader itself failed or did not answer in time.
    pub fn is_loader_failure(&self) -> bool {
        matches!(
            self,
            CacheError::Loader(_) | CacheError::LoaderTimeout { .. }
        )
    }
}

/// Result type alias for guardcache operations.
pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_backend_error_display_unavailable() {
        let err = BackendError::unavailable("GET", "cache:shop:1", "connection refused");
        let msg = format!("{}", err);
        assert!(msg.contains("GET"));
        assert!(msg.contains("cache:shop:1"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_lock_error_display_exhausted() {
        let err = LockError::AcquisitionExhausted {
            key: "lock:shop:1".to_string(),
            attempts: 20,
            waited: Duration::from_millis(1000),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("lock:shop:1"));
        assert!(msg.contains("20 attempts"));
    }

    #[test]
    fn test_scheduler_error_display_queue_full() {
        let msg = format!("{}", SchedulerError::QueueFull { capacity: 8 });
        assert!(msg.contains("capacity 8"));
    }

    #[test]
    fn test_loader_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "db timeout");
        let err = LoaderError::from_source(io);
        assert_eq!(err.message(), "db timeout");
        assert!(err.source().is_some());

        let plain = LoaderError::new("boom");
        assert!(plain.source().is_none());
        assert_eq!(format!("{}", plain), "boom");
    }

    #[test]
    fn test_cache_error_from_variants() {
        let backend = CacheError::from(BackendError::Connection {
            reason: "refused".to_string(),
        });
        assert!(backend.is_backend());
        assert!(!backend.is_loader_failure());

        let loader = CacheError::from(LoaderError::new("down"));
        assert!(loader.is_loader_failure());

        let timeout = CacheError::LoaderTimeout {
            key: "cache:shop:1".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(timeout.is_loader_failure());

        let lock = CacheError::from(LockError::AcquisitionExhausted {
            key: "k".to_string(),
            attempts: 1,
            waited: Duration::ZERO,
        });
        assert!(matches!(lock, CacheError::Lock(_)));

        let scheduler = CacheError::from(SchedulerError::ShutDown);
        assert!(matches!(scheduler, CacheError::Scheduler(_)));
    }
}
