//! Error types for lock acquisition

use thiserror::Error;

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Result type for store round-trips
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures of the backing key-value store itself
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached
    #[error("Store connection error: {0}")]
    Connection(String),

    /// The value under a lock key is not an integer expiration
    #[error("Invalid claim stored under {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    /// The store does not implement an optional primitive
    #[error("{store} store does not support {operation}")]
    Unsupported {
        store: &'static str,
        operation: &'static str,
    },

    /// Redis backend error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] keylock_redis::RedisError),
}

impl StoreError {
    /// Create a new connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an invalid value error
    pub fn invalid_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Check if a later attempt could plausibly get through
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            #[cfg(feature = "redis")]
            Self::Redis(e) => e.is_retryable(),
            Self::InvalidValue { .. } | Self::Unsupported { .. } => false,
        }
    }
}

/// Lock acquisition errors
#[derive(Debug, Error)]
pub enum LockError {
    /// The store call failed or returned something unparseable
    #[error("Lock store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// The key is held by a live claim, or this attempt lost a reclamation race
    #[error("Failed to acquire lock: {key}")]
    LockFailed { key: String },

    /// Every attempt of a retrying acquisition failed
    #[error("Failed to acquire lock {key} after {attempts} attempts")]
    AcquisitionExhausted {
        key: String,
        attempts: u32,
        #[source]
        last_error: Box<LockError>,
    },

    /// The coordinator was configured with unusable settings
    #[error("Invalid lock configuration: {0}")]
    Config(String),

    /// The key is empty
    #[error("Invalid lock key: {0:?}")]
    InvalidKey(String),

    /// The requested expiration is not after the current time
    #[error("Lock expiration {expire_at_nanos} is not after now ({now_nanos})")]
    InvalidExpiration { expire_at_nanos: i64, now_nanos: i64 },
}

impl LockError {
    /// Create a lock failed error
    pub fn lock_failed(key: impl Into<String>) -> Self {
        Self::LockFailed { key: key.into() }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this error means the key is contended
    pub fn is_lock_failed(&self) -> bool {
        matches!(self, Self::LockFailed { .. })
    }

    /// Check if this error came from the store layer
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Check if this error came from a store failure that may clear up
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(e) if e.is_transient())
    }

    /// Check if this error is the terminal error of a retrying acquisition
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::AcquisitionExhausted { .. })
    }

    /// Caller mistakes; retrying the same call can never succeed
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::InvalidKey(_) | Self::InvalidExpiration { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_store_error_converts_to_store_unavailable() {
        let err: LockError = StoreError::connection("refused").into();
        assert!(err.is_store_error());
        assert!(!err.is_lock_failed());
        assert_eq!(
            err.to_string(),
            "Lock store unavailable: Store connection error: refused"
        );
    }

    #[test]
    fn test_exhausted_exposes_last_error_as_source() {
        let err = LockError::AcquisitionExhausted {
            key: "job-42".into(),
            attempts: 4,
            last_error: Box::new(LockError::lock_failed("job-42")),
        };

        assert!(err.is_exhausted());
        assert_eq!(err.to_string(), "Failed to acquire lock job-42 after 4 attempts");
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Failed to acquire lock: job-42"));
    }

    #[test]
    fn test_transient_store_errors() {
        assert!(LockError::from(StoreError::connection("reset")).is_transient());
        assert!(!LockError::from(StoreError::invalid_value("k", "junk")).is_transient());
        assert!(!LockError::lock_failed("k").is_transient());
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_redis_transport_errors_are_transient() {
        use keylock_redis::RedisError;

        assert!(StoreError::from(RedisError::Timeout).is_transient());
        assert!(!StoreError::from(RedisError::Config("bad url".into())).is_transient());
    }

    #[test]
    fn test_caller_errors() {
        assert!(LockError::InvalidKey(String::new()).is_caller_error());
        assert!(LockError::config("retries").is_caller_error());
        assert!(!LockError::lock_failed("k").is_caller_error());
    }
}
