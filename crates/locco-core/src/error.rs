//! Error types for Locco locks and adapters

use std::fmt;

/// Why the retry engine gave up on an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStop {
    /// The `total_time_ms` budget ran out before the next attempt
    TotalTimeExceeded,
    /// The `retry_times` cap was reached
    RetryTimesReached,
    /// The delay policy asked to stop
    Stopped(String),
}

impl fmt::Display for RetryStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TotalTimeExceeded => f.write_str("total time exceeded"),
            Self::RetryTimesReached => f.write_str("reached retry-times limit"),
            Self::Stopped(reason) if reason.is_empty() => f.write_str("manually stopped"),
            Self::Stopped(reason) => write!(f, "manually stopped: {}", reason),
        }
    }
}

/// Error type for all lock operations
#[derive(Debug, thiserror::Error)]
pub enum LoccoError {
    /// Malformed input; never retried
    #[error("validation failed: {0}")]
    Validation(String),

    /// The backend refused to create the lock because a live record exists
    #[error("failed to create lock for key '{key}'")]
    CreateFailed { key: String },

    /// The backend has no live record for this key and owner
    #[error("failed to release lock for key '{key}'")]
    ReleaseFailed { key: String },

    /// The backend has no live record for this key and owner
    #[error("failed to extend lock for key '{key}'")]
    ExtendFailed { key: String },

    #[error("retry exhausted: {0}")]
    RetryExhausted(RetryStop),

    /// Illegal transition on a lock handle
    #[error("illegal lock state: {0}")]
    IllegalState(String),

    /// Transport or storage error from the backing store, kept as-is
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl LoccoError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }

    /// Wrap a driver error without reclassifying it
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(error))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_create_failed(&self) -> bool {
        matches!(self, Self::CreateFailed { .. })
    }

    pub fn is_release_failed(&self) -> bool {
        matches!(self, Self::ReleaseFailed { .. })
    }

    pub fn is_extend_failed(&self) -> bool {
        matches!(self, Self::ExtendFailed { .. })
    }

    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted(_))
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState(_))
    }

    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_))
    }

    /// Borrow the underlying driver error as a concrete type
    pub fn backend_error<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Self::Backend(source) => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LoccoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoccoError::validation("ttl should be a positive integer");
        assert_eq!(
            err.to_string(),
            "validation failed: ttl should be a positive integer"
        );

        let err = LoccoError::CreateFailed {
            key: "orders".to_string(),
        };
        assert_eq!(err.to_string(), "failed to create lock for key 'orders'");

        let err = LoccoError::RetryExhausted(RetryStop::RetryTimesReached);
        assert_eq!(err.to_string(), "retry exhausted: reached retry-times limit");

        let err = LoccoError::RetryExhausted(RetryStop::Stopped(String::new()));
        assert_eq!(err.to_string(), "retry exhausted: manually stopped");

        let err = LoccoError::RetryExhausted(RetryStop::Stopped("shutdown".to_string()));
        assert_eq!(err.to_string(), "retry exhausted: manually stopped: shutdown");
    }

    #[test]
    fn test_backend_error_is_kept_verbatim() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset");
        let err = LoccoError::backend(io);

        assert!(err.is_backend());
        assert!(!err.is_create_failed());
        let inner = err.backend_error::<std::io::Error>().unwrap();
        assert_eq!(inner.kind(), std::io::ErrorKind::ConnectionReset);
        assert!(err.backend_error::<std::fmt::Error>().is_none());
    }

    #[test]
    fn test_predicates() {
        let err = LoccoError::ExtendFailed {
            key: "k".to_string(),
        };
        assert!(err.is_extend_failed());
        assert!(!err.is_release_failed());
        assert!(LoccoError::illegal_state("released twice").is_illegal_state());
        assert!(LoccoError::RetryExhausted(RetryStop::TotalTimeExceeded).is_retry_exhausted());
    }
}
