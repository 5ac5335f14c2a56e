//! Error types for the Redline primitives.

use thiserror::Error;

/// Main error type for Redline operations.
///
/// Contention on a lock and a rejected rate-limit check are normal outcomes and
/// are reported through return values, not through this type. The one exception
/// is [`RedlineError::RateLimitExceeded`], which only
/// [`SlidingWindowLimiter::acquire`](crate::ratelimit::SlidingWindowLimiter::acquire)
/// produces for callers that prefer `?` over a boolean.
#[derive(Error, Debug)]
pub enum RedlineError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The store could not be reached (refused, dropped, timed out)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store was reachable but rejected the command or script
    #[error("Store error: {0}")]
    Store(String),

    /// Message (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A rate-limited subject has used up its window
    #[error("Rate limit exceeded for '{subject}'")]
    RateLimitExceeded { subject: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RedlineError {
    /// Whether this error means the store itself could not be reached.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RedlineError::StoreUnavailable(_))
    }
}

impl From<redis::RedisError> for RedlineError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            RedlineError::StoreUnavailable(err.to_string())
        } else {
            RedlineError::Store(err.to_string())
        }
    }
}

impl From<config::ConfigError> for RedlineError {
    fn from(err: config::ConfigError) -> Self {
        RedlineError::Config(err.to_string())
    }
}

/// Result type alias for Redline operations.
pub type Result<T> = std::result::Result<T, RedlineError>;
