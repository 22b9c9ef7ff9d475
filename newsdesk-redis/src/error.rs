//! Redis error types.

use thiserror::Error;

/// Result type for Redis operations.
pub type Result<T> = std::result::Result<T, RedisError>;

/// Redis errors.
#[derive(Debug, Error)]
pub enum RedisError {
    /// Could not reach the server after every reconnect attempt.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout error.
    #[error("Operation timed out")]
    Timeout,

    /// Underlying Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl RedisError {
    /// Check if this error indicates the server is unreachable.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout => true,
            Self::Redis(e) => e.is_connection_refusal() || e.is_io_error() || e.is_timeout(),
            Self::Config(_) => false,
        }
    }
}
