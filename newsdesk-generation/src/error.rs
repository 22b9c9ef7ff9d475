//! Generation client error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for generation operations.
pub type Result<T> = std::result::Result<T, GenerationError>;

/// Generation client errors.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Request failed after all retries exhausted.
    #[error("Request failed after {attempts} attempts: {message}")]
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Last error message.
        message: String,
    },

    /// Request timed out.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The service answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the service.
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Client misconfiguration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Underlying HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl GenerationError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            _ => false,
        }
    }

    /// Classify a transport error from reqwest.
    pub(crate) fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}
