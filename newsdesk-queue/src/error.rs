//! Error types for queue operations.

use crate::job::JobState;
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue-specific errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Request payload is missing required fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// Queue storage cannot be reached
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// Broker answered with an error unrelated to connectivity
    #[error("Broker error: {0}")]
    Broker(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Error raised inside a job handler
    #[error("Job execution failed: {0}")]
    HandlerFailure(String),

    /// No handler registered for job name
    #[error("No handler registered for job: {0}")]
    NoHandler(String),

    /// Lifecycle transition not allowed from the current state
    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition {
        /// State the job was in
        from: JobState,
        /// State that was requested
        to: JobState,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Worker not running
    #[error("Worker not running")]
    WorkerNotRunning,

    /// Worker already running
    #[error("Worker already running")]
    WorkerAlreadyRunning,
}

impl QueueError {
    /// Build a handler failure from any displayable error.
    pub fn handler(err: impl std::fmt::Display) -> Self {
        Self::HandlerFailure(err.to_string())
    }

    /// The human-readable reason recorded on a failed job.
    pub fn failure_reason(&self) -> String {
        match self {
            Self::HandlerFailure(reason) => reason.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the error means the broker could not be reached.
    pub fn is_broker_unavailable(&self) -> bool {
        matches!(self, Self::BrokerUnavailable(_))
    }
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            Self::BrokerUnavailable(err.to_string())
        } else {
            Self::Broker(err.to_string())
        }
    }
}

impl From<newsdesk_redis::RedisError> for QueueError {
    fn from(err: newsdesk_redis::RedisError) -> Self {
        match err {
            newsdesk_redis::RedisError::Redis(e) => e.into(),
            newsdesk_redis::RedisError::Config(msg) => Self::Broker(msg),
            other => Self::BrokerUnavailable(other.to_string()),
        }
    }
}
