//! Handler error types.

use newsdesk_generation::GenerationError;
use newsdesk_queue::QueueError;
use newsdesk_store::StoreError;
use thiserror::Error;

/// Result type for handler internals.
pub type JobResult<T> = Result<T, JobError>;

/// Errors raised while executing a job.
///
/// Per-article generation errors are logged and skipped by the batch
/// handlers; everything that reaches the worker fails the job.
#[derive(Debug, Error)]
pub enum JobError {
    /// The payload names a user that does not exist.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Similarity search on a user without stored embeddings.
    #[error("No embeddings stored for user: {0}")]
    NoEmbeddings(String),

    /// Payload decoded but is unusable.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// External generation service failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Record store failed, including version conflicts.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Queue-side failure such as progress reporting.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl From<JobError> for QueueError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Queue(inner) => inner,
            other => QueueError::HandlerFailure(other.to_string()),
        }
    }
}
