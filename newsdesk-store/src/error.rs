//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer updated the record since it was read.
    #[error("Concurrent update to user {username}: expected version {expected}")]
    Conflict {
        /// Record key.
        username: String,
        /// Version the writer read.
        expected: i64,
    },

    /// No record with this username.
    #[error("User not found: {0}")]
    NotFound(String),

    /// A JSON column could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Store refused the write.
    #[error("Write rejected: {0}")]
    WriteRejected(String),

    /// Underlying database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether the error came from optimistic concurrency control.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
