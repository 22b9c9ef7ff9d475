//! # Newsdesk Store
//!
//! User and content records read by the job handlers, with a Postgres
//! implementation over `sqlx` and an in-memory one for tests.
//!
//! Writes are conditional on the record's `version`, so two jobs racing on
//! the same user cannot silently overwrite each other: the loser gets
//! [`StoreError::Conflict`].

mod error;
mod memory;
mod model;
mod postgres;

pub use error::{Result, StoreError};
pub use memory::MemoryUserStore;
pub use model::{Article, StoredEmbedding, UserRecord};
pub use postgres::{PgStoreConfig, PgUserStore};

use async_trait::async_trait;
use serde_json::Value;

/// Access to user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Load a record by primary key.
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>>;

    /// Replace the newsletter and clear `is_generating` in a single write.
    ///
    /// Succeeds only if the stored version still equals `expected_version`;
    /// returns the new version.
    async fn save_newsletter(
        &self,
        username: &str,
        expected_version: i64,
        items: &[Value],
    ) -> Result<i64>;

    /// Replace stored embeddings in a single conditional write.
    async fn save_embeddings(
        &self,
        username: &str,
        expected_version: i64,
        embeddings: &[StoredEmbedding],
    ) -> Result<i64>;
}
