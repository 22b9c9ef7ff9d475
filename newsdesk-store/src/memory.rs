//! In-memory user store.

use crate::{Result, StoreError, StoredEmbedding, UserRecord, UserStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Store backed by a map, with a write counter for assertions.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<Mutex<HashMap<String, UserRecord>>>,
    writes: Arc<AtomicUsize>,
    reject_writes: Arc<AtomicBool>,
}

impl MemoryUserStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    pub fn insert(&self, record: UserRecord) {
        self.users.lock().insert(record.username.clone(), record);
    }

    /// Current copy of a record.
    pub fn get(&self, username: &str) -> Option<UserRecord> {
        self.users.lock().get(username).cloned()
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent write fail.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    fn update(
        &self,
        username: &str,
        expected_version: i64,
        apply: impl FnOnce(&mut UserRecord),
    ) -> Result<i64> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteRejected(format!("store is read-only for {username}")));
        }

        let mut users = self.users.lock();
        let record = users
            .get_mut(username)
            .ok_or_else(|| StoreError::NotFound(username.to_string()))?;
        if record.version != expected_version {
            return Err(StoreError::Conflict {
                username: username.to_string(),
                expected: expected_version,
            });
        }

        apply(record);
        record.version += 1;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record.version)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        Ok(self.get(username))
    }

    async fn save_newsletter(
        &self,
        username: &str,
        expected_version: i64,
        items: &[Value],
    ) -> Result<i64> {
        self.update(username, expected_version, |record| {
            record.newsletter = Some(Value::Array(items.to_vec()));
            record.is_generating = false;
        })
    }

    async fn save_embeddings(
        &self,
        username: &str,
        expected_version: i64,
        embeddings: &[StoredEmbedding],
    ) -> Result<i64> {
        self.update(username, expected_version, |record| {
            record.embeddings = embeddings.to_vec();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_newsletter_bumps_version_and_clears_flag() {
        let store = MemoryUserStore::new();
        let mut record = UserRecord::new("ann");
        record.is_generating = true;
        store.insert(record);

        let version = store
            .save_newsletter("ann", 0, &[json!({"headline": "a"})])
            .await
            .unwrap();
        assert_eq!(version, 1);

        let saved = store.get("ann").unwrap();
        assert!(!saved.is_generating);
        assert_eq!(saved.newsletter, Some(json!([{"headline": "a"}])));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = MemoryUserStore::new();
        store.insert(UserRecord::new("ann"));

        store.save_newsletter("ann", 0, &[]).await.unwrap();
        let err = store.save_newsletter("ann", 0, &[]).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_and_missing_writes() {
        let store = MemoryUserStore::new();
        assert!(matches!(
            store.save_embeddings("ghost", 0, &[]).await,
            Err(StoreError::NotFound(_))
        ));

        store.insert(UserRecord::new("ann"));
        store.reject_writes(true);
        assert!(store.save_newsletter("ann", 0, &[]).await.is_err());
        assert_eq!(store.write_count(), 0);
    }
}
