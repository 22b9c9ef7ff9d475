//! Postgres user store.

use crate::{Article, Result, StoreError, StoredEmbedding, UserRecord, UserStore};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::FromRow;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, FromRow)]
struct UserRow {
    username: String,
    articles: Json<Vec<Article>>,
    prompt: Option<String>,
    format_directive: Option<String>,
    newsletter: Option<Json<Value>>,
    embeddings: Option<Json<Vec<StoredEmbedding>>>,
    is_generating: bool,
    version: i64,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            username: row.username,
            articles: row.articles.0,
            prompt: row.prompt.unwrap_or_default(),
            format_directive: row.format_directive.unwrap_or_default(),
            newsletter: row.newsletter.map(|json| json.0),
            embeddings: row.embeddings.map(|json| json.0).unwrap_or_default(),
            is_generating: row.is_generating,
            version: row.version,
        }
    }
}

/// Pool settings.
#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PgStoreConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Store backed by the `users` table.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool and check it answers.
    pub async fn connect(database_url: &str, config: &PgStoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        info!(max_connections = config.max_connections, "Connected to Postgres");
        Ok(Self::new(pool))
    }

    /// Create the `users` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                username TEXT PRIMARY KEY,
                articles JSONB NOT NULL DEFAULT '[]'::jsonb,
                prompt TEXT,
                format_directive TEXT,
                newsletter JSONB,
                embeddings JSONB,
                is_generating BOOLEAN NOT NULL DEFAULT FALSE,
                version BIGINT NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("users table ready");
        Ok(())
    }

    /// Insert or replace a record, keeping its version.
    pub async fn upsert(&self, record: &UserRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (username, articles, prompt, format_directive, newsletter,
                               embeddings, is_generating, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (username) DO UPDATE SET
                articles = EXCLUDED.articles,
                prompt = EXCLUDED.prompt,
                format_directive = EXCLUDED.format_directive,
                newsletter = EXCLUDED.newsletter,
                embeddings = EXCLUDED.embeddings,
                is_generating = EXCLUDED.is_generating,
                version = EXCLUDED.version
            "#,
        )
        .bind(&record.username)
        .bind(Json(&record.articles))
        .bind(&record.prompt)
        .bind(&record.format_directive)
        .bind(record.newsletter.as_ref().map(Json))
        .bind(Json(&record.embeddings))
        .bind(record.is_generating)
        .bind(record.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn conditional_update(
        &self,
        sql: &str,
        username: &str,
        expected_version: i64,
        payload: Value,
    ) -> Result<i64> {
        let version: Option<i64> = sqlx::query_scalar(sql)
            .bind(Json(payload))
            .bind(username)
            .bind(expected_version)
            .fetch_optional(&self.pool)
            .await?;

        version.ok_or_else(|| StoreError::Conflict {
            username: username.to_string(),
            expected: expected_version,
        })
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT username, articles, prompt, format_directive, newsletter,
                   embeddings, is_generating, version
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRecord::from))
    }

    async fn save_newsletter(
        &self,
        username: &str,
        expected_version: i64,
        items: &[Value],
    ) -> Result<i64> {
        self.conditional_update(
            r#"
            UPDATE users
            SET newsletter = $1, is_generating = FALSE, version = version + 1
            WHERE username = $2 AND version = $3
            RETURNING version
            "#,
            username,
            expected_version,
            Value::Array(items.to_vec()),
        )
        .await
    }

    async fn save_embeddings(
        &self,
        username: &str,
        expected_version: i64,
        embeddings: &[StoredEmbedding],
    ) -> Result<i64> {
        let payload = serde_json::to_value(embeddings)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.conditional_update(
            r#"
            UPDATE users
            SET embeddings = $1, version = version + 1
            WHERE username = $2 AND version = $3
            RETURNING version
            "#,
            username,
            expected_version,
            payload,
        )
        .await
    }
}
