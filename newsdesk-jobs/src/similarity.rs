//! Similarity search over stored embeddings.

use crate::error::{JobError, JobResult};
use crate::handler::Handler;
use crate::payload::SimilaritySearchPayload;
use async_trait::async_trait;
use newsdesk_generation::{DEFAULT_EMBEDDING_MODEL, TextGenerator};
use newsdesk_queue::{Job, JobData, JobPayload, JobProgress, QueueError, QueueName, QueueResult};
use newsdesk_store::{StoredEmbedding, UserStore};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::info;

/// Results returned when the payload gives no limit.
pub const DEFAULT_LIMIT: usize = 5;

/// One ranked article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub source: String,
    pub link: String,
    pub score: f32,
}

/// Result of a similarity search job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub username: String,
    pub query: String,
    pub results: Vec<SearchHit>,
}

/// Cosine similarity; `None` for empty, mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Rank `embeddings` against `query`, best first, keeping `limit`.
pub fn rank(query: &[f32], embeddings: &[StoredEmbedding], limit: usize) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = embeddings
        .iter()
        .filter_map(|stored| {
            cosine_similarity(query, &stored.vector).map(|score| SearchHit {
                title: stored.title.clone(),
                source: stored.source.clone(),
                link: stored.link.clone(),
                score,
            })
        })
        .collect();
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    hits.truncate(limit);
    hits
}

/// Ranks a user's stored article embeddings against a query. Read-only.
pub struct SimilaritySearchHandler {
    store: Arc<dyn UserStore>,
    generator: Arc<dyn TextGenerator>,
    model: String,
}

impl SimilaritySearchHandler {
    pub fn new(store: Arc<dyn UserStore>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            store,
            generator,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    /// Use a different embedding model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn search(
        &self,
        payload: &SimilaritySearchPayload,
        progress: &JobProgress,
    ) -> JobResult<SearchOutcome> {
        let username = payload.username.as_str();
        let user = self
            .store
            .find_by_username(username)
            .await?
            .ok_or_else(|| JobError::UserNotFound(username.to_string()))?;
        if user.embeddings.is_empty() {
            return Err(JobError::NoEmbeddings(username.to_string()));
        }
        progress.update(20).await?;

        let query = payload
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(user.prompt.trim());
        if query.is_empty() {
            return Err(JobError::InvalidPayload(
                "no query given and the user has no prompt".to_string(),
            ));
        }

        let vector = self.generator.embed(&self.model, query).await?;
        progress.update(70).await?;

        let results = rank(
            &vector,
            &user.embeddings,
            payload.limit.unwrap_or(DEFAULT_LIMIT),
        );
        progress.update(100).await?;

        Ok(SearchOutcome {
            username: username.to_string(),
            query: query.to_string(),
            results,
        })
    }
}

#[async_trait]
impl Handler for SimilaritySearchHandler {
    const QUEUE: QueueName = QueueName::SimilaritySearch;

    async fn handle(&self, job: Job, progress: JobProgress) -> QueueResult<JobData> {
        let payload: SimilaritySearchPayload = job.payload()?;
        payload.validate()?;

        let outcome = self.search(&payload, &progress).await?;
        info!(
            job_id = %job.id,
            username = %outcome.username,
            hits = outcome.results.len(),
            "Similarity search finished"
        );
        serde_json::to_value(outcome).map_err(|e| QueueError::Serialization(e.to_string()))
    }
}
