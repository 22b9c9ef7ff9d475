//! Article embedding handler.

use crate::error::{JobError, JobResult};
use crate::handler::Handler;
use crate::newsletter::article_progress;
use crate::payload::UserJobPayload;
use crate::prompt::PromptTemplate;
use async_trait::async_trait;
use newsdesk_generation::{DEFAULT_EMBEDDING_MODEL, TextGenerator};
use newsdesk_queue::{Job, JobData, JobPayload, JobProgress, QueueName, QueueResult};
use newsdesk_store::{StoredEmbedding, UserStore};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Embeds every article of a user and stores the vectors in one write.
pub struct EmbeddingHandler {
    store: Arc<dyn UserStore>,
    generator: Arc<dyn TextGenerator>,
    template: PromptTemplate,
    model: String,
}

impl EmbeddingHandler {
    pub fn new(store: Arc<dyn UserStore>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            store,
            generator,
            template: PromptTemplate::default(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    /// Use a different embedding model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn embed_user(
        &self,
        username: &str,
        progress: &JobProgress,
    ) -> JobResult<Vec<StoredEmbedding>> {
        let user = self
            .store
            .find_by_username(username)
            .await?
            .ok_or_else(|| JobError::UserNotFound(username.to_string()))?;
        progress.update(10).await?;

        let total = user.articles.len();
        let mut embeddings = Vec::with_capacity(total);
        for (index, article) in user.articles.iter().enumerate() {
            let input = self.template.embedding_input(article);
            match self.generator.embed(&self.model, &input).await {
                Ok(vector) => embeddings.push(StoredEmbedding {
                    link: article.link.clone(),
                    title: article.title.clone(),
                    source: article.source.clone(),
                    vector,
                }),
                Err(e) => warn!(
                    username,
                    article = index,
                    error = %e,
                    "Skipping article after embedding error"
                ),
            }
            progress.update(article_progress(index + 1, total)).await?;
        }

        self.store
            .save_embeddings(username, user.version, &embeddings)
            .await?;
        progress.update(100).await?;
        Ok(embeddings)
    }
}

#[async_trait]
impl Handler for EmbeddingHandler {
    const QUEUE: QueueName = QueueName::Embeddings;

    async fn handle(&self, job: Job, progress: JobProgress) -> QueueResult<JobData> {
        let payload: UserJobPayload = job.payload()?;
        payload.validate()?;

        let embeddings = self.embed_user(&payload.username, &progress).await?;
        info!(
            job_id = %job.id,
            username = %payload.username,
            count = embeddings.len(),
            "Embeddings stored"
        );

        Ok(json!({
            "username": payload.username,
            "count": embeddings.len(),
        }))
    }
}
