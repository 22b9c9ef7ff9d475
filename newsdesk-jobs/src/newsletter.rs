//! Newsletter batch handler.

use crate::error::{JobError, JobResult};
use crate::handler::Handler;
use crate::payload::NewsletterPayload;
use crate::prompt::{NEWSLETTER_SYSTEM, PromptTemplate};
use async_trait::async_trait;
use newsdesk_generation::{DEFAULT_MODEL, GenerationError, GenerationRequest, TextGenerator};
use newsdesk_queue::{Job, JobData, JobPayload, JobProgress, QueueName, QueueResult};
use newsdesk_store::{Article, UserStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Progress after loading the user and before the first article.
const START_PROGRESS: u8 = 10;
/// Progress span covered by the article loop.
const LOOP_SPAN: u8 = 80;

/// Progress after `done` of `total` articles.
pub(crate) fn article_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return START_PROGRESS + LOOP_SPAN;
    }
    START_PROGRESS + (LOOP_SPAN as usize * done.min(total) / total) as u8
}

/// Result of a newsletter job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsletterOutcome {
    pub username: String,
    pub count: usize,
    pub items: Vec<Value>,
}

/// Generates one newsletter item per article and stores them in one write.
///
/// Articles are processed sequentially. An article whose generation fails
/// is logged and left out; the job still completes with the rest.
pub struct NewsletterHandler {
    store: Arc<dyn UserStore>,
    generator: Arc<dyn TextGenerator>,
    template: PromptTemplate,
    default_model: String,
}

impl NewsletterHandler {
    pub fn new(store: Arc<dyn UserStore>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            store,
            generator,
            template: PromptTemplate::default(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Model used when the payload names none.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Run the batch for one payload.
    pub async fn generate(
        &self,
        payload: &NewsletterPayload,
        progress: &JobProgress,
    ) -> JobResult<NewsletterOutcome> {
        let username = payload.username.as_str();
        let user = self
            .store
            .find_by_username(username)
            .await?
            .ok_or_else(|| JobError::UserNotFound(username.to_string()))?;
        progress.update(START_PROGRESS).await?;

        let instructions = if payload.prompt.trim().is_empty() {
            user.prompt.as_str()
        } else {
            payload.prompt.as_str()
        };
        let model = payload
            .model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.default_model);

        let total = user.articles.len();
        let mut items = Vec::with_capacity(total);
        for (index, article) in user.articles.iter().enumerate() {
            match self
                .summarize(model, instructions, article, &user.format_directive)
                .await
            {
                Ok(item) => items.push(item),
                Err(e) => warn!(
                    username,
                    article = index,
                    title = %article.title,
                    error = %e,
                    "Skipping article after generation error"
                ),
            }
            progress.update(article_progress(index + 1, total)).await?;
        }

        let version = self
            .store
            .save_newsletter(username, user.version, &items)
            .await?;
        progress.update(100).await?;

        info!(
            username,
            generated = items.len(),
            skipped = total - items.len(),
            version,
            "Newsletter saved"
        );

        Ok(NewsletterOutcome {
            username: username.to_string(),
            count: items.len(),
            items,
        })
    }

    async fn summarize(
        &self,
        model: &str,
        instructions: &str,
        article: &Article,
        format_directive: &str,
    ) -> JobResult<Value> {
        let prompt = self.template.render(instructions, article, format_directive);
        let request = GenerationRequest::new(model, prompt).with_system(NEWSLETTER_SYSTEM);
        let item = self.generator.generate_json(request).await?;
        annotate(item, article)
    }
}

/// Attach source metadata to a generated item; anything but an object is rejected.
fn annotate(item: Value, article: &Article) -> JobResult<Value> {
    let Value::Object(mut map) = item else {
        return Err(GenerationError::InvalidResponse(
            "generated item is not a JSON object".to_string(),
        )
        .into());
    };
    map.insert("source".to_string(), Value::from(article.source.clone()));
    map.insert("title".to_string(), Value::from(article.title.clone()));
    map.insert("link".to_string(), Value::from(article.link.clone()));
    map.insert(
        "published_at".to_string(),
        article
            .published_at
            .clone()
            .map(Value::from)
            .unwrap_or(Value::Null),
    );
    Ok(Value::Object(map))
}

#[async_trait]
impl Handler for NewsletterHandler {
    const QUEUE: QueueName = QueueName::Newsletter;

    async fn handle(&self, job: Job, progress: JobProgress) -> QueueResult<JobData> {
        let payload: NewsletterPayload = job.payload()?;
        payload.validate()?;

        info!(
            job_id = %job.id,
            username = %payload.username,
            attempt = job.attempts_made,
            "Generating newsletter"
        );
        let outcome = self.generate(&payload, &progress).await?;
        serde_json::to_value(outcome)
            .map_err(|e| newsdesk_queue::QueueError::Serialization(e.to_string()))
    }
}
