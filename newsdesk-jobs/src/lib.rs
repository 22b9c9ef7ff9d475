//! # Newsdesk Jobs
//!
//! Handlers executed by the worker pools:
//!
//! | Queue | Job name | Handler |
//! |---|---|---|
//! | `tasks` | `process-task` | [`TaskHandler`] |
//! | `embeddings` | `process-embedding` | [`EmbeddingHandler`] |
//! | `similarity-search` | `similarity-search` | [`SimilaritySearchHandler`] |
//! | `newsletter` | `generate-newsletter` | [`NewsletterHandler`] |
//!
//! Handlers depend only on the [`UserStore`] and [`TextGenerator`] traits, so
//! the same code runs against Postgres and OpenAI in production and against
//! in-memory fakes in tests.

mod embedding;
mod error;
mod handler;
mod newsletter;
mod payload;
mod prompt;
mod similarity;
mod task;

pub use embedding::EmbeddingHandler;
pub use error::{JobError, JobResult};
pub use handler::{Handler, attach};
pub use newsletter::{NewsletterHandler, NewsletterOutcome};
pub use payload::{
    NewsletterPayload, SimilaritySearchPayload, TaskPayload, UserJobPayload, queue_for,
};
pub use prompt::{MAX_ARTICLE_CHARS, PromptTemplate, truncate_chars};
pub use similarity::{
    DEFAULT_LIMIT, SearchHit, SearchOutcome, SimilaritySearchHandler, cosine_similarity, rank,
};
pub use task::TaskHandler;

use newsdesk_generation::TextGenerator;
use newsdesk_queue::{Broker, Queue, QueueName, Worker, WorkerConfig};
use newsdesk_store::UserStore;
use std::sync::Arc;
use std::time::Duration;

/// Dependencies shared by the handlers.
#[derive(Clone)]
pub struct JobContext {
    pub store: Arc<dyn UserStore>,
    pub generator: Arc<dyn TextGenerator>,
    /// Delay per step of the general task.
    pub task_step_delay: Duration,
    /// Chat model for newsletter payloads that name none.
    pub newsletter_model: Option<String>,
}

impl JobContext {
    pub fn new(store: Arc<dyn UserStore>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            store,
            generator,
            task_step_delay: Duration::from_secs(1),
            newsletter_model: None,
        }
    }

    /// Set the per-step delay of the general task.
    pub fn with_task_step_delay(mut self, delay: Duration) -> Self {
        self.task_step_delay = delay;
        self
    }

    /// Override the default newsletter model.
    pub fn with_newsletter_model(mut self, model: impl Into<String>) -> Self {
        self.newsletter_model = Some(model.into());
        self
    }
}

/// Build a worker for `queue` with its handler registered.
pub fn worker_for(
    queue: QueueName,
    broker: Arc<dyn Broker>,
    context: &JobContext,
    config: WorkerConfig,
) -> Worker {
    let mut worker = Worker::with_config(Queue::named(queue, broker), config);
    match queue {
        QueueName::Tasks => attach(
            &mut worker,
            Arc::new(TaskHandler::with_step_delay(context.task_step_delay)),
        ),
        QueueName::Embeddings => attach(
            &mut worker,
            Arc::new(EmbeddingHandler::new(
                context.store.clone(),
                context.generator.clone(),
            )),
        ),
        QueueName::SimilaritySearch => attach(
            &mut worker,
            Arc::new(SimilaritySearchHandler::new(
                context.store.clone(),
                context.generator.clone(),
            )),
        ),
        QueueName::Newsletter => {
            let mut handler =
                NewsletterHandler::new(context.store.clone(), context.generator.clone());
            if let Some(model) = &context.newsletter_model {
                handler = handler.with_default_model(model.as_str());
            }
            attach(&mut worker, Arc::new(handler))
        }
    }
    worker
}

/// One worker per application queue, all sharing `broker`.
pub fn build_workers(
    broker: Arc<dyn Broker>,
    context: &JobContext,
    config: &WorkerConfig,
) -> Vec<Worker> {
    QueueName::ALL
        .into_iter()
        .map(|queue| worker_for(queue, broker.clone(), context, config.clone()))
        .collect()
}
