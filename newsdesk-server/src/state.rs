//! Shared handler state.

use newsdesk_queue::{Broker, Queue, QueueName};
use std::sync::Arc;

/// One producer handle per application queue.
#[derive(Clone, Debug)]
pub struct AppState {
    pub tasks: Queue,
    pub embeddings: Queue,
    pub similarity: Queue,
    pub newsletter: Queue,
}

impl AppState {
    /// Build producers for every queue on `broker`.
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            tasks: Queue::named(QueueName::Tasks, broker.clone()),
            embeddings: Queue::named(QueueName::Embeddings, broker.clone()),
            similarity: Queue::named(QueueName::SimilaritySearch, broker.clone()),
            newsletter: Queue::named(QueueName::Newsletter, broker),
        }
    }
}
