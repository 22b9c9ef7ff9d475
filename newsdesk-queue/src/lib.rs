//! Job queue and background processing for Newsdesk.
//!
//! Provides:
//! - Durable job storage behind the [`Broker`] trait (Redis or in-memory)
//! - Broker-issued job ids and monotonic lifecycle states
//! - Progress tracking that never goes backwards
//! - Worker pools with bounded concurrency and graceful drain
//! - Heartbeated claims, with stalled jobs handed back to the queue
//! - Lifecycle events for observers
//!
//! ## Quick Start - Producer
//!
//! ```
//! use newsdesk_queue::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> QueueResult<()> {
//! let queue = Queue::named(QueueName::Tasks, Arc::new(MemoryBroker::new()));
//! let id = queue.add("process-task", json!({"data": "hello"})).await?;
//!
//! let status = queue.get_status(id).await?;
//! assert_eq!(status.state, JobState::Waiting);
//! # Ok(())
//! # }
//! ```
//!
//! ## Worker
//!
//! ```no_run
//! use newsdesk_queue::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example(broker: Arc<dyn Broker>) -> QueueResult<()> {
//! let queue = Queue::named(QueueName::Tasks, broker);
//! let mut worker = Worker::with_config(queue, WorkerConfig::default().with_concurrency(5));
//!
//! worker.register_handler("process-task", |job, progress| async move {
//!     progress.update(100).await?;
//!     Ok(json!({ "processed": true, "originalData": job.data }))
//! });
//!
//! worker.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod error;
pub mod events;
pub mod job;
pub mod queue;
pub mod worker;

pub use broker::{Broker, JobCounts, MemoryBroker, RedisBroker, RedisBrokerConfig};
pub use error::{QueueError, QueueResult};
pub use events::{LoggingListener, WorkerEvent, WorkerListener};
pub use job::{Job, JobData, JobId, JobPayload, JobState, JobStatus, QueueName};
pub use queue::Queue;
pub use worker::{JobHandler, JobProgress, Worker, WorkerConfig};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::broker::{Broker, MemoryBroker, RedisBroker};
    pub use crate::error::{QueueError, QueueResult};
    pub use crate::job::{Job, JobData, JobId, JobPayload, JobState, JobStatus, QueueName};
    pub use crate::queue::Queue;
    pub use crate::worker::{JobProgress, Worker, WorkerConfig};
}
