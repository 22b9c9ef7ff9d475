//! Binding handlers to workers.

use async_trait::async_trait;
use newsdesk_queue::{Job, JobData, JobProgress, QueueName, QueueResult, Worker};
use std::sync::Arc;

/// A job handler for one application queue.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Queue whose jobs this handler processes.
    const QUEUE: QueueName;

    /// Process one job and produce its result.
    async fn handle(&self, job: Job, progress: JobProgress) -> QueueResult<JobData>;
}

/// Register `handler` on `worker` under its queue's job name.
pub fn attach<H: Handler>(worker: &mut Worker, handler: Arc<H>) {
    worker.register_handler(H::QUEUE.job_name(), move |job, progress| {
        let handler = handler.clone();
        async move { handler.handle(job, progress).await }
    });
}
