//! Producer and status queries for a named queue.

use crate::broker::{Broker, JobCounts};
use crate::error::{QueueError, QueueResult};
use crate::job::{Job, JobData, JobId, JobPayload, JobStatus, QueueName};
use std::sync::Arc;
use tracing::{debug, info};

/// Handle to a named queue on a shared broker.
///
/// Cheap to clone; the HTTP layer holds one per queue.
#[derive(Clone)]
pub struct Queue {
    name: String,
    broker: Arc<dyn Broker>,
}

impl Queue {
    /// Create a handle for `name` on `broker`.
    pub fn new(name: impl Into<String>, broker: Arc<dyn Broker>) -> Self {
        Self {
            name: name.into(),
            broker,
        }
    }

    /// Create a handle for one of the application queues.
    pub fn named(name: QueueName, broker: Arc<dyn Broker>) -> Self {
        Self::new(name.as_str(), broker)
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying broker.
    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Enqueue a job and return its broker-issued id.
    ///
    /// The job is durably stored before this returns.
    pub async fn add(&self, job_name: &str, data: JobData) -> QueueResult<JobId> {
        let job = self.broker.add(&self.name, job_name, data).await?;
        info!(queue = %self.name, job_id = %job.id, job_name, "Job enqueued");
        Ok(job.id)
    }

    /// Validate and enqueue a typed payload under its job name.
    pub async fn enqueue<P: JobPayload>(&self, payload: &P) -> QueueResult<JobId> {
        payload.validate()?;
        let data =
            serde_json::to_value(payload).map_err(|e| QueueError::Serialization(e.to_string()))?;
        self.add(P::JOB_NAME, data).await
    }

    /// Fetch a job record.
    pub async fn get_job(&self, id: JobId) -> QueueResult<Option<Job>> {
        self.broker.get_job(&self.name, id).await
    }

    /// Current status of a job.
    ///
    /// Fails with [`QueueError::JobNotFound`] when the id is unknown or
    /// its retention has expired.
    pub async fn get_status(&self, id: JobId) -> QueueResult<JobStatus> {
        let job = self
            .get_job(id)
            .await?
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        debug!(queue = %self.name, job_id = %id, state = %job.state, "Status query");
        Ok(job.status())
    }

    /// Count jobs per state.
    pub async fn counts(&self) -> QueueResult<JobCounts> {
        self.broker.counts(&self.name).await
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue").field("name", &self.name).finish()
    }
}
