//! General task handler.

use crate::handler::Handler;
use crate::payload::TaskPayload;
use async_trait::async_trait;
use chrono::Utc;
use newsdesk_queue::{Job, JobData, JobProgress, QueueName, QueueResult};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

const STEPS: u8 = 5;

/// Simulated unit of work: five timed steps with progress, then an echo of
/// the submitted data.
#[derive(Debug, Clone)]
pub struct TaskHandler {
    step_delay: Duration,
}

impl Default for TaskHandler {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_secs(1),
        }
    }
}

impl TaskHandler {
    /// Handler with a custom delay per step.
    pub fn with_step_delay(step_delay: Duration) -> Self {
        Self { step_delay }
    }
}

#[async_trait]
impl Handler for TaskHandler {
    const QUEUE: QueueName = QueueName::Tasks;

    async fn handle(&self, job: Job, progress: JobProgress) -> QueueResult<JobData> {
        let payload: TaskPayload = job.payload()?;
        info!(job_id = %job.id, "Processing task");

        progress.update(10).await?;
        for step in 1..=STEPS {
            tokio::time::sleep(self.step_delay).await;
            progress.update(step * 20).await?;
            debug!(job_id = %job.id, progress = step * 20, "Task step done");
        }

        Ok(json!({
            "processed": true,
            "originalData": payload.data,
            "processedAt": Utc::now().to_rfc3339(),
            "message": "Task completed successfully",
        }))
    }
}
