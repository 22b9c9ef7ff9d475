//! Worker lifecycle events.

use crate::job::{JobData, JobId};
use tracing::{error, info, warn};

/// Something a worker observed while processing a job.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A slot claimed the job.
    Active {
        queue: String,
        job_id: JobId,
        name: String,
    },
    /// The handler reported progress.
    Progress {
        queue: String,
        job_id: JobId,
        progress: u8,
    },
    /// The handler returned a result.
    Completed {
        queue: String,
        job_id: JobId,
        result: JobData,
    },
    /// The handler failed.
    Failed {
        queue: String,
        job_id: JobId,
        reason: String,
    },
    /// The job went back to waiting: its lock went stale or its worker stopped.
    Requeued { queue: String, job_id: JobId },
}

impl WorkerEvent {
    /// Id of the job the event is about.
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Active { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Requeued { job_id, .. } => *job_id,
        }
    }
}

/// Receives worker events.
///
/// Listeners run inline on the worker slot, so they should return quickly.
pub trait WorkerListener: Send + Sync {
    fn on_event(&self, event: &WorkerEvent);
}

impl<F> WorkerListener for F
where
    F: Fn(&WorkerEvent) + Send + Sync,
{
    fn on_event(&self, event: &WorkerEvent) {
        self(event)
    }
}

/// Writes each event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl WorkerListener for LoggingListener {
    fn on_event(&self, event: &WorkerEvent) {
        match event {
            WorkerEvent::Active { queue, job_id, name } => {
                info!(queue = %queue, job_id = %job_id, name = %name, "Job is now active");
            }
            WorkerEvent::Progress {
                queue,
                job_id,
                progress,
            } => {
                info!(queue = %queue, job_id = %job_id, progress, "Job progress");
            }
            WorkerEvent::Completed { queue, job_id, .. } => {
                info!(queue = %queue, job_id = %job_id, "Job completed");
            }
            WorkerEvent::Failed {
                queue,
                job_id,
                reason,
            } => {
                error!(queue = %queue, job_id = %job_id, reason = %reason, "Job failed");
            }
            WorkerEvent::Requeued { queue, job_id } => {
                warn!(queue = %queue, job_id = %job_id, "Job returned to the queue");
            }
        }
    }
}
