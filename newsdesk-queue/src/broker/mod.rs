//! Durable job storage.
//!
//! A [`Broker`] owns the authoritative copy of every job. Producers add
//! jobs, worker slots claim them, and status queries read them back; all
//! three may live in different processes as long as they share a broker.

mod memory;
mod redis;

pub use self::memory::MemoryBroker;
pub use self::redis::{RedisBroker, RedisBrokerConfig};

use crate::error::QueueResult;
use crate::job::{Job, JobData, JobId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of jobs per state on one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Storage backend for queues.
///
/// Every operation is atomic with respect to a single job: a claimed job is
/// handed to exactly one caller, and terminal transitions happen once.
///
/// Claiming takes a lock on the job that its worker refreshes with
/// [`heartbeat`](Broker::heartbeat). Jobs whose lock is older than the lock
/// timeout are handed out again by [`recover_stalled`](Broker::recover_stalled),
/// which makes delivery at-least-once.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Store a new waiting job and return it with its issued id.
    async fn add(&self, queue: &str, name: &str, data: JobData) -> QueueResult<Job>;

    /// Take the oldest waiting job and mark it active.
    async fn claim(&self, queue: &str) -> QueueResult<Option<Job>>;

    /// Refresh the lock of an active job. Jobs that are no longer active are left alone.
    async fn heartbeat(&self, queue: &str, id: JobId) -> QueueResult<()>;

    /// Return an unfinished active job to the head of the queue without
    /// counting the attempt.
    async fn release(&self, queue: &str, id: JobId) -> QueueResult<Job>;

    /// Return active jobs whose lock is older than `lock_timeout` to the head
    /// of the queue, returning their ids.
    async fn recover_stalled(&self, queue: &str, lock_timeout: Duration)
    -> QueueResult<Vec<JobId>>;

    /// Raise the progress of an active job, returning the stored value.
    async fn update_progress(&self, queue: &str, id: JobId, progress: u8) -> QueueResult<u8>;

    /// Mark an active job completed.
    async fn complete(&self, queue: &str, id: JobId, result: JobData) -> QueueResult<Job>;

    /// Mark an active job failed.
    async fn fail(&self, queue: &str, id: JobId, reason: &str) -> QueueResult<Job>;

    /// Look up a job; `None` when unknown or expired.
    async fn get_job(&self, queue: &str, id: JobId) -> QueueResult<Option<Job>>;

    /// Count jobs per state.
    async fn counts(&self, queue: &str) -> QueueResult<JobCounts>;

    /// Release broker resources.
    async fn close(&self) -> QueueResult<()>;
}
