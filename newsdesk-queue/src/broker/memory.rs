//! In-process broker for tests and single-binary development runs.

use super::{Broker, JobCounts};
use crate::error::{QueueError, QueueResult};
use crate::job::{Job, JobData, JobId, JobState};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Default)]
struct QueueSlot {
    next_id: u64,
    waiting: VecDeque<JobId>,
    jobs: HashMap<JobId, Job>,
    /// Last claim or heartbeat of each active job
    locks: HashMap<JobId, Instant>,
}

impl QueueSlot {
    fn job_mut(&mut self, id: JobId) -> QueueResult<&mut Job> {
        self.jobs
            .get_mut(&id)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))
    }
}

/// Broker that keeps every queue in memory.
///
/// Clones share the same storage. After [`Broker::close`] every operation
/// fails with [`QueueError::BrokerUnavailable`].
#[derive(Clone, Default)]
pub struct MemoryBroker {
    queues: Arc<Mutex<HashMap<String, QueueSlot>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> QueueResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::BrokerUnavailable("broker closed".to_string()));
        }
        Ok(())
    }

    fn with_slot<T>(
        &self,
        queue: &str,
        id: JobId,
        f: impl FnOnce(&mut QueueSlot) -> QueueResult<T>,
    ) -> QueueResult<T> {
        self.ensure_open()?;
        let mut queues = self.queues.lock();
        let slot = queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        f(slot)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn add(&self, queue: &str, name: &str, data: JobData) -> QueueResult<Job> {
        self.ensure_open()?;
        let mut queues = self.queues.lock();
        let slot = queues.entry(queue.to_string()).or_default();
        slot.next_id += 1;

        let job = Job::new(JobId::new(slot.next_id), queue, name, data);
        slot.waiting.push_back(job.id);
        slot.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn claim(&self, queue: &str) -> QueueResult<Option<Job>> {
        self.ensure_open()?;
        let mut queues = self.queues.lock();
        let Some(slot) = queues.get_mut(queue) else {
            return Ok(None);
        };

        while let Some(id) = slot.waiting.pop_front() {
            if let Some(job) = slot.jobs.get_mut(&id) {
                job.activate()?;
                let job = job.clone();
                slot.locks.insert(id, Instant::now());
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    async fn heartbeat(&self, queue: &str, id: JobId) -> QueueResult<()> {
        self.with_slot(queue, id, |slot| {
            if slot.job_mut(id)?.state == JobState::Active {
                slot.locks.insert(id, Instant::now());
            }
            Ok(())
        })
    }

    async fn release(&self, queue: &str, id: JobId) -> QueueResult<Job> {
        self.with_slot(queue, id, |slot| {
            let job = slot.job_mut(id)?;
            job.release()?;
            let job = job.clone();
            slot.locks.remove(&id);
            slot.waiting.push_front(id);
            Ok(job)
        })
    }

    async fn recover_stalled(
        &self,
        queue: &str,
        lock_timeout: Duration,
    ) -> QueueResult<Vec<JobId>> {
        self.ensure_open()?;
        let mut queues = self.queues.lock();
        let Some(slot) = queues.get_mut(queue) else {
            return Ok(Vec::new());
        };
        let Some(cutoff) = Instant::now().checked_sub(lock_timeout) else {
            return Ok(Vec::new());
        };

        let mut stalled: Vec<JobId> = slot
            .locks
            .iter()
            .filter(|(_, locked_at)| **locked_at <= cutoff)
            .map(|(id, _)| *id)
            .collect();
        stalled.sort();

        // Oldest ends up at the head of the queue.
        for id in stalled.iter().rev() {
            slot.locks.remove(id);
            slot.job_mut(*id)?.requeue()?;
            slot.waiting.push_front(*id);
        }
        Ok(stalled)
    }

    async fn update_progress(&self, queue: &str, id: JobId, progress: u8) -> QueueResult<u8> {
        self.with_slot(queue, id, |slot| {
            let job = slot.job_mut(id)?;
            job.update_progress(progress)?;
            Ok(job.progress)
        })
    }

    async fn complete(&self, queue: &str, id: JobId, result: JobData) -> QueueResult<Job> {
        self.with_slot(queue, id, |slot| {
            let job = slot.job_mut(id)?;
            job.complete(result)?;
            let job = job.clone();
            slot.locks.remove(&id);
            Ok(job)
        })
    }

    async fn fail(&self, queue: &str, id: JobId, reason: &str) -> QueueResult<Job> {
        self.with_slot(queue, id, |slot| {
            let job = slot.job_mut(id)?;
            job.fail(reason)?;
            let job = job.clone();
            slot.locks.remove(&id);
            Ok(job)
        })
    }

    async fn get_job(&self, queue: &str, id: JobId) -> QueueResult<Option<Job>> {
        self.ensure_open()?;
        let queues = self.queues.lock();
        Ok(queues.get(queue).and_then(|slot| slot.jobs.get(&id)).cloned())
    }

    async fn counts(&self, queue: &str) -> QueueResult<JobCounts> {
        self.ensure_open()?;
        let queues = self.queues.lock();
        let mut counts = JobCounts::default();
        if let Some(slot) = queues.get(queue) {
            for job in slot.jobs.values() {
                match job.state {
                    JobState::Waiting => counts.waiting += 1,
                    JobState::Active => counts.active += 1,
                    JobState::Completed => counts.completed += 1,
                    JobState::Failed => counts.failed += 1,
                }
            }
        }
        Ok(counts)
    }

    async fn close(&self) -> QueueResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
