//! Job records and lifecycle.

use crate::error::{QueueError, QueueResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque payload carried by a job.
pub type JobData = serde_json::Value;

/// Broker-issued job identifier, unique within a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct JobId(u64);

impl JobId {
    /// Wrap a raw counter value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw counter value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| QueueError::JobNotFound(s.to_string()))
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for JobId {
    type Error = QueueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Lifecycle state of a job.
///
/// `waiting → active → completed | failed`. An active job may also go back
/// to `waiting` when its worker stops or stalls; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Enqueued, not yet claimed by a worker
    Waiting,
    /// Claimed and running
    Active,
    /// Handler returned a result
    Completed,
    /// Handler raised an error
    Failed,
}

impl JobState {
    /// Whether the job has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Lower-case name as reported by status queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The named queues served by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueName {
    /// Generic demonstration tasks
    Tasks,
    /// Article embedding computation
    Embeddings,
    /// Similarity search over stored embeddings
    SimilaritySearch,
    /// Newsletter generation
    Newsletter,
}

impl QueueName {
    /// Every queue, in startup order.
    pub const ALL: [QueueName; 4] = [
        Self::Tasks,
        Self::Embeddings,
        Self::SimilaritySearch,
        Self::Newsletter,
    ];

    /// Broker-facing queue name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Embeddings => "embeddings",
            Self::SimilaritySearch => "similarity-search",
            Self::Newsletter => "newsletter",
        }
    }

    /// Name of the jobs enqueued on this queue.
    pub fn job_name(&self) -> &'static str {
        match self {
            Self::Tasks => "process-task",
            Self::Embeddings => "process-embedding",
            Self::SimilaritySearch => "similarity-search",
            Self::Newsletter => "generate-newsletter",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| QueueError::Validation(format!("unknown queue: {s}")))
    }
}

/// A typed job payload.
///
/// Implementors name the job they belong to and check their own required
/// fields before anything reaches the broker.
pub trait JobPayload: Serialize + DeserializeOwned + Send + Sync {
    /// Job name under which the payload is enqueued.
    const JOB_NAME: &'static str;

    /// Reject payloads that are missing required fields.
    fn validate(&self) -> QueueResult<()> {
        Ok(())
    }
}

/// A unit of work tracked by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Broker-issued identifier
    pub id: JobId,

    /// Queue the job lives on
    pub queue: String,

    /// Job name, selects the handler
    pub name: String,

    /// Payload, immutable after enqueue
    pub data: JobData,

    /// Current state
    pub state: JobState,

    /// Progress percentage (0-100), never decreases
    pub progress: u8,

    /// Handler result once completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobData>,

    /// Failure reason once failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,

    /// When the job was enqueued
    pub enqueued_at: DateTime<Utc>,

    /// When a worker claimed the job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Number of times a worker has claimed the job
    #[serde(default)]
    pub attempts_made: u32,
}

impl Job {
    /// Create a waiting job.
    pub fn new(id: JobId, queue: impl Into<String>, name: impl Into<String>, data: JobData) -> Self {
        Self {
            id,
            queue: queue.into(),
            name: name.into(),
            data,
            state: JobState::Waiting,
            progress: 0,
            result: None,
            failed_reason: None,
            enqueued_at: Utc::now(),
            processed_at: None,
            finished_at: None,
            attempts_made: 0,
        }
    }

    /// Decode the payload into a typed value.
    pub fn payload<P: DeserializeOwned>(&self) -> QueueResult<P> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| QueueError::Deserialization(format!("job {} payload: {}", self.id, e)))
    }

    /// Move from waiting to active.
    pub fn activate(&mut self) -> QueueResult<()> {
        self.transition(JobState::Active)?;
        self.processed_at = Some(Utc::now());
        self.attempts_made += 1;
        Ok(())
    }

    /// Record a result and move to completed.
    pub fn complete(&mut self, result: JobData) -> QueueResult<()> {
        self.transition(JobState::Completed)?;
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Record a failure reason and move to failed.
    pub fn fail(&mut self, reason: impl Into<String>) -> QueueResult<()> {
        self.transition(JobState::Failed)?;
        self.failed_reason = Some(reason.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Put an active job back to waiting, keeping the attempt counted.
    ///
    /// Used when the worker holding the job stopped heartbeating.
    pub fn requeue(&mut self) -> QueueResult<()> {
        self.transition(JobState::Waiting)
    }

    /// Put an active job back to waiting as if it had never been claimed.
    ///
    /// Used when a worker shuts down with the job unfinished.
    pub fn release(&mut self) -> QueueResult<()> {
        self.transition(JobState::Waiting)?;
        self.attempts_made = self.attempts_made.saturating_sub(1);
        Ok(())
    }

    /// Raise progress, clamped to 100.
    ///
    /// Lower values are ignored. Returns whether the stored value changed.
    pub fn update_progress(&mut self, progress: u8) -> QueueResult<bool> {
        if self.state != JobState::Active {
            return Err(QueueError::InvalidTransition {
                from: self.state,
                to: JobState::Active,
            });
        }

        let progress = progress.min(100);
        if progress <= self.progress {
            return Ok(false);
        }
        self.progress = progress;
        Ok(true)
    }

    /// Snapshot for status queries.
    pub fn status(&self) -> JobStatus {
        JobStatus {
            job_id: self.id,
            queue: self.queue.clone(),
            name: self.name.clone(),
            state: self.state,
            progress: self.progress,
            data: self.data.clone(),
            result: self.result.clone(),
            failed_reason: self.failed_reason.clone(),
            enqueued_at: self.enqueued_at,
            processed_at: self.processed_at,
            finished_at: self.finished_at,
            attempts_made: self.attempts_made,
        }
    }

    fn transition(&mut self, to: JobState) -> QueueResult<()> {
        let allowed = matches!(
            (self.state, to),
            (JobState::Waiting, JobState::Active)
                | (JobState::Active, JobState::Waiting)
                | (JobState::Active, JobState::Completed)
                | (JobState::Active, JobState::Failed)
        );
        if !allowed {
            return Err(QueueError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

/// Read-only view of a job for status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: JobId,
    pub queue: String,
    pub name: String,
    pub state: JobState,
    pub progress: u8,
    pub data: JobData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub attempts_made: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> Job {
        Job::new(JobId::new(7), "tasks", "process-task", json!({"n": 1}))
    }

    #[test]
    fn test_job_creation() {
        let job = job();
        assert_eq!(job.id.get(), 7);
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.progress, 0);
        assert_eq!(job.attempts_made, 0);
        assert!(job.processed_at.is_none());
    }

    #[test]
    fn test_lifecycle_moves_forward_only() {
        let mut job = job();
        assert!(job.complete(json!(1)).is_err());

        job.activate().unwrap();
        assert_eq!(job.state, JobState::Active);
        assert_eq!(job.attempts_made, 1);
        assert!(job.processed_at.is_some());

        job.complete(json!({"ok": true})).unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert!(job.finished_at.is_some());

        assert!(job.fail("late").is_err());
        assert!(job.activate().is_err());
        assert_eq!(job.state, JobState::Completed);
    }

    #[test]
    fn test_requeue_and_release_return_active_jobs_to_waiting() {
        let mut job = job();
        assert!(job.requeue().is_err());

        job.activate().unwrap();
        job.update_progress(40).unwrap();
        job.requeue().unwrap();
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.attempts_made, 1);
        assert_eq!(job.progress, 40);

        job.activate().unwrap();
        assert_eq!(job.attempts_made, 2);
        job.release().unwrap();
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.attempts_made, 1);

        job.activate().unwrap();
        job.complete(json!(null)).unwrap();
        assert!(job.requeue().is_err());
        assert!(job.release().is_err());
    }

    #[test]
    fn test_fail_records_reason() {
        let mut job = job();
        job.activate().unwrap();
        job.fail("User not found: bob").unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.failed_reason.as_deref(), Some("User not found: bob"));
        assert!(job.result.is_none());
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let mut job = job();
        assert!(job.update_progress(10).is_err());

        job.activate().unwrap();
        assert!(job.update_progress(30).unwrap());
        assert!(!job.update_progress(20).unwrap());
        assert_eq!(job.progress, 30);
        assert!(!job.update_progress(30).unwrap());
        assert!(job.update_progress(250).unwrap());
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_job_id_parsing() {
        assert_eq!("42".parse::<JobId>().unwrap(), JobId::new(42));
        assert!(matches!(
            "abc".parse::<JobId>(),
            Err(QueueError::JobNotFound(_))
        ));
        assert_eq!(serde_json::to_value(JobId::new(3)).unwrap(), json!("3"));
    }

    #[test]
    fn test_queue_names() {
        assert_eq!(QueueName::SimilaritySearch.as_str(), "similarity-search");
        assert_eq!(QueueName::Newsletter.job_name(), "generate-newsletter");
        assert_eq!("embeddings".parse::<QueueName>().unwrap(), QueueName::Embeddings);
        assert!("nope".parse::<QueueName>().is_err());
    }

    #[test]
    fn test_job_round_trips_through_json() {
        let mut job = job();
        job.activate().unwrap();
        job.update_progress(40).unwrap();

        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = job().status();
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["jobId"], "7");
        assert_eq!(value["state"], "waiting");
        assert!(value.get("failedReason").is_none());
    }
}
