//! Typed job payloads.

use chrono::{DateTime, Utc};
use newsdesk_queue::{JobPayload, QueueError, QueueName, QueueResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn require_username(username: &str) -> QueueResult<()> {
    if username.trim().is_empty() {
        return Err(QueueError::Validation("username is required".to_string()));
    }
    Ok(())
}

/// Payload of a general task: whatever the client posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl TaskPayload {
    /// Wrap client data, stamped now.
    pub fn new(data: Value) -> Self {
        Self {
            data,
            timestamp: Utc::now(),
        }
    }
}

impl JobPayload for TaskPayload {
    const JOB_NAME: &'static str = "process-task";
}

/// Payload naming a user, used for embedding jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserJobPayload {
    pub username: String,
    pub timestamp: DateTime<Utc>,
}

impl UserJobPayload {
    /// Build a payload, rejecting an empty username.
    pub fn new(username: impl Into<String>) -> QueueResult<Self> {
        let payload = Self {
            username: username.into(),
            timestamp: Utc::now(),
        };
        payload.validate()?;
        Ok(payload)
    }
}

impl JobPayload for UserJobPayload {
    const JOB_NAME: &'static str = "process-embedding";

    fn validate(&self) -> QueueResult<()> {
        require_username(&self.username)
    }
}

/// Similarity search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilaritySearchPayload {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl SimilaritySearchPayload {
    /// Build a payload, rejecting an empty username.
    pub fn new(
        username: impl Into<String>,
        query: Option<String>,
        limit: Option<usize>,
    ) -> QueueResult<Self> {
        let payload = Self {
            username: username.into(),
            query,
            limit,
        };
        payload.validate()?;
        Ok(payload)
    }
}

impl JobPayload for SimilaritySearchPayload {
    const JOB_NAME: &'static str = "similarity-search";

    fn validate(&self) -> QueueResult<()> {
        require_username(&self.username)?;
        if self.limit == Some(0) {
            return Err(QueueError::Validation("limit must be positive".to_string()));
        }
        Ok(())
    }
}

/// Newsletter generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsletterPayload {
    pub username: String,
    /// Overrides the user's stored prompt when non-empty.
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl NewsletterPayload {
    /// Build a payload, rejecting an empty username.
    pub fn new(
        username: impl Into<String>,
        prompt: impl Into<String>,
        model: Option<String>,
    ) -> QueueResult<Self> {
        let payload = Self {
            username: username.into(),
            prompt: prompt.into(),
            model,
        };
        payload.validate()?;
        Ok(payload)
    }
}

impl JobPayload for NewsletterPayload {
    const JOB_NAME: &'static str = "generate-newsletter";

    fn validate(&self) -> QueueResult<()> {
        require_username(&self.username)
    }
}

/// Queue each payload type is enqueued on.
pub fn queue_for<P: JobPayload>() -> Option<QueueName> {
    QueueName::ALL
        .into_iter()
        .find(|queue| queue.job_name() == P::JOB_NAME)
}
