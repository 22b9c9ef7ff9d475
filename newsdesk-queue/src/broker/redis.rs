//! Redis-backed broker.
//!
//! Key layout per queue (`{prefix}:{queue}:…`):
//!
//! - `id` – counter issuing job ids (`INCR`)
//! - `wait` – list of waiting job ids, oldest on the left
//! - `active` – list of claimed job ids
//! - `locks` – sorted set of active ids scored by last claim or heartbeat (ms)
//! - `completed` / `failed` – sorted sets of finished ids scored by finish time
//! - `job:{id}` – JSON job record; finished records expire after the retention time

use super::{Broker, JobCounts};
use crate::error::{QueueError, QueueResult};
use crate::job::{Job, JobData, JobId};
use async_trait::async_trait;
use chrono::Utc;
use newsdesk_redis::{AsyncCommands, ConnectionManager, RedisConfig};
use std::time::Duration;
use tracing::{debug, warn};

/// Move the oldest waiting id to `active` and stamp its lock.
const CLAIM_SCRIPT: &str = r#"
    local id = redis.call('LMOVE', KEYS[1], KEYS[2], 'LEFT', 'RIGHT')
    if id then
        redis.call('ZADD', KEYS[3], ARGV[1], id)
    end
    return id
"#;

/// Put an active id back at the head of `wait` if its lock is not newer than
/// the cutoff. Returns 0 when the job finished or heartbeated in the meantime.
const REQUEUE_SCRIPT: &str = r#"
    local score = redis.call('ZSCORE', KEYS[1], ARGV[1])
    if not score or tonumber(score) > tonumber(ARGV[2]) then
        return 0
    end
    redis.call('ZREM', KEYS[1], ARGV[1])
    if redis.call('LREM', KEYS[2], 1, ARGV[1]) == 0 then
        return 0
    end
    redis.call('SET', KEYS[4], ARGV[3])
    redis.call('LPUSH', KEYS[3], ARGV[1])
    return 1
"#;

/// Redis broker settings.
#[derive(Debug, Clone)]
pub struct RedisBrokerConfig {
    /// Prefix for every key
    pub key_prefix: String,

    /// How long finished jobs remain queryable
    pub retention: Duration,
}

impl Default for RedisBrokerConfig {
    fn default() -> Self {
        Self {
            key_prefix: "newsdesk".to_string(),
            retention: Duration::from_secs(86400),
        }
    }
}

impl RedisBrokerConfig {
    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set how long finished jobs are kept.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

/// Broker storing jobs in Redis.
#[derive(Clone)]
pub struct RedisBroker {
    connection: ConnectionManager,
    config: RedisBrokerConfig,
}

impl RedisBroker {
    /// Wrap an established connection.
    pub fn new(connection: ConnectionManager, config: RedisBrokerConfig) -> Self {
        Self { connection, config }
    }

    /// Connect with backoff and build a broker with default settings.
    pub async fn connect(redis: &RedisConfig) -> QueueResult<Self> {
        let connection = newsdesk_redis::connect(redis).await?;
        Ok(Self::new(connection, RedisBrokerConfig::default()))
    }

    /// Broker settings.
    pub fn config(&self) -> &RedisBrokerConfig {
        &self.config
    }

    fn key(&self, queue: &str, suffix: &str) -> String {
        format!("{}:{}:{}", self.config.key_prefix, queue, suffix)
    }

    fn job_key(&self, queue: &str, id: JobId) -> String {
        self.key(queue, &format!("job:{}", id))
    }

    async fn load(&self, queue: &str, id: JobId) -> QueueResult<Option<Job>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(self.job_key(queue, id)).await?;
        raw.map(|json| {
            serde_json::from_str(&json).map_err(|e| QueueError::Deserialization(e.to_string()))
        })
        .transpose()
    }

    async fn load_existing(&self, queue: &str, id: JobId) -> QueueResult<Job> {
        self.load(queue, id)
            .await?
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))
    }

    async fn store(&self, job: &Job) -> QueueResult<()> {
        let json =
            serde_json::to_string(job).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let mut conn = self.connection.clone();
        let _: () = conn.set(self.job_key(&job.queue, job.id), json).await?;
        Ok(())
    }

    /// Persist a terminal job and move its id out of the active list.
    async fn finish(&self, job: &Job, set: &str) -> QueueResult<()> {
        let json =
            serde_json::to_string(job).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let id = job.id.to_string();
        let mut conn = self.connection.clone();

        let _: () = redis::pipe()
            .atomic()
            .set_ex(
                self.job_key(&job.queue, job.id),
                json,
                self.config.retention.as_secs().max(1),
            )
            .ignore()
            .lrem(self.key(&job.queue, "active"), 0, &id)
            .ignore()
            .zrem(self.key(&job.queue, "locks"), &id)
            .ignore()
            .zadd(self.key(&job.queue, set), &id, Utc::now().timestamp())
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Write `job` back to waiting if its lock is at most `cutoff` ms.
    async fn requeue_if_stale(&self, job: &Job, cutoff: i64) -> QueueResult<bool> {
        let json =
            serde_json::to_string(job).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let mut conn = self.connection.clone();
        let moved: i32 = redis::Script::new(REQUEUE_SCRIPT)
            .key(self.key(&job.queue, "locks"))
            .key(self.key(&job.queue, "active"))
            .key(self.key(&job.queue, "wait"))
            .key(self.job_key(&job.queue, job.id))
            .arg(job.id.to_string())
            .arg(cutoff)
            .arg(json)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved == 1)
    }

    /// Remove an id that has no usable record from `active` and `locks`.
    async fn forget(&self, queue: &str, raw: &str) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let _: () = redis::pipe()
            .atomic()
            .lrem(self.key(queue, "active"), 1, raw)
            .ignore()
            .zrem(self.key(queue, "locks"), raw)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Drop finished ids whose records have expired.
    async fn prune(&self, queue: &str) -> QueueResult<()> {
        let cutoff = Utc::now().timestamp() - self.config.retention.as_secs() as i64;
        let mut conn = self.connection.clone();
        let _: () = redis::pipe()
            .zrembyscore(self.key(queue, "completed"), "-inf", cutoff)
            .ignore()
            .zrembyscore(self.key(queue, "failed"), "-inf", cutoff)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn add(&self, queue: &str, name: &str, data: JobData) -> QueueResult<Job> {
        let mut conn = self.connection.clone();
        let id: u64 = conn.incr(self.key(queue, "id"), 1).await?;
        let job = Job::new(JobId::new(id), queue, name, data);

        let json =
            serde_json::to_string(&job).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let _: () = redis::pipe()
            .atomic()
            .set(self.job_key(queue, job.id), json)
            .ignore()
            .rpush(self.key(queue, "wait"), job.id.to_string())
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(queue, job_id = %job.id, name, "Job stored");
        Ok(job)
    }

    async fn claim(&self, queue: &str) -> QueueResult<Option<Job>> {
        let mut conn = self.connection.clone();
        let wait = self.key(queue, "wait");
        let active = self.key(queue, "active");
        let locks = self.key(queue, "locks");

        loop {
            // LMOVE hands each id to exactly one caller.
            let raw: Option<String> = redis::Script::new(CLAIM_SCRIPT)
                .key(&wait)
                .key(&active)
                .key(&locks)
                .arg(Utc::now().timestamp_millis())
                .invoke_async(&mut conn)
                .await?;

            let Some(raw) = raw else {
                return Ok(None);
            };

            let Ok(id) = raw.parse::<JobId>() else {
                warn!(queue, raw = %raw, "Dropping malformed job id");
                self.forget(queue, &raw).await?;
                continue;
            };

            let Some(mut job) = self.load(queue, id).await? else {
                warn!(queue, job_id = %id, "Dropping id with no stored record");
                self.forget(queue, &raw).await?;
                continue;
            };

            job.activate()?;
            self.store(&job).await?;
            return Ok(Some(job));
        }
    }

    async fn heartbeat(&self, queue: &str, id: JobId) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        // XX: never resurrect a lock that complete, fail or recovery removed.
        let _: i64 = redis::cmd("ZADD")
            .arg(self.key(queue, "locks"))
            .arg("XX")
            .arg(Utc::now().timestamp_millis())
            .arg(id.to_string())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn release(&self, queue: &str, id: JobId) -> QueueResult<Job> {
        let mut job = self.load_existing(queue, id).await?;
        job.release()?;
        if !self.requeue_if_stale(&job, i64::MAX).await? {
            return Err(QueueError::Broker(format!("job {} is no longer active", id)));
        }
        Ok(job)
    }

    async fn recover_stalled(
        &self,
        queue: &str,
        lock_timeout: Duration,
    ) -> QueueResult<Vec<JobId>> {
        let cutoff = Utc::now().timestamp_millis() - lock_timeout.as_millis() as i64;
        let mut conn = self.connection.clone();
        let stale: Vec<String> = conn
            .zrangebyscore(self.key(queue, "locks"), "-inf", cutoff)
            .await?;

        let mut recovered = Vec::new();
        for raw in stale {
            let Ok(id) = raw.parse::<JobId>() else {
                self.forget(queue, &raw).await?;
                continue;
            };
            let Some(mut job) = self.load(queue, id).await? else {
                self.forget(queue, &raw).await?;
                continue;
            };
            // Finished between the range read and now.
            if job.requeue().is_err() {
                continue;
            }
            if self.requeue_if_stale(&job, cutoff).await? {
                recovered.push(id);
            }
        }
        Ok(recovered)
    }

    async fn update_progress(&self, queue: &str, id: JobId, progress: u8) -> QueueResult<u8> {
        let mut job = self.load_existing(queue, id).await?;
        if job.update_progress(progress)? {
            self.store(&job).await?;
        }
        Ok(job.progress)
    }

    async fn complete(&self, queue: &str, id: JobId, result: JobData) -> QueueResult<Job> {
        let mut job = self.load_existing(queue, id).await?;
        job.complete(result)?;
        self.finish(&job, "completed").await?;
        Ok(job)
    }

    async fn fail(&self, queue: &str, id: JobId, reason: &str) -> QueueResult<Job> {
        let mut job = self.load_existing(queue, id).await?;
        job.fail(reason)?;
        self.finish(&job, "failed").await?;
        Ok(job)
    }

    async fn get_job(&self, queue: &str, id: JobId) -> QueueResult<Option<Job>> {
        self.load(queue, id).await
    }

    async fn counts(&self, queue: &str) -> QueueResult<JobCounts> {
        self.prune(queue).await?;

        let mut conn = self.connection.clone();
        let (waiting, active, completed, failed): (u64, u64, u64, u64) = redis::pipe()
            .llen(self.key(queue, "wait"))
            .llen(self.key(queue, "active"))
            .zcard(self.key(queue, "completed"))
            .zcard(self.key(queue, "failed"))
            .query_async(&mut conn)
            .await?;

        Ok(JobCounts {
            waiting,
            active,
            completed,
            failed,
        })
    }

    async fn close(&self) -> QueueResult<()> {
        // The connection manager closes once its last clone is dropped.
        debug!(prefix = %self.config.key_prefix, "Redis broker closed");
        Ok(())
    }
}
