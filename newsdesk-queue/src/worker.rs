//! Worker pool for processing jobs.

use crate::broker::Broker;
use crate::error::{QueueError, QueueResult};
use crate::events::{LoggingListener, WorkerEvent, WorkerListener};
use crate::job::{Job, JobData, JobId};
use crate::queue::Queue;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

/// Job handler function type.
pub type JobHandler = Arc<
    dyn Fn(Job, JobProgress) -> Pin<Box<dyn Future<Output = QueueResult<JobData>> + Send>>
        + Send
        + Sync,
>;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of jobs processed at once
    pub concurrency: usize,

    /// Poll interval when the queue is empty
    pub poll_interval: Duration,

    /// How long `stop` waits for in-flight jobs
    pub drain_timeout: Duration,

    /// Age after which an unrefreshed claim counts as stalled
    pub lock_timeout: Duration,

    /// How often held jobs are refreshed and stalled ones swept
    pub heartbeat_interval: Duration,

    /// Whether to log job events
    pub log_execution: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(30),
            lock_timeout: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(30),
            log_execution: true,
        }
    }
}

impl WorkerConfig {
    /// Set concurrency (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the empty-queue poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the drain timeout used by `stop`.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Set how long a claim may go without a heartbeat before it is recovered.
    ///
    /// Keep this well above the heartbeat interval.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Set the heartbeat and recovery sweep interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Enable or disable the built-in logging listener.
    pub fn with_log_execution(mut self, enabled: bool) -> Self {
        self.log_execution = enabled;
        self
    }
}

type Listeners = Arc<Vec<Arc<dyn WorkerListener>>>;

fn emit(listeners: &Listeners, event: WorkerEvent) {
    for listener in listeners.iter() {
        listener.on_event(&event);
    }
}

/// Progress reporter handed to each handler invocation.
///
/// Reports are monotonic: values at or below the last stored value are
/// dropped without touching the broker.
#[derive(Clone)]
pub struct JobProgress {
    queue: String,
    job_id: JobId,
    broker: Arc<dyn Broker>,
    listeners: Listeners,
    last: Arc<AtomicU8>,
}

impl JobProgress {
    fn new(job: &Job, broker: Arc<dyn Broker>, listeners: Listeners) -> Self {
        Self {
            queue: job.queue.clone(),
            job_id: job.id,
            broker,
            listeners,
            last: Arc::new(AtomicU8::new(job.progress)),
        }
    }

    /// Report progress as a percentage; values above 100 are clamped.
    pub async fn update(&self, percent: u8) -> QueueResult<()> {
        let percent = percent.min(100);
        if percent <= self.last.load(Ordering::Acquire) {
            return Ok(());
        }

        let stored = self
            .broker
            .update_progress(&self.queue, self.job_id, percent)
            .await?;
        self.last.fetch_max(stored, Ordering::AcqRel);

        emit(
            &self.listeners,
            WorkerEvent::Progress {
                queue: self.queue.clone(),
                job_id: self.job_id,
                progress: stored,
            },
        );
        Ok(())
    }

    /// Last reported progress.
    pub fn current(&self) -> u8 {
        self.last.load(Ordering::Acquire)
    }

    /// Id of the job being reported on.
    pub fn job_id(&self) -> JobId {
        self.job_id
    }
}

/// Ids of jobs claimed by this worker and not yet finished.
type Held = Arc<Mutex<HashSet<JobId>>>;

struct SlotContext {
    queue: Queue,
    handlers: Arc<HashMap<String, JobHandler>>,
    listeners: Listeners,
    poll_interval: Duration,
    held: Held,
}

/// Cancels the handler task when the owning slot is dropped or aborted.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Worker for processing jobs from a queue.
///
/// Runs `concurrency` slots; each slot claims one job at a time, so at most
/// `concurrency` handlers execute simultaneously. Handler failures are final:
/// there are no retries and no per-job timeouts.
///
/// A background task refreshes the lock of every held job each
/// `heartbeat_interval` and hands claims older than `lock_timeout` back to
/// the queue, so jobs of a crashed worker are eventually run again.
pub struct Worker {
    queue: Queue,
    handlers: HashMap<String, JobHandler>,
    listeners: Vec<Arc<dyn WorkerListener>>,
    config: WorkerConfig,
    shutdown: Option<watch::Sender<bool>>,
    held: Held,
    context: Option<Arc<SlotContext>>,
    handles: Vec<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl Worker {
    /// Create a new worker.
    pub fn new(queue: Queue) -> Self {
        Self::with_config(queue, WorkerConfig::default())
    }

    /// Create a worker with custom configuration.
    pub fn with_config(queue: Queue, config: WorkerConfig) -> Self {
        Self {
            queue,
            handlers: HashMap::new(),
            listeners: Vec::new(),
            config,
            shutdown: None,
            held: Arc::new(Mutex::new(HashSet::new())),
            context: None,
            handles: Vec::new(),
            heartbeat: None,
        }
    }

    /// Register a job handler.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use newsdesk_queue::*;
    /// use std::sync::Arc;
    ///
    /// let queue = Queue::named(QueueName::Tasks, Arc::new(MemoryBroker::new()));
    /// let mut worker = Worker::new(queue);
    ///
    /// worker.register_handler("process-task", |job, progress| async move {
    ///     progress.update(50).await?;
    ///     Ok(serde_json::json!({ "echo": job.data }))
    /// });
    /// ```
    pub fn register_handler<F, Fut>(&mut self, job_name: impl Into<String>, handler: F)
    where
        F: Fn(Job, JobProgress) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueueResult<JobData>> + Send + 'static,
    {
        let wrapped: JobHandler = Arc::new(
            move |job: Job,
                  progress: JobProgress|
                  -> Pin<Box<dyn Future<Output = QueueResult<JobData>> + Send>> {
                Box::pin(handler(job, progress))
            },
        );
        self.handlers.insert(job_name.into(), wrapped);
    }

    /// Add a lifecycle listener. Takes effect on the next `start`.
    pub fn subscribe(&mut self, listener: Arc<dyn WorkerListener>) {
        self.listeners.push(listener);
    }

    /// Queue this worker consumes.
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Whether the slots are running.
    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Number of claimed jobs not yet finished.
    pub fn in_flight(&self) -> usize {
        self.held.lock().len()
    }

    /// Start the worker.
    pub async fn start(&mut self) -> QueueResult<()> {
        if self.shutdown.is_some() {
            return Err(QueueError::WorkerAlreadyRunning);
        }

        let mut listeners = self.listeners.clone();
        if self.config.log_execution {
            listeners.insert(0, Arc::new(LoggingListener));
        }

        let (tx, rx) = watch::channel(false);
        let context = Arc::new(SlotContext {
            queue: self.queue.clone(),
            handlers: Arc::new(self.handlers.clone()),
            listeners: Arc::new(listeners),
            poll_interval: self.config.poll_interval,
            held: self.held.clone(),
        });

        info!(
            queue = %self.queue.name(),
            concurrency = self.config.concurrency,
            "Worker starting"
        );

        for slot in 0..self.config.concurrency.max(1) {
            let context = context.clone();
            let shutdown = rx.clone();
            self.handles
                .push(tokio::spawn(run_slot(slot, context, shutdown)));
        }
        self.heartbeat = Some(tokio::spawn(run_heartbeat(
            context.clone(),
            self.config.lock_timeout,
            self.config.heartbeat_interval,
        )));

        self.context = Some(context);
        self.shutdown = Some(tx);
        Ok(())
    }

    /// Stop claiming new jobs and wait for in-flight ones.
    ///
    /// Slots still busy after the drain timeout are aborted together with
    /// their handlers, and the jobs they held go back to waiting without the
    /// attempt being counted.
    pub async fn stop(&mut self) -> QueueResult<()> {
        let Some(shutdown) = self.shutdown.take() else {
            return Err(QueueError::WorkerNotRunning);
        };
        let _ = shutdown.send(true);

        info!(queue = %self.queue.name(), "Worker stopping");

        let deadline = tokio::time::Instant::now() + self.config.drain_timeout;
        let mut abandoned = 0;
        for mut handle in self.handles.drain(..) {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
                // Resolves once the slot future, and with it the handler, is gone.
                let _ = handle.await;
                abandoned += 1;
            }
        }

        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
            let _ = heartbeat.await;
        }

        if let Some(context) = self.context.take() {
            self.release_held(&context).await;
        }

        if abandoned > 0 {
            warn!(
                queue = %self.queue.name(),
                abandoned,
                "Drain timeout elapsed, aborted busy slots"
            );
        } else {
            info!(queue = %self.queue.name(), "Worker stopped");
        }
        Ok(())
    }

    /// Hand every job still held back to the queue.
    async fn release_held(&self, context: &SlotContext) {
        let held: Vec<JobId> = context.held.lock().drain().collect();
        let queue_name = self.queue.name();

        for job_id in held {
            match self.queue.broker().release(queue_name, job_id).await {
                Ok(_) => emit(
                    &context.listeners,
                    WorkerEvent::Requeued {
                        queue: queue_name.to_string(),
                        job_id,
                    },
                ),
                Err(e) => {
                    warn!(queue = %queue_name, job_id = %job_id, error = %e, "Failed to release job")
                }
            }
        }
    }

    /// Run until `signal` resolves, then stop gracefully.
    pub async fn run_until<S>(mut self, signal: S) -> QueueResult<()>
    where
        S: Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        self.stop().await
    }
}

async fn run_slot(slot: usize, context: Arc<SlotContext>, mut shutdown: watch::Receiver<bool>) {
    let queue_name = context.queue.name().to_string();

    while !*shutdown.borrow() {
        match context.queue.broker().claim(&queue_name).await {
            Ok(Some(job)) => process(slot, &context, job).await,
            Ok(None) => {
                if !idle(context.poll_interval, &mut shutdown).await {
                    break;
                }
            }
            Err(e) => {
                error!(queue = %queue_name, slot, error = %e, "Error claiming job");
                if !idle(context.poll_interval, &mut shutdown).await {
                    break;
                }
            }
        }
    }

    debug!(queue = %queue_name, slot, "Worker slot stopped");
}

/// Refresh held locks, then requeue claims nobody refreshed in time.
async fn run_heartbeat(context: Arc<SlotContext>, lock_timeout: Duration, interval: Duration) {
    let queue_name = context.queue.name().to_string();
    let broker = context.queue.broker().clone();

    loop {
        let held: Vec<JobId> = context.held.lock().iter().copied().collect();
        for job_id in held {
            if let Err(e) = broker.heartbeat(&queue_name, job_id).await {
                warn!(queue = %queue_name, job_id = %job_id, error = %e, "Heartbeat failed");
            }
        }

        match broker.recover_stalled(&queue_name, lock_timeout).await {
            Ok(recovered) => {
                for job_id in recovered {
                    emit(
                        &context.listeners,
                        WorkerEvent::Requeued {
                            queue: queue_name.clone(),
                            job_id,
                        },
                    );
                }
            }
            Err(e) => error!(queue = %queue_name, error = %e, "Error recovering stalled jobs"),
        }

        tokio::time::sleep(interval).await;
    }
}

/// Wait out the poll interval; false if the worker handle is gone.
async fn idle(poll_interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(poll_interval) => true,
        changed = shutdown.changed() => changed.is_ok(),
    }
}

async fn process(slot: usize, context: &SlotContext, job: Job) {
    let broker = context.queue.broker().clone();
    let queue_name = job.queue.clone();
    let job_id = job.id;

    emit(
        &context.listeners,
        WorkerEvent::Active {
            queue: queue_name.clone(),
            job_id,
            name: job.name.clone(),
        },
    );

    context.held.lock().insert(job_id);
    let outcome = match context.handlers.get(&job.name).cloned() {
        Some(handler) => {
            let progress = JobProgress::new(&job, broker.clone(), context.listeners.clone());
            // A panicking handler fails its job instead of killing the slot.
            let task = tokio::spawn(handler(job, progress));
            let _cancel = AbortOnDrop(task.abort_handle());
            match task.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => Err(QueueError::HandlerFailure(panic_message(e))),
                Err(e) => Err(QueueError::HandlerFailure(e.to_string())),
            }
        }
        None => Err(QueueError::NoHandler(job.name.clone())),
    };

    match outcome {
        Ok(result) => match broker.complete(&queue_name, job_id, result.clone()).await {
            Ok(_) => emit(
                &context.listeners,
                WorkerEvent::Completed {
                    queue: queue_name,
                    job_id,
                    result,
                },
            ),
            Err(e) => error!(slot, job_id = %job_id, error = %e, "Failed to mark job as complete"),
        },
        Err(err) => {
            let reason = err.failure_reason();
            match broker.fail(&queue_name, job_id, &reason).await {
                Ok(_) => emit(
                    &context.listeners,
                    WorkerEvent::Failed {
                        queue: queue_name,
                        job_id,
                        reason,
                    },
                ),
                Err(e) => error!(slot, job_id = %job_id, error = %e, "Failed to mark job as failed"),
            }
        }
    }
    context.held.lock().remove(&job_id);
}

fn panic_message(err: tokio::task::JoinError) -> String {
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("handler panicked: {msg}")
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::job::{JobState, QueueName};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn fast_config() -> WorkerConfig {
        WorkerConfig::default()
            .with_poll_interval(Duration::from_millis(10))
            .with_drain_timeout(Duration::from_secs(5))
    }

    async fn wait_terminal(queue: &Queue, id: JobId) -> Job {
        for _ in 0..500 {
            let job = queue.get_job(id).await.unwrap().unwrap();
            if job.state.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never finished");
    }

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.drain_timeout, Duration::from_secs(30));
        assert_eq!(config.lock_timeout, Duration::from_secs(300));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert!(config.log_execution);
        assert_eq!(WorkerConfig::default().with_concurrency(0).concurrency, 1);
        assert!(!WorkerConfig::default().with_log_execution(false).log_execution);
    }

    fn recorder(worker: &mut Worker) -> Arc<Mutex<Vec<WorkerEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        worker.subscribe(Arc::new(move |event: &WorkerEvent| {
            sink.lock().push(event.clone());
        }));
        events
    }

    #[tokio::test]
    async fn test_handler_result_completes_job() {
        let queue = Queue::named(QueueName::Tasks, Arc::new(MemoryBroker::new()));
        let mut worker = Worker::with_config(queue.clone(), fast_config());
        worker.register_handler("echo", |job, progress| async move {
            progress.update(60).await?;
            Ok(json!({ "echo": job.data }))
        });
        worker.start().await.unwrap();

        let id = queue.add("echo", json!("hi")).await.unwrap();
        let job = wait_terminal(&queue, id).await;
        worker.stop().await.unwrap();

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.result, Some(json!({ "echo": "hi" })));
        assert_eq!(job.progress, 60);
    }

    #[tokio::test]
    async fn test_handler_error_fails_job_without_retry() {
        let queue = Queue::named(QueueName::Tasks, Arc::new(MemoryBroker::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut worker = Worker::with_config(queue.clone(), fast_config());
        worker.register_handler("boom", move |_job, _progress| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(QueueError::handler("exploded"))
            }
        });
        worker.start().await.unwrap();

        let id = queue.add("boom", json!({})).await.unwrap();
        let job = wait_terminal(&queue, id).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        worker.stop().await.unwrap();

        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.failed_reason.as_deref(), Some("exploded"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_job_name_fails() {
        let queue = Queue::named(QueueName::Tasks, Arc::new(MemoryBroker::new()));
        let mut worker = Worker::with_config(queue.clone(), fast_config());
        worker.start().await.unwrap();

        let id = queue.add("mystery", json!({})).await.unwrap();
        let job = wait_terminal(&queue, id).await;
        worker.stop().await.unwrap();

        assert_eq!(job.state, JobState::Failed);
        assert!(job.failed_reason.unwrap().contains("mystery"));
    }

    #[tokio::test]
    async fn test_panicking_handler_fails_job_and_slot_survives() {
        let queue = Queue::named(QueueName::Tasks, Arc::new(MemoryBroker::new()));
        let mut worker =
            Worker::with_config(queue.clone(), fast_config().with_concurrency(1));
        worker.register_handler("panic", |job, _progress| async move {
            if job.data.is_object() {
                panic!("kaboom");
            }
            Ok(json!(null))
        });
        worker.register_handler("ok", |_job, _progress| async move { Ok(json!(true)) });
        worker.start().await.unwrap();

        let bad = queue.add("panic", json!({})).await.unwrap();
        let good = queue.add("ok", json!({})).await.unwrap();
        let bad = wait_terminal(&queue, bad).await;
        let good = wait_terminal(&queue, good).await;
        worker.stop().await.unwrap();

        assert_eq!(bad.state, JobState::Failed);
        assert!(bad.failed_reason.unwrap().contains("kaboom"));
        assert_eq!(good.state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_listeners_see_lifecycle_in_order() {
        let queue = Queue::named(QueueName::Tasks, Arc::new(MemoryBroker::new()));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();

        let mut worker = Worker::with_config(queue.clone(), fast_config());
        worker.subscribe(Arc::new(move |event: &WorkerEvent| {
            sink.lock().push(event.clone());
        }));
        worker.register_handler("steps", |_job, progress| async move {
            progress.update(20).await?;
            progress.update(10).await?;
            progress.update(80).await?;
            Ok(json!("done"))
        });
        worker.start().await.unwrap();

        let id = queue.add("steps", json!({})).await.unwrap();
        wait_terminal(&queue, id).await;
        worker.stop().await.unwrap();

        let events = events.lock();
        let progress: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                WorkerEvent::Progress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect();
        assert!(matches!(events.first(), Some(WorkerEvent::Active { .. })));
        assert_eq!(progress, vec![20, 80]);
        assert!(matches!(events.last(), Some(WorkerEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn test_start_stop_state() {
        let queue = Queue::named(QueueName::Tasks, Arc::new(MemoryBroker::new()));
        let mut worker = Worker::with_config(queue, fast_config());

        assert!(matches!(worker.stop().await, Err(QueueError::WorkerNotRunning)));
        worker.start().await.unwrap();
        assert!(worker.is_running());
        assert!(matches!(
            worker.start().await,
            Err(QueueError::WorkerAlreadyRunning)
        ));
        worker.stop().await.unwrap();
        assert!(!worker.is_running());
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_job() {
        let queue = Queue::named(QueueName::Tasks, Arc::new(MemoryBroker::new()));
        let mut worker = Worker::with_config(queue.clone(), fast_config());
        worker.register_handler("slow", |_job, _progress| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(json!("finished"))
        });
        worker.start().await.unwrap();

        let id = queue.add("slow", json!({})).await.unwrap();
        while queue.get_job(id).await.unwrap().unwrap().state == JobState::Waiting {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        worker.stop().await.unwrap();

        let job = queue.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_drain_timeout_cancels_handler_and_releases_job() {
        let queue = Queue::named(QueueName::Tasks, Arc::new(MemoryBroker::new()));
        let writes = Arc::new(AtomicUsize::new(0));
        let counter = writes.clone();

        let config = fast_config()
            .with_log_execution(false)
            .with_drain_timeout(Duration::from_millis(20));
        let mut worker = Worker::with_config(queue.clone(), config);
        let events = recorder(&mut worker);
        worker.register_handler("slow", move |_job, _progress| {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!("late"))
            }
        });
        worker.start().await.unwrap();

        let id = queue.add("slow", json!({})).await.unwrap();
        while queue.get_job(id).await.unwrap().unwrap().state == JobState::Waiting {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        worker.stop().await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(writes.load(Ordering::SeqCst), 0);
        assert_eq!(worker.in_flight(), 0);
        let job = queue.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.attempts_made, 0);
        assert!(events.lock().iter().any(
            |e| matches!(e, WorkerEvent::Requeued { job_id, .. } if *job_id == id)
        ));

        let mut fresh = Worker::with_config(queue.clone(), fast_config());
        fresh.register_handler("slow", |_job, _progress| async move { Ok(json!("finished")) });
        fresh.start().await.unwrap();
        let job = wait_terminal(&queue, id).await;
        fresh.stop().await.unwrap();

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.attempts_made, 1);
    }

    #[tokio::test]
    async fn test_abandoned_claim_is_recovered_and_run_again() {
        let broker = Arc::new(MemoryBroker::new());
        let queue = Queue::named(QueueName::Tasks, broker.clone());
        let id = queue.add("echo", json!("again")).await.unwrap();

        // Claimed by a worker that went away without finishing.
        let claimed = broker.claim(queue.name()).await.unwrap().unwrap();
        assert_eq!(claimed.id, id);

        let config = fast_config()
            .with_lock_timeout(Duration::from_millis(50))
            .with_heartbeat_interval(Duration::from_millis(10));
        let mut worker = Worker::with_config(queue.clone(), config);
        let events = recorder(&mut worker);
        worker.register_handler("echo", |job, _progress| async move { Ok(job.data) });
        worker.start().await.unwrap();

        let job = wait_terminal(&queue, id).await;
        worker.stop().await.unwrap();

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.result, Some(json!("again")));
        assert_eq!(job.attempts_made, 2);
        assert!(events.lock().iter().any(
            |e| matches!(e, WorkerEvent::Requeued { job_id, .. } if *job_id == id)
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_keeps_long_job_claimed() {
        let queue = Queue::named(QueueName::Tasks, Arc::new(MemoryBroker::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let config = fast_config()
            .with_lock_timeout(Duration::from_millis(60))
            .with_heartbeat_interval(Duration::from_millis(10));
        let mut worker = Worker::with_config(queue.clone(), config);
        worker.register_handler("long", move |_job, _progress| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(250)).await;
                Ok(json!(null))
            }
        });
        worker.start().await.unwrap();

        let id = queue.add("long", json!({})).await.unwrap();
        let job = wait_terminal(&queue, id).await;
        worker.stop().await.unwrap();

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.attempts_made, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
