//! Job worker and runner for processing queued jobs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use vinfo_core::{defaults, Error, Job, JobKind, JobRepository, JobState, Result};
use vinfo_db::{log_pool_metrics, Database};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum number of jobs claimed per batch.
    pub max_concurrent_jobs: usize,
    /// Whether to enable job processing.
    pub enabled: bool,
    /// A running job older than this is returned to the queue.
    pub rescue_after: Duration,
    /// How often to look for such jobs.
    pub rescue_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            enabled: true,
            rescue_after: Duration::from_secs(defaults::JOB_RESCUE_AFTER_SECS),
            rescue_interval: Duration::from_secs(defaults::JOB_RESCUE_INTERVAL_SECS),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `VI_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `VI_WORKER_MAX_CONCURRENT` | `4` | Jobs claimed per batch |
    /// | `VI_WORKER_POLL_INTERVAL_MS` | `500` | Polling interval when queue is empty |
    /// | `VI_WORKER_RESCUE_AFTER_SECS` | `3600` | Stuck-job threshold |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let enabled = std::env::var("VI_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(defaults.enabled);

        let max_concurrent_jobs = std::env::var("VI_WORKER_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.max_concurrent_jobs)
            .max(1);

        let poll_interval_ms = std::env::var("VI_WORKER_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.poll_interval_ms);

        let rescue_after = std::env::var("VI_WORKER_RESCUE_AFTER_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.rescue_after);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            enabled,
            rescue_after,
            rescue_interval: defaults.rescue_interval.min(rescue_after),
        }
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set maximum concurrent jobs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the stuck-job threshold and how often it is checked.
    pub fn with_rescue(mut self, after: Duration, interval: Duration) -> Self {
        self.rescue_after = after;
        self.rescue_interval = interval;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A job was started.
    JobStarted { job_id: Uuid, kind: JobKind },
    /// A job completed successfully.
    JobCompleted { job_id: Uuid, kind: JobKind },
    /// A job attempt failed; `state` is where the job ended up.
    JobFailed {
        job_id: Uuid,
        kind: JobKind,
        error: String,
        state: JobState,
    },
    /// Stuck jobs were returned to the queue.
    JobsRescued { count: u64 },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown: CancellationToken,
    event_rx: broadcast::Receiver<WorkerEvent>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop claiming, cancel in-flight jobs, and wait for the worker to
    /// record their results.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.cancel();
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Worker task failed: {}", e)))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

type HandlerMap = Arc<RwLock<HashMap<JobKind, Arc<dyn JobHandler>>>>;

/// Job worker that processes jobs from the queue.
pub struct JobWorker {
    db: Database,
    config: WorkerConfig,
    handlers: HandlerMap,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    /// Create a new job worker.
    pub fn new(db: Database, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::JOB_EVENT_CHANNEL_CAPACITY);
        Self {
            db,
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Register a handler for a job kind, replacing any earlier one.
    pub async fn register_handler(&self, handler: Arc<dyn JobHandler>) {
        let kind = handler.kind();
        let mut handlers = self.handlers.write().await;
        handlers.insert(kind, handler);
        debug!(%kind, "Registered job handler");
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let shutdown = CancellationToken::new();
        let event_rx = self.event_tx.subscribe();

        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            self.run(token).await;
        });

        WorkerHandle {
            shutdown,
            event_rx,
            task,
        }
    }

    /// Run the worker loop.
    ///
    /// Claims up to `max_concurrent_jobs` at a time and processes them concurrently.
    /// Only sleeps when the queue is empty, and wakes early when a job is
    /// enqueued in this process.
    #[instrument(skip(self, shutdown))]
    async fn run(self, shutdown: CancellationToken) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            rescue_after_secs = self.config.rescue_after.as_secs(),
            "Worker started, waiting for jobs"
        );

        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let max_concurrent = self.config.max_concurrent_jobs;
        let notify = self.db.jobs.job_notify();
        let mut last_rescue: Option<Instant> = None;

        loop {
            if shutdown.is_cancelled() {
                info!("Job worker received shutdown signal");
                break;
            }

            if last_rescue.map_or(true, |at| at.elapsed() >= self.config.rescue_interval) {
                self.rescue_stuck().await;
                last_rescue = Some(Instant::now());
            }

            // Created before claiming so an insert racing with an empty claim
            // still wakes us.
            let notified = notify.notified();
            tokio::pin!(notified);

            let mut claimed = 0;
            let mut tasks = tokio::task::JoinSet::new();

            for _ in 0..max_concurrent {
                match self.claim_job().await {
                    Some(job) => {
                        claimed += 1;
                        let worker = self.clone_refs();
                        let cancel = shutdown.child_token();
                        tasks.spawn(async move {
                            worker.execute_job(job, cancel).await;
                        });
                    }
                    None => break,
                }
            }

            if claimed == 0 {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Job worker received shutdown signal");
                        break;
                    }
                    _ = &mut notified => {}
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(claimed, "Processing concurrent job batch");
                // Cancelled jobs still report back, so the batch always drains.
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Job task panicked");
                    }
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }

    /// Return abandoned running jobs to the queue.
    async fn rescue_stuck(&self) {
        log_pool_metrics(&self.db.pool);
        match self.db.jobs.rescue_stuck(self.config.rescue_after).await {
            Ok(0) => {}
            Ok(count) => {
                warn!(count, "Rescued stuck jobs");
                let _ = self.event_tx.send(WorkerEvent::JobsRescued { count });
            }
            Err(e) => error!(error = ?e, "Failed to rescue stuck jobs"),
        }
    }

    /// Claim the next available job without processing it.
    async fn claim_job(&self) -> Option<Job> {
        let kinds: Vec<JobKind> = {
            let handlers = self.handlers.read().await;
            handlers.keys().copied().collect()
        };
        if kinds.is_empty() {
            return None;
        }

        match self.db.jobs.claim_next_for_kinds(&kinds).await {
            Ok(job) => job,
            Err(e) => {
                error!(error = ?e, "Failed to claim job");
                None
            }
        }
    }

    /// Clone references needed for spawned job tasks.
    fn clone_refs(&self) -> JobWorkerRef {
        JobWorkerRef {
            db: self.db.clone(),
            handlers: self.handlers.clone(),
            event_tx: self.event_tx.clone(),
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }
}

/// Lightweight reference bundle for executing a single job in a spawned task.
struct JobWorkerRef {
    db: Database,
    handlers: HandlerMap,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorkerRef {
    /// Execute a single claimed job and record what happened.
    async fn execute_job(self, job: Job, cancel: CancellationToken) {
        let start = Instant::now();
        let job_id = job.id;
        let kind = job.kind;
        let attempt = job.attempt;

        info!(%job_id, %kind, attempt, "Processing job");

        let _ = self.event_tx.send(WorkerEvent::JobStarted { job_id, kind });

        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&kind).cloned()
        };

        let result = match handler {
            Some(handler) => {
                let ctx = JobContext::new(job).with_cancellation(cancel);
                handler.execute(ctx).await
            }
            None => {
                warn!(%kind, "No handler registered for job kind");
                JobResult::Failed(format!("No handler for job kind: {}", kind))
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            JobResult::Success(output) => {
                match self.db.jobs.complete(job_id, attempt, output).await {
                    Ok(true) => self.completed(job_id, kind, duration_ms),
                    Ok(false) => warn!(
                        %job_id,
                        %kind,
                        attempt,
                        "Attempt no longer owns the job, result dropped"
                    ),
                    Err(e) => error!(error = ?e, %job_id, "Failed to mark job as completed"),
                }
            }
            JobResult::Finalized => self.completed(job_id, kind, duration_ms),
            JobResult::Superseded => warn!(
                %job_id,
                %kind,
                attempt,
                duration_ms,
                "Attempt no longer owns the job, nothing recorded"
            ),
            JobResult::Failed(error) => {
                self.record_failure(job_id, kind, attempt, error, false, duration_ms)
                    .await
            }
            JobResult::Retry(error) => {
                self.record_failure(job_id, kind, attempt, error, true, duration_ms)
                    .await
            }
        }
    }

    fn completed(&self, job_id: Uuid, kind: JobKind, duration_ms: u64) {
        info!(%job_id, %kind, duration_ms, "Job completed successfully");
        let _ = self
            .event_tx
            .send(WorkerEvent::JobCompleted { job_id, kind });
    }

    async fn record_failure(
        &self,
        job_id: Uuid,
        kind: JobKind,
        attempt: i32,
        error: String,
        retryable: bool,
        duration_ms: u64,
    ) {
        match self.db.jobs.fail(job_id, attempt, &error, retryable).await {
            Ok(Some(state)) => {
                warn!(
                    %job_id,
                    %kind,
                    attempt,
                    %error,
                    state = state.as_str(),
                    duration_ms,
                    "Job failed"
                );
                let _ = self.event_tx.send(WorkerEvent::JobFailed {
                    job_id,
                    kind,
                    error,
                    state,
                });
            }
            Ok(None) => warn!(
                %job_id,
                %kind,
                attempt,
                "Attempt no longer owns the job, failure dropped"
            ),
            Err(e) => error!(error = ?e, %job_id, "Failed to mark job as failed"),
        }
    }
}

/// Builder for creating a job worker with handlers.
pub struct WorkerBuilder {
    db: Database,
    config: WorkerConfig,
    handlers: Vec<Arc<dyn JobHandler>>,
}

impl WorkerBuilder {
    /// Create a new worker builder.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            config: WorkerConfig::default(),
            handlers: Vec::new(),
        }
    }

    /// Set the worker configuration.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a handler.
    pub fn with_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Build and return the worker.
    pub async fn build(self) -> JobWorker {
        let worker = JobWorker::new(self.db, self.config);

        for handler in self.handlers {
            worker.register_handler(handler).await;
        }

        worker
    }
}
