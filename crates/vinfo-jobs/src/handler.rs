//! Job handler contract.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;

use vinfo_core::{Job, JobArgs, JobKind, Result};

/// Context provided to job handlers.
pub struct JobContext {
    /// The claimed job, including the attempt number this run owns.
    pub job: Job,
    /// Cancelled when the worker shuts down.
    cancel: CancellationToken,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job: Job) -> Self {
        Self {
            job,
            cancel: CancellationToken::new(),
        }
    }

    /// Bind the context to a cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that fires when this attempt must stop.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Decode the job arguments.
    pub fn args<A: JobArgs>(&self) -> Result<A> {
        self.job.args_as()
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed successfully; the worker records the optional output.
    Success(Option<JsonValue>),
    /// The handler already completed the job inside its own transaction.
    Finalized,
    /// The attempt lost ownership of the job (it was rescued and claimed
    /// again) and wrote nothing.
    Superseded,
    /// Job failed permanently and is discarded.
    Failed(String),
    /// Job should be retried after a backoff delay.
    Retry(String),
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job kind this handler processes.
    fn kind(&self) -> JobKind;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;

    /// Check if this handler can process the given job kind.
    fn can_handle(&self, kind: JobKind) -> bool {
        self.kind() == kind
    }
}
