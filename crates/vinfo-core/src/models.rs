//! Core data models for video-info.
//!
//! These types are shared across all video-info crates: queue records,
//! job arguments, recorded outcomes and the client-facing views.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::defaults;
use crate::encoding::base64_opt;
use crate::error::{Error, Result};

// =============================================================================
// JOB QUEUE TYPES
// =============================================================================

/// Kind of job stored in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Extract duration and chapter boundaries from a video file
    Info,
    /// Deliver an extraction outcome to a client webhook
    Webhook,
}

impl JobKind {
    /// Database and log representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Info => "info",
            JobKind::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Ready to be claimed
    Available,
    /// Waiting for its scheduled time
    Scheduled,
    /// Not yet eligible to run
    Pending,
    /// Claimed by a worker
    Running,
    /// Failed an attempt, waiting for its retry time
    Retryable,
    /// Finished successfully
    Completed,
    /// Gave up after exhausting attempts or a permanent failure
    Discarded,
    /// Cancelled by an operator
    Cancelled,
}

impl JobState {
    /// Database and log representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Available => "available",
            JobState::Scheduled => "scheduled",
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Retryable => "retryable",
            JobState::Completed => "completed",
            JobState::Discarded => "discarded",
            JobState::Cancelled => "cancelled",
        }
    }

    /// True once the job will never run again.
    pub fn is_finalized(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Discarded | JobState::Cancelled
        )
    }
}

/// One failed attempt, as recorded in the job's error history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptError {
    pub at: DateTime<Utc>,
    pub attempt: i32,
    pub error: String,
}

/// A job record in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub state: JobState,
    pub args: JsonValue,
    pub output: Option<JsonValue>,
    pub errors: Vec<AttemptError>,
    pub attempt: i32,
    pub max_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Decode the job arguments, checking that the stored kind matches.
    pub fn args_as<A: JobArgs>(&self) -> Result<A> {
        if self.kind != A::KIND {
            return Err(Error::Job(format!(
                "job {} has kind {}, expected {}",
                self.id, self.kind, A::KIND
            )));
        }
        Ok(serde_json::from_value(self.args.clone())?)
    }

    /// Decode the recorded outcome, if the job has one.
    pub fn outcome(&self) -> Result<Option<JobOutcome>> {
        match &self.output {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }

    /// Message of the most recent failed attempt.
    pub fn last_error(&self) -> Option<&str> {
        self.errors.last().map(|e| e.error.as_str())
    }
}

/// Typed job arguments bound to a single job kind.
pub trait JobArgs: Serialize + DeserializeOwned + Send + Sync {
    const KIND: JobKind;
}

/// Request to enqueue a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub kind: JobKind,
    pub args: JsonValue,
    pub max_attempts: i32,
}

impl NewJob {
    /// Build an insert request from typed arguments with the default attempt budget.
    pub fn from_args<A: JobArgs>(args: &A) -> Result<Self> {
        Ok(Self {
            kind: A::KIND,
            args: serde_json::to_value(args)?,
            max_attempts: defaults::JOB_MAX_ATTEMPTS,
        })
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

// =============================================================================
// INFO JOB TYPES
// =============================================================================

/// Arguments of an extraction job. Immutable once admitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoJobArgs {
    pub uuid: Uuid,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_uri: Option<String>,
    #[serde(default, with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub webhook_token: Option<Vec<u8>>,
}

impl JobArgs for InfoJobArgs {
    const KIND: JobKind = JobKind::Info;
}

/// Metadata extracted from a video file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VideoInfo {
    /// Total duration in seconds
    pub duration_seconds: f64,
    /// Duration of each chapter in seconds, in container order
    pub chapter_durations_seconds: Vec<f64>,
}

/// Recorded result of an extraction attempt: a result or an error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Result(VideoInfo),
    Error(String),
}

impl JobOutcome {
    /// Split into the optional `result` / `error` fields used on the wire.
    pub fn into_parts(self) -> (Option<VideoInfo>, Option<String>) {
        match self {
            JobOutcome::Result(info) => (Some(info), None),
            JobOutcome::Error(message) => (None, Some(message)),
        }
    }
}

/// Arguments of a webhook delivery job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookJobArgs {
    pub uri: String,
    #[serde(default, with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub token: Option<Vec<u8>>,
    pub uuid: Uuid,
    pub outcome: JobOutcome,
}

impl JobArgs for WebhookJobArgs {
    const KIND: JobKind = JobKind::Webhook;
}

/// Body POSTed to a client webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default, with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub token: Option<Vec<u8>>,
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<VideoInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<WebhookJobArgs> for WebhookPayload {
    fn from(args: WebhookJobArgs) -> Self {
        let (result, error) = args.outcome.into_parts();
        Self {
            token: args.token,
            uuid: args.uuid,
            result,
            error,
        }
    }
}

// =============================================================================
// CLIENT-FACING TYPES
// =============================================================================

/// Request body for admitting an info job.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CreateInfoRequest {
    /// Client-chosen identifier, admitted at most once
    pub uuid: Uuid,
    /// Path of the video file as seen by the workers
    pub video_path: String,
    /// URL notified when the job finishes
    #[serde(default)]
    pub webhook_uri: Option<String>,
    /// Opaque token echoed in the webhook body (base64)
    #[serde(default, with = "base64_opt")]
    #[schema(value_type = Option<String>, format = Byte)]
    pub webhook_token: Option<Vec<u8>>,
}

impl From<CreateInfoRequest> for InfoJobArgs {
    fn from(req: CreateInfoRequest) -> Self {
        Self {
            uuid: req.uuid,
            path: req.video_path,
            webhook_uri: req.webhook_uri,
            webhook_token: req.webhook_token,
        }
    }
}

/// Coarse client-visible status of an info job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InfoStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Client view of an info job. Derived on every query, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct InfoJob {
    pub uuid: Uuid,
    pub status: InfoStatus,
    pub video_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<VideoInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
