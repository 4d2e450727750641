//! Core traits for video-info abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// JOB QUEUE TRAITS
// =============================================================================

/// Repository for the durable job queue.
///
/// Worker-side transitions take the attempt number the worker claimed, so an
/// attempt that was rescued and handed to someone else can never finalize the
/// job a second time.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Enqueue a job; it becomes claimable immediately.
    async fn insert(&self, job: NewJob) -> Result<Job>;

    /// Claim the next runnable job whose kind is in `kinds`.
    /// An empty slice means "claim any kind".
    async fn claim_next_for_kinds(&self, kinds: &[JobKind]) -> Result<Option<Job>>;

    /// Mark a running attempt as completed, storing its output.
    /// Returns false when the attempt no longer owns the job.
    async fn complete(&self, job_id: Uuid, attempt: i32, output: Option<JsonValue>)
        -> Result<bool>;

    /// Record a failed attempt. Retryable failures are rescheduled with backoff
    /// until attempts run out; everything else is discarded. Returns the new
    /// state, or `None` when the attempt no longer owns the job.
    async fn fail(
        &self,
        job_id: Uuid,
        attempt: i32,
        error: &str,
        retryable: bool,
    ) -> Result<Option<JobState>>;

    /// Return jobs stuck in `running` for longer than `older_than` to the queue.
    async fn rescue_stuck(&self, older_than: Duration) -> Result<u64>;

    /// Get job by ID.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Count of jobs waiting to run.
    async fn pending_count(&self) -> Result<i64>;
}
