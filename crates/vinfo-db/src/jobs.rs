//! Job queue repository implementation.
//!
//! Claims use `FOR UPDATE SKIP LOCKED`, so any number of workers can share
//! the table. Every worker-side transition is guarded by the attempt number
//! the worker claimed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row, Transaction};
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use vinfo_core::{
    defaults, AttemptError, Error, Job, JobKind, JobRepository, JobState, NewJob, Result,
};

/// Columns selected for every job read, with enums cast to text.
pub(crate) const JOB_COLUMNS: &str = "id, kind::text AS kind, state::text AS state, args, output, \
     errors, attempt, max_attempts, created_at, scheduled_at, attempted_at, finalized_at";

/// Error recorded on jobs returned to the queue by the stuck-job rescuer.
pub const RESCUED_ERROR: &str = "job exceeded its run time without finishing and was rescued";

/// Delay before retrying after the given failed attempt: `attempt^4` seconds,
/// capped at [`defaults::JOB_BACKOFF_MAX_SECS`].
pub fn retry_backoff(attempt: i32) -> Duration {
    let attempt = attempt.max(1) as u64;
    let secs = attempt
        .checked_pow(4)
        .unwrap_or(u64::MAX)
        .min(defaults::JOB_BACKOFF_MAX_SECS);
    Duration::from_secs(secs)
}

/// PostgreSQL implementation of JobRepository.
#[derive(Clone)]
pub struct PgJobRepository {
    pool: Pool<Postgres>,
    /// Wakes an in-process worker as soon as a job is enqueued.
    notify: Arc<Notify>,
}

impl PgJobRepository {
    /// Create a new PgJobRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Get the job notification handle for event-driven waking.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Wake in-process workers. Call after committing a transaction that
    /// enqueued jobs through [`insert_tx`](Self::insert_tx).
    pub fn wake_workers(&self) {
        self.notify.notify_waiters();
    }

    /// Convert string from database to JobKind.
    fn str_to_job_kind(s: &str) -> Option<JobKind> {
        match s {
            "info" => Some(JobKind::Info),
            "webhook" => Some(JobKind::Webhook),
            _ => None,
        }
    }

    /// Convert string from database to JobState.
    fn str_to_job_state(s: &str) -> JobState {
        match s {
            "available" => JobState::Available,
            "scheduled" => JobState::Scheduled,
            "pending" => JobState::Pending,
            "running" => JobState::Running,
            "retryable" => JobState::Retryable,
            "completed" => JobState::Completed,
            "discarded" => JobState::Discarded,
            "cancelled" => JobState::Cancelled,
            other => {
                warn!(
                    subsystem = "jobs",
                    state = other,
                    "Unrecognized job state, treating as pending"
                );
                JobState::Pending // fallback
            }
        }
    }

    /// Parse a job row into a Job struct.
    pub(crate) fn parse_job_row(row: sqlx::postgres::PgRow) -> Result<Job> {
        let kind: String = row.get("kind");
        let kind = Self::str_to_job_kind(&kind)
            .ok_or_else(|| Error::Job(format!("unknown job kind: {}", kind)))?;
        let errors: JsonValue = row.get("errors");
        let errors = serde_json::from_value::<Vec<AttemptError>>(errors)
            .map_err(|e| Error::Job(format!("malformed error history: {}", e)))?;

        Ok(Job {
            id: row.get("id"),
            kind,
            state: Self::str_to_job_state(row.get("state")),
            args: row.get("args"),
            output: row.get("output"),
            errors,
            attempt: row.get("attempt"),
            max_attempts: row.get("max_attempts"),
            created_at: row.get("created_at"),
            scheduled_at: row.get("scheduled_at"),
            attempted_at: row.get("attempted_at"),
            finalized_at: row.get("finalized_at"),
        })
    }

    fn insert_query() -> String {
        format!(
            "INSERT INTO job_queue (id, kind, state, args, max_attempts, created_at, scheduled_at)
             VALUES ($1, $2::job_kind, 'available'::job_state, $3, $4, $5, $5)
             RETURNING {JOB_COLUMNS}"
        )
    }

    /// Enqueue a job within an existing transaction.
    ///
    /// The job is invisible to workers until the transaction commits.
    pub async fn insert_tx(&self, tx: &mut Transaction<'_, Postgres>, job: NewJob) -> Result<Job> {
        let now = Utc::now();
        let row = sqlx::query(&Self::insert_query())
            .bind(Uuid::now_v7())
            .bind(job.kind.as_str())
            .bind(&job.args)
            .bind(job.max_attempts)
            .bind(now)
            .fetch_one(&mut **tx)
            .await
            .map_err(Error::Database)?;

        let job = Self::parse_job_row(row)?;
        debug!(
            subsystem = "jobs",
            op = "insert",
            job_id = %job.id,
            kind = %job.kind,
            "Job enqueued in transaction"
        );
        Ok(job)
    }

    /// Complete a running attempt within an existing transaction.
    ///
    /// Returns false when the attempt no longer owns the job; the caller must
    /// then roll back anything else it wrote in the same transaction.
    pub async fn complete_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        job_id: Uuid,
        attempt: i32,
        output: Option<JsonValue>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE job_queue
             SET state = 'completed'::job_state, finalized_at = $1, output = $2
             WHERE id = $3 AND state = 'running'::job_state AND attempt = $4",
        )
        .bind(Utc::now())
        .bind(&output)
        .bind(job_id)
        .bind(attempt)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn insert(&self, job: NewJob) -> Result<Job> {
        let now = Utc::now();
        let row = sqlx::query(&Self::insert_query())
            .bind(Uuid::now_v7())
            .bind(job.kind.as_str())
            .bind(&job.args)
            .bind(job.max_attempts)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        let job = Self::parse_job_row(row)?;
        self.wake_workers();
        Ok(job)
    }

    async fn claim_next_for_kinds(&self, kinds: &[JobKind]) -> Result<Option<Job>> {
        let now = Utc::now();
        let kind_strings: Vec<String> = kinds.iter().map(|k| k.as_str().to_string()).collect();

        // Filter by kind before locking. Empty array = claim any kind.
        let row = sqlx::query(&format!(
            "UPDATE job_queue
             SET state = 'running'::job_state, attempt = attempt + 1, attempted_at = $1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE state IN ('available'::job_state, 'scheduled'::job_state, 'retryable'::job_state)
                   AND scheduled_at <= $1
                   AND (cardinality($2::text[]) = 0 OR kind::text = ANY($2))
                 ORDER BY scheduled_at ASC, id ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(now)
        .bind(&kind_strings)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn complete(
        &self,
        job_id: Uuid,
        attempt: i32,
        output: Option<JsonValue>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let completed = self.complete_tx(&mut tx, job_id, attempt, output).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(completed)
    }

    async fn fail(
        &self,
        job_id: Uuid,
        attempt: i32,
        error: &str,
        retryable: bool,
    ) -> Result<Option<JobState>> {
        let now = Utc::now();
        let retry_at = now
            + chrono::Duration::from_std(retry_backoff(attempt))
                .map_err(|e| Error::Internal(e.to_string()))?;

        let state: Option<String> = sqlx::query_scalar(
            "UPDATE job_queue
             SET state = CASE WHEN $4 AND attempt < max_attempts
                              THEN 'retryable'::job_state ELSE 'discarded'::job_state END,
                 scheduled_at = CASE WHEN $4 AND attempt < max_attempts
                                     THEN $5 ELSE scheduled_at END,
                 finalized_at = CASE WHEN $4 AND attempt < max_attempts
                                     THEN NULL ELSE $6 END,
                 errors = errors || jsonb_build_array(jsonb_build_object(
                     'at', $6::timestamptz, 'attempt', attempt, 'error', $3::text))
             WHERE id = $1 AND state = 'running'::job_state AND attempt = $2
             RETURNING state::text",
        )
        .bind(job_id)
        .bind(attempt)
        .bind(error)
        .bind(retryable)
        .bind(retry_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(state.as_deref().map(Self::str_to_job_state))
    }

    async fn rescue_stuck(&self, older_than: Duration) -> Result<u64> {
        let now = Utc::now();
        let cutoff = now
            - chrono::Duration::from_std(older_than)
                .map_err(|e| Error::Internal(e.to_string()))?;

        let result = sqlx::query(
            "UPDATE job_queue
             SET state = CASE WHEN attempt < max_attempts
                              THEN 'retryable'::job_state ELSE 'discarded'::job_state END,
                 scheduled_at = $1,
                 finalized_at = CASE WHEN attempt < max_attempts THEN NULL ELSE $1 END,
                 errors = errors || jsonb_build_array(jsonb_build_object(
                     'at', $1::timestamptz, 'attempt', attempt, 'error', $3::text))
             WHERE state = 'running'::job_state AND attempted_at < $2",
        )
        .bind(now)
        .bind(cutoff)
        .bind(RESCUED_ERROR)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let rescued = result.rows_affected();
        if rescued > 0 {
            self.wake_workers();
        }
        Ok(rescued)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM job_queue WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_queue
             WHERE state IN ('available'::job_state, 'scheduled'::job_state, 'retryable'::job_state)",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(count)
    }
}
