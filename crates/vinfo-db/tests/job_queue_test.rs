//! Job queue transitions against a real Postgres.
//!
//! Jobs are moved to `running` directly so these tests never race with a
//! claim issued by another test.

use std::time::Duration;

use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use vinfo_core::{
    Job, JobKind, JobOutcome, JobRepository, JobState, NewJob, VideoInfo, WebhookJobArgs,
};
use vinfo_db::jobs::RESCUED_ERROR;
use vinfo_db::test_fixtures::connect_test_database;
use vinfo_db::{Database, PgJobRepository};

fn webhook_job() -> NewJob {
    NewJob::from_args(&WebhookJobArgs {
        uri: "http://hooks.local".to_string(),
        token: None,
        uuid: Uuid::new_v4(),
        outcome: JobOutcome::Error("probe failed".to_string()),
    })
    .unwrap()
}

/// Simulate a claim of this specific job.
async fn mark_running(pool: &PgPool, job_id: Uuid) -> i32 {
    sqlx::query_scalar(
        "UPDATE job_queue
         SET state = 'running'::job_state, attempt = attempt + 1, attempted_at = now()
         WHERE id = $1
         RETURNING attempt",
    )
    .bind(job_id)
    .fetch_one(pool)
    .await
    .expect("Failed to mark job running")
}

async fn fetch(db: &Database, id: Uuid) -> Job {
    db.jobs.get(id).await.unwrap().expect("job should exist")
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_insert_creates_available_job() {
    let db = connect_test_database().await;
    let job = db.jobs.insert(webhook_job()).await.unwrap();

    assert_eq!(job.kind, JobKind::Webhook);
    assert_eq!(job.state, JobState::Available);
    assert_eq!(job.attempt, 0);
    assert!(job.errors.is_empty());
    assert!(job.finalized_at.is_none());
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_complete_records_output() {
    let db = connect_test_database().await;
    let job = db.jobs.insert(webhook_job()).await.unwrap();
    let attempt = mark_running(db.pool(), job.id).await;

    let output = serde_json::to_value(JobOutcome::Result(VideoInfo {
        duration_seconds: 10.0,
        chapter_durations_seconds: vec![],
    }))
    .unwrap();
    assert!(db.jobs.complete(job.id, attempt, Some(output.clone())).await.unwrap());

    let done = fetch(&db, job.id).await;
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.output, Some(output));
    assert!(done.finalized_at.is_some());
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_stale_attempt_cannot_finalize() {
    let db = connect_test_database().await;
    let job = db.jobs.insert(webhook_job()).await.unwrap();
    let first = mark_running(db.pool(), job.id).await;
    // The job was rescued and claimed again by someone else.
    let second = mark_running(db.pool(), job.id).await;
    assert_eq!(second, first + 1);

    assert!(!db.jobs.complete(job.id, first, None).await.unwrap());
    assert_eq!(db.jobs.fail(job.id, first, "late", true).await.unwrap(), None);
    assert_eq!(fetch(&db, job.id).await.state, JobState::Running);

    assert!(db.jobs.complete(job.id, second, None).await.unwrap());
    assert!(!db.jobs.complete(job.id, second, None).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_retryable_failure_schedules_backoff() {
    let db = connect_test_database().await;
    let job = db.jobs.insert(webhook_job()).await.unwrap();
    let attempt = mark_running(db.pool(), job.id).await;

    let state = db
        .jobs
        .fail(job.id, attempt, "connection refused", true)
        .await
        .unwrap();
    assert_eq!(state, Some(JobState::Retryable));

    let failed = fetch(&db, job.id).await;
    assert_eq!(failed.state, JobState::Retryable);
    assert!(failed.scheduled_at > failed.created_at);
    assert!(failed.finalized_at.is_none());
    assert_eq!(failed.errors.len(), 1);
    assert_eq!(failed.errors[0].attempt, attempt);
    assert_eq!(failed.last_error(), Some("connection refused"));
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_exhausted_attempts_discard() {
    let db = connect_test_database().await;
    let job = db
        .jobs
        .insert(webhook_job().with_max_attempts(2))
        .await
        .unwrap();

    let first = mark_running(db.pool(), job.id).await;
    assert_eq!(
        db.jobs.fail(job.id, first, "boom 1", true).await.unwrap(),
        Some(JobState::Retryable)
    );
    let second = mark_running(db.pool(), job.id).await;
    assert_eq!(
        db.jobs.fail(job.id, second, "boom 2", true).await.unwrap(),
        Some(JobState::Discarded)
    );

    let discarded = fetch(&db, job.id).await;
    assert!(discarded.finalized_at.is_some());
    assert_eq!(discarded.errors.len(), 2);
    assert_eq!(discarded.last_error(), Some("boom 2"));
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_permanent_failure_discards_immediately() {
    let db = connect_test_database().await;
    let job = db.jobs.insert(webhook_job()).await.unwrap();
    let attempt = mark_running(db.pool(), job.id).await;

    assert_eq!(
        db.jobs.fail(job.id, attempt, "bad args", false).await.unwrap(),
        Some(JobState::Discarded)
    );
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_rescue_returns_stuck_jobs() {
    let db = connect_test_database().await;
    let job = db.jobs.insert(webhook_job()).await.unwrap();
    mark_running(db.pool(), job.id).await;
    sqlx::query("UPDATE job_queue SET attempted_at = now() - interval '2 hours' WHERE id = $1")
        .bind(job.id)
        .execute(db.pool())
        .await
        .unwrap();

    let rescued = db.jobs.rescue_stuck(Duration::from_secs(3600)).await.unwrap();
    assert!(rescued >= 1);

    let job = fetch(&db, job.id).await;
    assert_eq!(job.state, JobState::Retryable);
    assert_eq!(job.last_error(), Some(RESCUED_ERROR));
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_insert_tx_is_invisible_until_commit() {
    let db = connect_test_database().await;
    let jobs = PgJobRepository::new(db.pool().clone());

    let mut tx = db.pool().begin().await.unwrap();
    let job = jobs.insert_tx(&mut tx, webhook_job()).await.unwrap();
    assert!(jobs.get(job.id).await.unwrap().is_none());
    tx.rollback().await.unwrap();
    assert!(jobs.get(job.id).await.unwrap().is_none());

    let mut tx = db.pool().begin().await.unwrap();
    let job = jobs.insert_tx(&mut tx, webhook_job()).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(jobs.get(job.id).await.unwrap().unwrap().args["uri"], json!("http://hooks.local"));
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL with migrated database
async fn test_malformed_error_history_is_reported() {
    let db = connect_test_database().await;
    let job = db.jobs.insert(webhook_job()).await.unwrap();

    // Finalized so no claim in a concurrent test can pick it up.
    sqlx::query(
        "UPDATE job_queue
         SET state = 'discarded'::job_state, finalized_at = now(), errors = '{\"oops\": 1}'::jsonb
         WHERE id = $1",
    )
    .bind(job.id)
    .execute(db.pool())
    .await
    .unwrap();

    let result = db.jobs.get(job.id).await;

    sqlx::query("DELETE FROM job_queue WHERE id = $1")
        .bind(job.id)
        .execute(db.pool())
        .await
        .unwrap();

    match result {
        Err(vinfo_core::Error::Job(msg)) => assert!(msg.contains("malformed error history")),
        other => panic!("expected a job error, got {:?}", other.map(|j| j.map(|j| j.id))),
    }
}
