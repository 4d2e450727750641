//! Job worker wiring shared by both binaries.

use std::sync::Arc;

use tracing::info;

use vinfo_core::Result;
use vinfo_db::Database;
use vinfo_jobs::{
    FfprobeProbe, InfoHandler, WebhookHandler, WorkerBuilder, WorkerConfig, WorkerHandle,
};

/// Start a worker processing info and webhook jobs, configured from the
/// environment.
pub async fn start_worker(db: &Database, config: WorkerConfig) -> Result<WorkerHandle> {
    let probe = FfprobeProbe::from_env();
    let webhook = WebhookHandler::from_env()?;

    info!(
        max_concurrent = config.max_concurrent_jobs,
        poll_interval_ms = config.poll_interval_ms,
        "Starting job worker"
    );

    let worker = WorkerBuilder::new(db.clone())
        .with_config(config)
        .with_handler(InfoHandler::new(db.clone(), Arc::new(probe)))
        .with_handler(webhook)
        .build()
        .await;

    Ok(worker.start())
}
