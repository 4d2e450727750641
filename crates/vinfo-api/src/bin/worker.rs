//! Standalone video-info job worker.
//!
//! Processes info and webhook jobs until Ctrl+C or SIGTERM, then cancels
//! in-flight jobs and waits for their results to be recorded.

use tracing::info;

use vinfo_api::telemetry::init_tracing;
use vinfo_api::{shutdown_signal, worker};
use vinfo_db::{Database, DatabaseConfig};
use vinfo_jobs::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let _log_guard = init_tracing("vinfo-worker.log");

    let db_config = DatabaseConfig::from_env()?;
    info!(max_connections = db_config.max_connections, "Connecting to database...");
    let db = Database::connect_from_config(&db_config).await?;

    db.migrate().await?;
    info!("Database migrations complete");

    let config = WorkerConfig::from_env();
    if !config.enabled {
        info!("Worker disabled by VI_WORKER_ENABLED, exiting");
        return Ok(());
    }

    let handle = worker::start_worker(&db, config).await?;

    shutdown_signal().await;

    info!("Stopping worker");
    handle.shutdown().await?;
    info!("Worker stopped");
    Ok(())
}
