//! video-info HTTP API server.
//!
//! Applies migrations, serves the API and, when `VI_WORKER_ENABLED` is set,
//! runs a job worker in the same process.

use tracing::info;

use vinfo_api::telemetry::init_tracing;
use vinfo_api::{router, shutdown_signal, worker, AppState, ServerConfig};
use vinfo_db::{Database, DatabaseConfig};
use vinfo_jobs::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _log_guard = init_tracing("vinfo-api.log");

    let server_config = ServerConfig::from_env()?;
    let db_config = DatabaseConfig::from_env()?;

    info!(max_connections = db_config.max_connections, "Connecting to database...");
    let db = Database::connect_from_config(&db_config).await?;
    info!("Database connected");

    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    let worker = if server_config.embedded_worker {
        let config = WorkerConfig::from_env().with_enabled(true);
        Some(worker::start_worker(&db, config).await?)
    } else {
        info!("Embedded worker disabled (set VI_WORKER_ENABLED=true to enable)");
        None
    };

    let app = router(AppState::new(db));

    let listener = tokio::net::TcpListener::bind(server_config.bind_addr()).await?;
    info!(addr = %listener.local_addr()?, "Starting HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = worker {
        info!("Stopping embedded worker");
        handle.shutdown().await?;
    }

    info!("Server stopped");
    Ok(())
}
