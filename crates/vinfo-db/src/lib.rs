//! # vinfo-db
//!
//! PostgreSQL database layer for video-info.
//!
//! This crate provides:
//! - Connection pool management and configuration
//! - The durable job queue (`job_queue` table)
//! - The dedup index mapping client UUIDs to jobs
//! - Admission and status queries for info jobs
//!
//! ## Example
//!
//! ```rust,ignore
//! use vinfo_db::{Database, InfoJobArgs};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/vinfo").await?;
//!
//!     let view = db.info.admit(InfoJobArgs {
//!         uuid: uuid::Uuid::new_v4(),
//!         path: "/videos/talk.mp4".to_string(),
//!         webhook_uri: None,
//!         webhook_token: None,
//!     }).await?;
//!
//!     println!("Admitted {} ({:?})", view.uuid, view.status);
//!     Ok(())
//! }
//! ```
pub mod config;
pub mod info;
pub mod jobs;
pub mod pool;
pub mod uuid_mapping;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use vinfo_core::*;

pub use config::DatabaseConfig;
pub use info::PgInfoRepository;
pub use jobs::{retry_backoff, PgJobRepository};
pub use pool::{create_lazy_pool, create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use uuid_mapping::PgUuidMappingRepository;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Durable job queue.
    pub jobs: PgJobRepository,
    /// Client UUID → job id mapping.
    pub uuid_mappings: PgUuidMappingRepository,
    /// Admission and status for info jobs.
    pub info: PgInfoRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        let jobs = PgJobRepository::new(pool.clone());
        let uuid_mappings = PgUuidMappingRepository::new(pool.clone());
        Self {
            info: PgInfoRepository::new(pool.clone(), jobs.clone(), uuid_mappings.clone()),
            jobs,
            uuid_mappings,
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Connect using environment configuration.
    pub async fn connect_from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::connect_with_config(&config.url, PoolConfig::from(config)).await
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Check that the database answers queries.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
