//! Dedup index mapping client UUIDs to queue job ids.
//!
//! The `uuid` primary key is the authority on uniqueness: a concurrent
//! admission that slips past the lookup still fails on insert.

use sqlx::{Pool, Postgres, Transaction};
use uuid::Uuid;

use vinfo_core::{Error, Result};

/// PostgreSQL-backed UUID → job id mapping.
#[derive(Clone)]
pub struct PgUuidMappingRepository {
    pool: Pool<Postgres>,
}

impl PgUuidMappingRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Resolve a client UUID to its job id.
    pub async fn get_job_id(&self, uuid: Uuid) -> Result<Option<Uuid>> {
        sqlx::query_scalar("SELECT job_id FROM uuid_job_mapping WHERE uuid = $1")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }

    /// Resolve a client UUID to its job id within a transaction.
    pub async fn get_job_id_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        uuid: Uuid,
    ) -> Result<Option<Uuid>> {
        sqlx::query_scalar("SELECT job_id FROM uuid_job_mapping WHERE uuid = $1")
            .bind(uuid)
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)
    }

    /// Record the mapping within the admission transaction.
    ///
    /// A unique violation here means another admission with the same UUID
    /// committed first and is reported as [`Error::DuplicateUuid`].
    pub async fn insert_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        uuid: Uuid,
        job_id: Uuid,
    ) -> Result<()> {
        sqlx::query("INSERT INTO uuid_job_mapping (uuid, job_id) VALUES ($1, $2)")
            .bind(uuid)
            .bind(job_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)
            .map_err(|e| e.or_duplicate(uuid))?;
        Ok(())
    }
}
