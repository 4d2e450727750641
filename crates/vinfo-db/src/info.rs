//! Admission and status queries for info jobs.
//!
//! Admission is one transaction: dedup lookup, job insert, mapping insert,
//! commit. Nothing becomes visible to workers or to status queries unless
//! all three writes commit together.

use std::time::Instant;

use sqlx::{Pool, Postgres};
use tracing::{debug, info, warn};
use uuid::Uuid;

use vinfo_core::{
    project_info_job, Error, InfoJob, InfoJobArgs, JobRepository, NewJob, Result,
};

use crate::jobs::PgJobRepository;
use crate::uuid_mapping::PgUuidMappingRepository;

/// Repository coordinating the queue and the dedup index for info jobs.
#[derive(Clone)]
pub struct PgInfoRepository {
    pool: Pool<Postgres>,
    jobs: PgJobRepository,
    mappings: PgUuidMappingRepository,
}

impl PgInfoRepository {
    pub fn new(pool: Pool<Postgres>, jobs: PgJobRepository, mappings: PgUuidMappingRepository) -> Self {
        Self {
            pool,
            jobs,
            mappings,
        }
    }

    /// Admit an info job under its client UUID.
    ///
    /// Returns [`Error::DuplicateUuid`] when the UUID was admitted before,
    /// whether the earlier admission is found by the lookup or wins a race
    /// on the mapping primary key. On any error the transaction is rolled
    /// back, so a failed admission can be retried with the same UUID.
    pub async fn admit(&self, args: InfoJobArgs) -> Result<InfoJob> {
        let start = Instant::now();
        let uuid = args.uuid;
        let new_job = NewJob::from_args(&args)?;

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        if let Some(existing) = self.mappings.get_job_id_tx(&mut tx, uuid).await? {
            debug!(
                subsystem = "info",
                op = "admit",
                %uuid,
                job_id = %existing,
                "Rejecting duplicate info job"
            );
            return Err(Error::DuplicateUuid(uuid));
        }

        let job = self.jobs.insert_tx(&mut tx, new_job).await?;
        self.mappings.insert_tx(&mut tx, uuid, job.id).await?;
        tx.commit()
            .await
            .map_err(Error::Database)
            .map_err(|e| e.or_duplicate(uuid))?;

        self.jobs.wake_workers();

        info!(
            subsystem = "info",
            op = "admit",
            %uuid,
            job_id = %job.id,
            video_path = %args.path,
            webhook = args.webhook_uri.is_some(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Info job admitted"
        );

        project_info_job(uuid, &job)
    }

    /// Current client view of the info job admitted under `uuid`.
    ///
    /// A mapping whose job row no longer exists is reported as not found.
    pub async fn status(&self, uuid: Uuid) -> Result<InfoJob> {
        let job_id = self
            .mappings
            .get_job_id(uuid)
            .await?
            .ok_or(Error::InfoNotFound(uuid))?;

        let Some(job) = self.jobs.get(job_id).await? else {
            warn!(
                subsystem = "info",
                op = "status",
                %uuid,
                %job_id,
                "Dedup mapping points at a missing job"
            );
            return Err(Error::InfoNotFound(uuid));
        };

        project_info_job(uuid, &job)
    }
}
