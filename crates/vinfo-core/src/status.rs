//! Projection of internal job lifecycle onto the client-visible status.
//!
//! Everything here is pure: the same job record always projects to the same
//! [`InfoJob`], so repeated status queries without an intervening transition
//! return identical responses.

use uuid::Uuid;

use crate::error::Result;
use crate::models::{InfoJob, InfoJobArgs, InfoStatus, Job, JobState};

impl From<JobState> for InfoStatus {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Available
            | JobState::Scheduled
            | JobState::Retryable
            | JobState::Pending => InfoStatus::Pending,
            JobState::Running => InfoStatus::Running,
            JobState::Completed => InfoStatus::Completed,
            JobState::Discarded | JobState::Cancelled => InfoStatus::Failed,
        }
    }
}

/// Build the client view of an info job.
///
/// The error text is the recorded outcome error when there is one; a job that
/// failed without recording an outcome reports its last attempt error instead.
/// A recorded extraction error always projects to `failed`, even though the
/// job itself completed.
pub fn project_info_job(uuid: Uuid, job: &Job) -> Result<InfoJob> {
    let args: InfoJobArgs = job.args_as()?;
    let (result, outcome_error) = match job.outcome()? {
        Some(outcome) => outcome.into_parts(),
        None => (None, None),
    };

    let mut status = InfoStatus::from(job.state);
    if outcome_error.is_some() && status == InfoStatus::Completed {
        status = InfoStatus::Failed;
    }

    let error = outcome_error.or_else(|| {
        (status == InfoStatus::Failed)
            .then(|| job.last_error().map(str::to_owned))
            .flatten()
    });

    Ok(InfoJob {
        uuid,
        status,
        video_path: args.path,
        result,
        error,
        created_at: job.created_at,
        updated_at: job.finalized_at.unwrap_or(job.created_at),
    })
}
