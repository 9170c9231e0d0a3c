//! Cooperative cancellation of a running job.
//!
//! Job bodies poll their token at safe points. A token reports *why* the job
//! should stop, because the worker reacts differently: a shutdown puts the
//! job back on its queue, an abort leaves it in whatever state aborted it.

use thiserror::Error;
use tracing::warn;

use jobflow_core::state::names;
use jobflow_core::{CancellationToken, JobId};
use jobflow_storage::StorageConnection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JobCancelled {
    #[error("the server is shutting down")]
    Shutdown,
    /// The job left the `Processing` state (or vanished) while running.
    #[error("the job was aborted")]
    Aborted,
}

pub trait JobCancellationToken: Send + Sync {
    /// Why the job should stop, if it should.
    fn cancellation_requested(&self) -> Option<JobCancelled>;

    fn is_cancellation_requested(&self) -> bool {
        self.cancellation_requested().is_some()
    }

    /// Fail with the cancellation reason once cancellation was requested.
    ///
    /// Job bodies propagate this with `?` to stop at a safe point.
    fn check(&self) -> Result<(), JobCancelled> {
        match self.cancellation_requested() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}

/// Token used by workers: watches the server shutdown signal and the job's
/// stored state.
pub struct ServerJobCancellationToken<'a> {
    connection: &'a dyn StorageConnection,
    job_id: JobId,
    shutdown: CancellationToken,
}

impl<'a> ServerJobCancellationToken<'a> {
    pub fn new(
        connection: &'a dyn StorageConnection,
        job_id: JobId,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            connection,
            job_id,
            shutdown,
        }
    }
}

impl JobCancellationToken for ServerJobCancellationToken<'_> {
    fn cancellation_requested(&self) -> Option<JobCancelled> {
        if self.shutdown.is_cancelled() {
            return Some(JobCancelled::Shutdown);
        }

        match self.connection.get_job_state(&self.job_id) {
            Ok(Some(state)) if state.eq_ignore_ascii_case(names::PROCESSING) => None,
            Ok(_) => Some(JobCancelled::Aborted),
            Err(err) => {
                // An unreachable backend says nothing about the job itself.
                warn!(job_id = %self.job_id, error = %err, "could not check job state for abort");
                None
            }
        }
    }
}

/// Never requests cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancelled;

impl JobCancellationToken for NeverCancelled {
    fn cancellation_requested(&self) -> Option<JobCancelled> {
        None
    }
}
