use std::time::Duration;

use thiserror::Error;

use jobflow_core::JobId;
use jobflow_storage::StorageError;

/// Infrastructure and extension failures of a state change.
///
/// Unlike "job not found" or "unexpected current state", these are never
/// silent: the transition did not happen *and* something is wrong. Nothing
/// from the failed attempt is visible in storage.
#[derive(Debug, Error)]
pub enum StateChangeError {
    /// The per-job lock could not be acquired in time (contention). The
    /// caller may retry at its discretion.
    #[error("timed out after {timeout:?} waiting for the state lock of job {job_id}")]
    LockTimeout { job_id: JobId, timeout: Duration },

    /// A read, write or commit failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("filter '{filter}' failed")]
    Filter {
        filter: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("handler for state '{state}' failed")]
    Handler {
        state: String,
        #[source]
        source: anyhow::Error,
    },
}

impl StateChangeError {
    pub fn is_contention(&self) -> bool {
        matches!(self, StateChangeError::LockTimeout { .. })
    }
}
