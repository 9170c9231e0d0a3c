use std::time::Duration;

use thiserror::Error;

use jobflow_core::JobId;

/// Storage operation error.
///
/// These are **infrastructure errors** (availability, contention,
/// transaction failure) as opposed to domain errors. Callers must never
/// treat them as "nothing happened".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("timed out after {timeout:?} waiting for lock on '{resource}'")]
    LockTimeout { resource: String, timeout: Duration },

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("job already exists: {0}")]
    JobAlreadyExists(JobId),

    #[error("transaction failed: {0}")]
    Transaction(String),
}

impl StorageError {
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, StorageError::LockTimeout { .. })
    }
}
