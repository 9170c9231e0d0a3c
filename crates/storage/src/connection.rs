use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jobflow_core::{BackgroundJob, DomainError, Job, JobId, StateValue};

use crate::error::StorageError;
use crate::lock::DistributedLockHandle;

/// Raw job record as kept by a backend.
///
/// The invocation data stays opaque until [`JobData::into_background_job`]
/// decodes it, so a corrupt record can still be reported rather than
/// failing the read itself.
#[derive(Debug, Clone, PartialEq)]
pub struct JobData {
    pub invocation_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// Name of the current state, if the job has one yet.
    pub state: Option<String>,
}

impl JobData {
    pub fn into_background_job(self, id: JobId) -> Result<BackgroundJob, DomainError> {
        let job = Job::from_invocation_data(&self.invocation_data)?;
        Ok(BackgroundJob::new(id, job, self.created_at))
    }
}

/// One entry of a job's state history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateHistoryEntry {
    pub state: StateValue,
    pub recorded_at: DateTime<Utc>,
}

/// Connection to a job storage backend.
///
/// ## Design Principles
///
/// - **No storage assumptions**: works with the in-memory backend (tests/dev)
///   and SQL / key-value backends alike
/// - **Borrowed per call**: the state change process and perform context
///   borrow a connection; they never own or cache one
/// - **Cross-process locking**: `acquire_distributed_lock` must exclude
///   holders in *other processes* sharing the backend, not just other threads
///
/// Reads may be called more than once per transition; each call must reflect
/// the latest committed data.
pub trait StorageConnection: Send + Sync {
    /// Load a job record. Expired or unknown jobs yield `None`.
    fn load_job_data(&self, job_id: &JobId) -> Result<Option<JobData>, StorageError>;

    /// Name of the job's current state.
    fn get_job_state(&self, job_id: &JobId) -> Result<Option<String>, StorageError>;

    /// State history, oldest first.
    fn get_state_history(&self, job_id: &JobId) -> Result<Vec<StateHistoryEntry>, StorageError>;

    /// Store a serialized parameter under `(job_id, name)`.
    fn set_job_parameter(&self, job_id: &JobId, name: &str, value: &str)
    -> Result<(), StorageError>;

    /// Read a serialized parameter stored under `(job_id, name)`.
    fn get_job_parameter(&self, job_id: &JobId, name: &str) -> Result<Option<String>, StorageError>;

    /// Pop the next job id from the first non-empty queue, in the given
    /// priority order.
    fn fetch_next_job(&self, queues: &[String]) -> Result<Option<JobId>, StorageError>;

    /// Start a buffered, all-or-nothing write transaction.
    fn create_write_transaction(&self) -> Box<dyn WriteTransaction + '_>;

    /// Acquire an exclusive lock on `resource`, waiting at most `timeout`.
    ///
    /// Fails with [`StorageError::LockTimeout`] when the wait expires.
    fn acquire_distributed_lock(
        &self,
        resource: &str,
        timeout: Duration,
    ) -> Result<DistributedLockHandle<'_>, StorageError>;
}

/// Buffered write transaction.
///
/// Write calls only record intent; nothing becomes visible to other
/// observers until [`WriteTransaction::commit`] succeeds. Dropping a
/// transaction without committing discards it.
pub trait WriteTransaction: Send {
    /// Make `state` the job's current state.
    fn set_job_state(&mut self, job_id: &JobId, state: &StateValue);

    /// Append `state` to the job's state history.
    fn add_job_history_entry(&mut self, job_id: &JobId, state: &StateValue);

    /// Trim the history to its newest `max_entries` entries.
    fn expire_history(&mut self, job_id: &JobId, max_entries: usize);

    /// Let the job (with its parameters and history) expire after `expire_in`.
    fn expire_job(&mut self, job_id: &JobId, expire_in: Duration);

    /// Cancel a pending expiration.
    fn persist_job(&mut self, job_id: &JobId);

    fn add_to_set(&mut self, key: &str, value: &str, score: f64);

    fn remove_from_set(&mut self, key: &str, value: &str);

    fn increment_counter(&mut self, key: &str);

    /// Append the job to the named queue.
    fn add_to_queue(&mut self, queue: &str, job_id: &JobId);

    /// Apply every buffered write atomically.
    fn commit(self: Box<Self>) -> Result<(), StorageError>;
}

impl<S> StorageConnection for Arc<S>
where
    S: StorageConnection + ?Sized,
{
    fn load_job_data(&self, job_id: &JobId) -> Result<Option<JobData>, StorageError> {
        (**self).load_job_data(job_id)
    }

    fn get_job_state(&self, job_id: &JobId) -> Result<Option<String>, StorageError> {
        (**self).get_job_state(job_id)
    }

    fn get_state_history(&self, job_id: &JobId) -> Result<Vec<StateHistoryEntry>, StorageError> {
        (**self).get_state_history(job_id)
    }

    fn set_job_parameter(
        &self,
        job_id: &JobId,
        name: &str,
        value: &str,
    ) -> Result<(), StorageError> {
        (**self).set_job_parameter(job_id, name, value)
    }

    fn get_job_parameter(&self, job_id: &JobId, name: &str) -> Result<Option<String>, StorageError> {
        (**self).get_job_parameter(job_id, name)
    }

    fn fetch_next_job(&self, queues: &[String]) -> Result<Option<JobId>, StorageError> {
        (**self).fetch_next_job(queues)
    }

    fn create_write_transaction(&self) -> Box<dyn WriteTransaction + '_> {
        (**self).create_write_transaction()
    }

    fn acquire_distributed_lock(
        &self,
        resource: &str,
        timeout: Duration,
    ) -> Result<DistributedLockHandle<'_>, StorageError> {
        (**self).acquire_distributed_lock(resource, timeout)
    }
}
