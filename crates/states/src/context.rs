//! Contexts handed to the state change process and its extension points.

use std::time::Duration;

use anyhow::Context as _;
use serde::Serialize;
use serde::de::DeserializeOwned;

use jobflow_core::{BackgroundJob, CancellationToken, JobId, StateValue, payload};
use jobflow_storage::StorageConnection;

/// A request to move one job to a candidate state.
///
/// Built per call and consumed by the process; never reused. The
/// connection is borrowed, not owned.
pub struct StateChangeContext<'a> {
    pub job_id: JobId,
    pub new_state: StateValue,
    /// Only transition from one of these states. Empty means "any".
    pub expected_states: Vec<String>,
    /// Skip election and applied filters (handlers still run).
    pub disable_filters: bool,
    pub connection: &'a dyn StorageConnection,
    /// Shutdown signal, exposed to filters. It never aborts the transition.
    pub cancellation: CancellationToken,
}

impl<'a> StateChangeContext<'a> {
    pub fn new(connection: &'a dyn StorageConnection, job_id: JobId, new_state: StateValue) -> Self {
        Self {
            job_id,
            new_state,
            expected_states: Vec::new(),
            disable_filters: false,
            connection,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn expecting<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_states = states.into_iter().map(Into::into).collect();
        self
    }

    pub fn without_filters(mut self) -> Self {
        self.disable_filters = true;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }
}

/// Whether `current` satisfies an expected-state precondition.
///
/// An empty expectation accepts anything; a job without a state satisfies
/// no non-empty expectation.
pub(crate) fn is_expected(expected: &[String], current: Option<&str>) -> bool {
    if expected.is_empty() {
        return true;
    }
    current.is_some_and(|c| expected.iter().any(|e| e.eq_ignore_ascii_case(c)))
}

/// What an election filter sees while the candidate is being chosen.
pub struct ElectStateContext<'a> {
    pub background_job: &'a BackgroundJob,
    /// State recorded when the job was loaded for this transition.
    pub current_state: Option<&'a str>,
    pub connection: &'a dyn StorageConnection,
    pub cancellation: &'a CancellationToken,
}

impl ElectStateContext<'_> {
    /// Read a job parameter; absent parameters decode to `T::default()`.
    pub fn job_parameter<T>(&self, name: &str) -> anyhow::Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let raw = self
            .connection
            .get_job_parameter(&self.background_job.id, name)?;
        payload::from_optional_payload(raw.as_deref())
            .with_context(|| format!("job parameter '{name}' is malformed"))
    }

    pub fn set_job_parameter<T>(&self, name: &str, value: &T) -> anyhow::Result<()>
    where
        T: Serialize + ?Sized,
    {
        let encoded = payload::to_payload(value)?;
        self.connection
            .set_job_parameter(&self.background_job.id, name, &encoded)?;
        Ok(())
    }
}

/// What handlers and applied filters see inside the transaction.
pub struct ApplyStateContext<'a> {
    pub background_job: &'a BackgroundJob,
    /// State being left (re-read under the lock), if any.
    pub old_state: Option<&'a str>,
    pub new_state: &'a StateValue,
    pub connection: &'a dyn StorageConnection,
    pub cancellation: &'a CancellationToken,
    /// Expiration applied when `new_state` is final.
    pub job_expiration: Duration,
}

impl ApplyStateContext<'_> {
    pub fn job_id(&self) -> &JobId {
        &self.background_job.id
    }
}
