//! The state change protocol.

use tracing::{debug, info, warn};

use jobflow_core::{BackgroundJob, StateValue};
use jobflow_storage::StorageError;

use crate::config::StateChangeConfig;
use crate::context::{ApplyStateContext, ElectStateContext, StateChangeContext, is_expected};
use crate::error::StateChangeError;
use crate::filter::JobFilters;
use crate::handlers::StateHandlerCollection;

/// Why a state change ended without a transition.
///
/// These are expected outcomes, not failures: nothing was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoTransitionReason {
    /// No job data under this id (never existed or expired).
    JobNotFound,
    /// The job exists but its data could not be decoded.
    JobDataUnavailable(String),
    /// The current state was not one of the expected ones.
    UnexpectedState {
        expected: Vec<String>,
        actual: Option<String>,
    },
}

/// Result of a state change that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChangeOutcome {
    /// The state (possibly replaced by election filters) is now current.
    Applied(StateValue),
    NoTransition(NoTransitionReason),
}

impl StateChangeOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, StateChangeOutcome::Applied(_))
    }

    pub fn applied_state(self) -> Option<StateValue> {
        match self {
            StateChangeOutcome::Applied(state) => Some(state),
            StateChangeOutcome::NoTransition(_) => None,
        }
    }
}

/// Moves a job to a new state, respecting filters and handlers.
pub trait StateChangeProcess: Send + Sync {
    /// Attempt the transition, distinguishing every outcome.
    fn try_change_state(
        &self,
        context: StateChangeContext<'_>,
    ) -> Result<StateChangeOutcome, StateChangeError>;

    /// Attempt the transition.
    ///
    /// Returns `Ok(None)` if the job data could not be loaded or the
    /// expected-state constraint failed, otherwise the final applied state.
    /// Infrastructure failures are errors, never `Ok(None)`.
    fn change_state(
        &self,
        context: StateChangeContext<'_>,
    ) -> Result<Option<StateValue>, StateChangeError> {
        self.try_change_state(context)
            .map(StateChangeOutcome::applied_state)
    }
}

/// Default [`StateChangeProcess`].
///
/// Filters and handlers are resolved once at construction; every call runs
/// the fixed sequence:
///
/// 1. **Lock**: per-job distributed lock for the whole call
/// 2. **Load**: fresh job data (absent/corrupt → no transition)
/// 3. **Elect**: election filters, each seeing the previous one's output
/// 4. **Check**: expected states against a re-read current state
/// 5. **Apply** (one transaction): old state's handlers unapply, new state's
///    handlers apply, state + history persisted, applied filters notified
/// 6. **Commit**
#[derive(Debug, Clone, Default)]
pub struct StateChanger {
    handlers: StateHandlerCollection,
    filters: JobFilters,
    config: StateChangeConfig,
}

impl StateChanger {
    pub fn new(
        handlers: StateHandlerCollection,
        filters: JobFilters,
        config: StateChangeConfig,
    ) -> Self {
        Self {
            handlers,
            filters,
            config,
        }
    }

    pub fn config(&self) -> &StateChangeConfig {
        &self.config
    }

    fn elect(
        &self,
        context: &ElectStateContext<'_>,
        candidate: StateValue,
        traversed: &mut Vec<StateValue>,
    ) -> Result<StateValue, StateChangeError> {
        let mut current = candidate;
        for filter in self.filters.election_filters() {
            let before = current.clone();
            current = filter
                .on_state_election(context, current)
                .map_err(|source| StateChangeError::Filter {
                    filter: filter.name().to_string(),
                    source,
                })?;
            if current != before {
                debug!(
                    job_id = %context.background_job.id,
                    filter = filter.name(),
                    from = before.name(),
                    to = current.name(),
                    "candidate state replaced"
                );
                traversed.push(before);
            }
        }
        Ok(current)
    }

    fn apply(
        &self,
        context: &ApplyStateContext<'_>,
        traversed: &[StateValue],
        disable_filters: bool,
    ) -> Result<(), StateChangeError> {
        let job_id = context.job_id();
        let new_state = context.new_state;
        let mut transaction = context.connection.create_write_transaction();

        if let Some(old_state) = context.old_state {
            for handler in self.handlers.get(old_state) {
                handler
                    .unapply(context, &mut *transaction)
                    .map_err(|source| StateChangeError::Handler {
                        state: old_state.to_string(),
                        source,
                    })?;
            }
            if !disable_filters {
                for filter in self.filters.apply_filters() {
                    filter
                        .on_state_unapplied(context, &mut *transaction)
                        .map_err(|source| StateChangeError::Filter {
                            filter: filter.name().to_string(),
                            source,
                        })?;
                }
            }
        }

        for handler in self.handlers.get(new_state.name()) {
            handler
                .apply(context, &mut *transaction)
                .map_err(|source| StateChangeError::Handler {
                    state: new_state.name().to_string(),
                    source,
                })?;
        }

        transaction.set_job_state(job_id, new_state);
        for state in traversed {
            transaction.add_job_history_entry(job_id, state);
        }
        transaction.add_job_history_entry(job_id, new_state);
        if let Some(max) = self
            .config
            .history_retention
            .max_entries(context.background_job)
        {
            transaction.expire_history(job_id, max);
        }
        if new_state.is_final() {
            transaction.expire_job(job_id, context.job_expiration);
        } else {
            transaction.persist_job(job_id);
        }

        if !disable_filters {
            for filter in self.filters.apply_filters() {
                filter
                    .on_state_applied(context, &mut *transaction)
                    .map_err(|source| StateChangeError::Filter {
                        filter: filter.name().to_string(),
                        source,
                    })?;
            }
        }

        transaction.commit()?;
        Ok(())
    }
}

impl StateChangeProcess for StateChanger {
    fn try_change_state(
        &self,
        context: StateChangeContext<'_>,
    ) -> Result<StateChangeOutcome, StateChangeError> {
        let StateChangeContext {
            job_id,
            new_state,
            expected_states,
            disable_filters,
            connection,
            cancellation,
        } = context;

        // 1) Serialize transitions of this job across processes.
        let timeout = self.config.lock_timeout;
        let _lock = connection
            .acquire_distributed_lock(&job_id.lock_resource(), timeout)
            .map_err(|err| match err {
                StorageError::LockTimeout { .. } => {
                    warn!(%job_id, ?timeout, "state lock contention");
                    StateChangeError::LockTimeout {
                        job_id: job_id.clone(),
                        timeout,
                    }
                }
                other => StateChangeError::Storage(other),
            })?;

        // 2) Load fresh job data.
        let Some(job_data) = connection.load_job_data(&job_id)? else {
            debug!(%job_id, "job data not found, no transition");
            return Ok(StateChangeOutcome::NoTransition(
                NoTransitionReason::JobNotFound,
            ));
        };
        let loaded_state = job_data.state.clone();
        let background_job: BackgroundJob = match job_data.into_background_job(job_id.clone()) {
            Ok(job) => job,
            Err(err) => {
                warn!(%job_id, error = %err, "job data could not be loaded, no transition");
                return Ok(StateChangeOutcome::NoTransition(
                    NoTransitionReason::JobDataUnavailable(err.to_string()),
                ));
            }
        };

        // 3) Elect the final candidate.
        let mut traversed = Vec::new();
        let elected = if disable_filters {
            new_state
        } else {
            let elect_context = ElectStateContext {
                background_job: &background_job,
                current_state: loaded_state.as_deref(),
                connection,
                cancellation: &cancellation,
            };
            self.elect(&elect_context, new_state, &mut traversed)?
        };

        // 4) Re-read the current state; filters may have taken a while.
        let current_state = connection.get_job_state(&job_id)?;
        if !is_expected(&expected_states, current_state.as_deref()) {
            debug!(
                %job_id,
                expected = ?expected_states,
                actual = ?current_state,
                "current state not expected, no transition"
            );
            return Ok(StateChangeOutcome::NoTransition(
                NoTransitionReason::UnexpectedState {
                    expected: expected_states,
                    actual: current_state,
                },
            ));
        }

        // 5) + 6) Apply and commit.
        let apply_context = ApplyStateContext {
            background_job: &background_job,
            old_state: current_state.as_deref(),
            new_state: &elected,
            connection,
            cancellation: &cancellation,
            job_expiration: self.config.job_expiration,
        };
        self.apply(&apply_context, &traversed, disable_filters)?;

        info!(
            %job_id,
            from = current_state.as_deref().unwrap_or("<none>"),
            to = elected.name(),
            reason = elected.reason().unwrap_or(""),
            "job state changed"
        );
        Ok(StateChangeOutcome::Applied(elected))
    }
}

