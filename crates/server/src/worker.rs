//! One fetch-perform-transition cycle.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use jobflow_core::state::{DEFAULT_QUEUE, keys, names};
use jobflow_core::{CancellationToken, JobId, StateValue, payload};
use jobflow_states::{StateChangeContext, StateChangeProcess};
use jobflow_storage::StorageConnection;

use crate::cancellation::{JobCancelled, ServerJobCancellationToken};
use crate::config::WorkerConfig;
use crate::context::{PerformContext, WorkerContext};
use crate::error::{PerformError, WorkerError};
use crate::performer::JobPerformer;

/// How a worker cycle ended for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    /// The job did not enter `Processing`, either rejected or elected into
    /// another state; nothing was performed.
    Skipped,
    /// The job ran and its result was applied. The state is whatever the
    /// election settled on, e.g. `Scheduled` for a retried failure.
    Completed(StateValue),
    /// Shutdown interrupted the job; it is back on its queue.
    Requeued { queue: String },
    /// The job left `Processing` while it ran; its state was left alone.
    Aborted,
}

/// Executes jobs one at a time.
pub struct Worker<S> {
    storage: S,
    state_changer: Arc<dyn StateChangeProcess>,
    performer: JobPerformer,
    config: WorkerConfig,
    context: WorkerContext,
    shutdown: CancellationToken,
}

impl<S: StorageConnection> Worker<S> {
    pub fn new(
        storage: S,
        state_changer: impl StateChangeProcess + 'static,
        performer: JobPerformer,
        config: WorkerConfig,
    ) -> Self {
        let context = WorkerContext::from(&config);
        Self {
            storage,
            state_changer: Arc::new(state_changer),
            performer,
            config,
            context,
            shutdown: CancellationToken::new(),
        }
    }

    /// Share a server-wide shutdown token.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Fetch the next job from the configured queues and process it.
    ///
    /// Returns `None` when every queue is empty or shutdown was requested.
    pub fn run_once(&self) -> Result<Option<(JobId, WorkOutcome)>, WorkerError> {
        if self.shutdown.is_cancelled() {
            return Ok(None);
        }
        let Some(job_id) = self.storage.fetch_next_job(&self.config.queues)? else {
            return Ok(None);
        };
        let outcome = self.process(&job_id)?;
        Ok(Some((job_id, outcome)))
    }

    /// Move `job_id` to `Processing`, perform it and apply its result.
    pub fn process(&self, job_id: &JobId) -> Result<WorkOutcome, WorkerError> {
        let processing = StateValue::processing(&self.context.server_id, &self.context.worker_id);
        let started = self.change_state(job_id, processing, &[names::ENQUEUED, names::SCHEDULED])?;
        if !matches!(&started, Some(state) if state.is(names::PROCESSING)) {
            debug!(
                %job_id,
                state = ?started.as_ref().map(StateValue::name),
                "job did not enter processing, skipping"
            );
            return Ok(WorkOutcome::Skipped);
        }

        let Some(job_data) = self.storage.load_job_data(job_id)? else {
            return Ok(WorkOutcome::Aborted);
        };
        let background_job = job_data.into_background_job(job_id.clone())?;
        let latency_ms = (Utc::now() - background_job.created_at)
            .num_milliseconds()
            .max(0) as u64;

        let token =
            ServerJobCancellationToken::new(&self.storage, job_id.clone(), self.shutdown.clone());
        let mut context =
            PerformContext::new(&self.context, &self.storage, background_job, &token);

        let timer = Instant::now();
        let result = self.performer.perform(&mut context);
        let duration_ms = timer.elapsed().as_millis() as u64;
        drop(context);

        let state = match result {
            Ok(value) => {
                let result = match value {
                    Value::Null => None,
                    value => Some(payload::to_payload(&value).map_err(WorkerError::Result)?),
                };
                StateValue::succeeded(result, latency_ms, duration_ms)
            }
            Err(PerformError::Cancelled(JobCancelled::Shutdown)) => {
                return self.requeue(job_id);
            }
            Err(PerformError::Cancelled(JobCancelled::Aborted)) => {
                info!(%job_id, "job aborted while processing");
                return Ok(WorkOutcome::Aborted);
            }
            Err(err) => {
                warn!(%job_id, error = %err, "job failed");
                StateValue::failed(err.to_string(), err.details())
            }
        };

        match self.change_state(job_id, state, &[names::PROCESSING])? {
            Some(applied) => Ok(WorkOutcome::Completed(applied)),
            None => {
                info!(%job_id, "job left processing before its result was applied");
                Ok(WorkOutcome::Aborted)
            }
        }
    }

    fn requeue(&self, job_id: &JobId) -> Result<WorkOutcome, WorkerError> {
        let queue = self.original_queue(job_id)?;
        let state = StateValue::enqueued(queue.clone()).with_reason("Server is shutting down");
        match self.change_state(job_id, state, &[names::PROCESSING])? {
            Some(_) => {
                info!(%job_id, queue = %queue, "job requeued on shutdown");
                Ok(WorkOutcome::Requeued { queue })
            }
            None => Ok(WorkOutcome::Aborted),
        }
    }

    /// Queue of the job's latest `Enqueued` state, else the first configured.
    fn original_queue(&self, job_id: &JobId) -> Result<String, WorkerError> {
        let history = self.storage.get_state_history(job_id)?;
        let queue = history
            .iter()
            .rev()
            .filter(|e| e.state.is(names::ENQUEUED))
            .find_map(|e| e.state.get(keys::QUEUE))
            .or_else(|| self.config.queues.first().map(String::as_str))
            .unwrap_or(DEFAULT_QUEUE);
        Ok(queue.to_string())
    }

    fn change_state(
        &self,
        job_id: &JobId,
        state: StateValue,
        expected: &[&str],
    ) -> Result<Option<StateValue>, WorkerError> {
        let context = StateChangeContext::new(&self.storage, job_id.clone(), state)
            .expecting(expected.iter().copied())
            .with_cancellation(self.shutdown.clone());
        Ok(self.state_changer.change_state(context)?)
    }
}

impl<S> core::fmt::Debug for Worker<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Worker")
            .field("config", &self.config)
            .field("performer", &self.performer)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}
