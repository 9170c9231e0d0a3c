//! Automatic retries: an election filter that turns failures into
//! rescheduling while attempts remain.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use jobflow_core::StateValue;
use jobflow_core::state::names;

use crate::context::ElectStateContext;
use crate::filter::ElectStateFilter;

/// Job parameter counting the retries already scheduled.
pub const RETRY_COUNT_PARAMETER: &str = "RetryCount";

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^(attempt - 1)
    #[default]
    Exponential,
    /// Linear backoff: base * attempt
    Linear,
}

/// Retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Jitter factor (0.0-1.0) to spread retries of many jobs apart
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(15),
            max_delay: Duration::from_secs(60 * 60),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }

    /// Delay before retry number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => {
                let exp = 2_f64.powi((attempt - 1).min(62) as i32);
                (base_ms * exp).min(max_ms)
            }
            BackoffStrategy::Linear => (base_ms * attempt as f64).min(max_ms),
        };

        // Deterministic jitter derived from the attempt number.
        let jitter_range = delay_ms * self.jitter;
        let jitter = if jitter_range > 0.0 {
            let pseudo_random = ((attempt as f64 * 17.0) % 100.0) / 100.0;
            jitter_range * (pseudo_random - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }

    /// Whether a job that has been retried `retries_so_far` times may retry again.
    pub fn should_retry(&self, retries_so_far: u32) -> bool {
        retries_so_far < self.max_attempts
    }
}

/// What happens to a failed job once its retries are used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttemptsExceeded {
    /// Keep the `Failed` state.
    #[default]
    Fail,
    /// Replace it with `Deleted`.
    Delete,
}

/// Replaces a `Failed` candidate with `Scheduled` while retries remain.
///
/// The retry count lives in the [`RETRY_COUNT_PARAMETER`] job parameter,
/// so it survives across workers and restarts.
#[derive(Debug, Clone, Default)]
pub struct AutomaticRetry {
    policy: RetryPolicy,
    on_attempts_exceeded: AttemptsExceeded,
}

impl AutomaticRetry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            on_attempts_exceeded: AttemptsExceeded::Fail,
        }
    }

    pub fn on_attempts_exceeded(mut self, action: AttemptsExceeded) -> Self {
        self.on_attempts_exceeded = action;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl ElectStateFilter for AutomaticRetry {
    fn name(&self) -> &str {
        "automatic-retry"
    }

    fn on_state_election(
        &self,
        context: &ElectStateContext<'_>,
        candidate: StateValue,
    ) -> anyhow::Result<StateValue> {
        if !candidate.is(names::FAILED) {
            return Ok(candidate);
        }

        let job_id = &context.background_job.id;
        let retries: u32 = context.job_parameter(RETRY_COUNT_PARAMETER)?;
        let max = self.policy.max_attempts;

        if self.policy.should_retry(retries) {
            let attempt = retries + 1;
            context.set_job_parameter(RETRY_COUNT_PARAMETER, &attempt)?;

            let delay = self.policy.delay_for_attempt(attempt);
            let enqueue_at =
                Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
            let cause = candidate.reason().unwrap_or("job failed");

            info!(%job_id, attempt, max, ?delay, "scheduling automatic retry");
            return Ok(StateValue::scheduled(enqueue_at)
                .with_reason(format!("Retry attempt {attempt} of {max}: {cause}")));
        }

        match self.on_attempts_exceeded {
            AttemptsExceeded::Fail => {
                warn!(%job_id, max, "retry attempts exhausted, leaving job failed");
                Ok(candidate)
            }
            AttemptsExceeded::Delete => {
                warn!(%job_id, max, "retry attempts exhausted, deleting job");
                Ok(StateValue::deleted().with_reason(format!(
                    "Exceeded the maximum number of retry attempts ({max})"
                )))
            }
        }
    }
}
