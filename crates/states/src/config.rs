//! State change configuration.

use std::sync::Arc;
use std::time::Duration;

use jobflow_core::{BackgroundJob, DomainError};

pub const ENV_LOCK_TIMEOUT_MS: &str = "JOBFLOW_LOCK_TIMEOUT_MS";
pub const ENV_MAX_HISTORY: &str = "JOBFLOW_MAX_HISTORY";
pub const ENV_JOB_EXPIRATION_SECS: &str = "JOBFLOW_JOB_EXPIRATION_SECS";

/// Decides how many state history entries a job keeps.
///
/// Evaluated on every successful transition, after the new entry is
/// appended. Trimming evicts the oldest entries first.
pub trait HistoryRetentionPolicy: Send + Sync + core::fmt::Debug {
    /// `None` keeps the whole history.
    fn max_entries(&self, job: &BackgroundJob) -> Option<usize>;
}

/// Never trims.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAll;

impl HistoryRetentionPolicy for KeepAll {
    fn max_entries(&self, _job: &BackgroundJob) -> Option<usize> {
        None
    }
}

/// Keeps the newest `n` entries.
#[derive(Debug, Clone, Copy)]
pub struct KeepLast(pub usize);

impl HistoryRetentionPolicy for KeepLast {
    fn max_entries(&self, _job: &BackgroundJob) -> Option<usize> {
        Some(self.0)
    }
}

/// State change process configuration.
#[derive(Debug, Clone)]
pub struct StateChangeConfig {
    /// How long to wait for the per-job lock before failing.
    pub lock_timeout: Duration,
    /// How long a job in a final state is kept before it expires.
    pub job_expiration: Duration,
    pub history_retention: Arc<dyn HistoryRetentionPolicy>,
}

impl Default for StateChangeConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(30),
            job_expiration: Duration::from_secs(24 * 60 * 60),
            history_retention: Arc::new(KeepAll),
        }
    }
}

impl StateChangeConfig {
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_job_expiration(mut self, expiration: Duration) -> Self {
        self.job_expiration = expiration;
        self
    }

    pub fn with_history_retention(mut self, policy: impl HistoryRetentionPolicy + 'static) -> Self {
        self.history_retention = Arc::new(policy);
        self
    }

    /// Load overrides from `JOBFLOW_*` environment variables.
    pub fn from_env() -> Result<Self, DomainError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load overrides from an arbitrary key lookup; unset keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DomainError> {
        let mut config = Self::default();

        if let Some(ms) = parse::<u64>(&lookup, ENV_LOCK_TIMEOUT_MS)? {
            config.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse::<u64>(&lookup, ENV_JOB_EXPIRATION_SECS)? {
            config.job_expiration = Duration::from_secs(secs);
        }
        if let Some(max) = parse::<usize>(&lookup, ENV_MAX_HISTORY)? {
            config.history_retention = Arc::new(KeepLast(max));
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, DomainError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| DomainError::validation(format!("{key}: invalid value '{raw}'"))),
    }
}
