use thiserror::Error;

use jobflow_core::DomainError;
use jobflow_states::StateChangeError;
use jobflow_storage::StorageError;

use crate::cancellation::JobCancelled;

/// Failures of the job parameter accessors.
#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("job parameter name must not be empty")]
    InvalidName,

    #[error("job parameter '{name}' could not be serialized")]
    Serialization {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// The parameter exists but does not decode as the requested type.
    #[error("job parameter '{name}' could not be retrieved")]
    Retrieval {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("job parameter '{name}' could not be accessed")]
    Storage {
        name: String,
        #[source]
        source: StorageError,
    },
}

/// Why performing a job produced no result.
#[derive(Debug, Error)]
pub enum PerformError {
    /// Cooperative cancellation; not a crash of the job body.
    #[error("job performance was cancelled: {0}")]
    Cancelled(#[from] JobCancelled),

    #[error("job '{job}' failed: {source}")]
    Failed {
        job: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("server filter '{filter}' failed: {source}")]
    Filter {
        filter: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PerformError {
    /// Failure summary followed by its cause chain, one cause per line.
    ///
    /// The summary already names the immediate source, so the chain starts
    /// at its cause.
    pub fn details(&self) -> String {
        let mut details = self.to_string();
        let mut source = std::error::Error::source(self).and_then(|s| s.source());
        while let Some(cause) = source {
            details.push_str("\ncaused by: ");
            details.push_str(&cause.to_string());
            source = cause.source();
        }
        details
    }
}

/// Infrastructure failures of a worker cycle.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    StateChange(#[from] StateChangeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("job data could not be loaded")]
    JobData(#[from] DomainError),

    #[error("job result could not be serialized")]
    Result(#[source] serde_json::Error),
}
