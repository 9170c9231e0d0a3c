//! Worker configuration.

use jobflow_core::state::DEFAULT_QUEUE;

/// Identity and queue subscription of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Identifies the server process; recorded in the `Processing` state.
    pub server_id: String,
    pub worker_id: String,
    /// Queues to fetch from, highest priority first.
    pub queues: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            server_id: format!("server-{}", std::process::id()),
            worker_id: "worker-1".to_string(),
            queues: vec![DEFAULT_QUEUE.to_string()],
        }
    }
}

impl WorkerConfig {
    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = server_id.into();
        self
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_queues<I, S>(mut self, queues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queues = queues.into_iter().map(Into::into).collect();
        self
    }
}
