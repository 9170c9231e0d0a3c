//! State values: named transition targets.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Names of the well-known lifecycle states.
pub mod names {
    pub const ENQUEUED: &str = "Enqueued";
    pub const PROCESSING: &str = "Processing";
    pub const SUCCEEDED: &str = "Succeeded";
    pub const FAILED: &str = "Failed";
    pub const SCHEDULED: &str = "Scheduled";
    pub const DELETED: &str = "Deleted";
}

/// Data keys written by the well-known state builders.
pub mod keys {
    pub const QUEUE: &str = "Queue";
    pub const ENQUEUED_AT: &str = "EnqueuedAt";
    pub const SERVER_ID: &str = "ServerId";
    pub const WORKER_ID: &str = "WorkerId";
    pub const STARTED_AT: &str = "StartedAt";
    pub const SUCCEEDED_AT: &str = "SucceededAt";
    pub const RESULT: &str = "Result";
    pub const LATENCY: &str = "Latency";
    pub const PERFORMANCE_DURATION: &str = "PerformanceDuration";
    pub const FAILED_AT: &str = "FailedAt";
    pub const EXCEPTION_MESSAGE: &str = "ExceptionMessage";
    pub const EXCEPTION_DETAILS: &str = "ExceptionDetails";
    pub const ENQUEUE_AT: &str = "EnqueueAt";
    pub const SCHEDULED_AT: &str = "ScheduledAt";
    pub const DELETED_AT: &str = "DeletedAt";
}

/// Queue used when none is given.
pub const DEFAULT_QUEUE: &str = "default";

/// A named, immutable transition target.
///
/// `data` holds state-specific fields serialized as strings, ordered by
/// key. A value is never mutated once handed to the state change process;
/// election filters that want a different target build a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateValue {
    name: String,
    reason: Option<String>,
    data: BTreeMap<String, String>,
    is_final: bool,
}

impl StateValue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: None,
            data: BTreeMap::new(),
            is_final: false,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Mark the state as terminal: jobs in it expire after a while.
    pub fn final_state(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Read a data field written by [`format_timestamp`].
    pub fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get(key)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// State names compare case-insensitively.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn enqueued(queue: impl Into<String>) -> Self {
        Self::new(names::ENQUEUED)
            .with_data(keys::QUEUE, queue)
            .with_data(keys::ENQUEUED_AT, format_timestamp(Utc::now()))
    }

    pub fn processing(server_id: impl Into<String>, worker_id: impl Into<String>) -> Self {
        Self::new(names::PROCESSING)
            .with_data(keys::SERVER_ID, server_id)
            .with_data(keys::WORKER_ID, worker_id)
            .with_data(keys::STARTED_AT, format_timestamp(Utc::now()))
    }

    /// `result` is the job's serialized return value, if any.
    pub fn succeeded(result: Option<String>, latency_ms: u64, duration_ms: u64) -> Self {
        let state = Self::new(names::SUCCEEDED)
            .with_data(keys::SUCCEEDED_AT, format_timestamp(Utc::now()))
            .with_data(keys::LATENCY, latency_ms.to_string())
            .with_data(keys::PERFORMANCE_DURATION, duration_ms.to_string())
            .final_state();
        match result {
            Some(r) => state.with_data(keys::RESULT, r),
            None => state,
        }
    }

    pub fn failed(message: impl Into<String>, details: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(names::FAILED)
            .with_reason(message.clone())
            .with_data(keys::FAILED_AT, format_timestamp(Utc::now()))
            .with_data(keys::EXCEPTION_MESSAGE, message)
            .with_data(keys::EXCEPTION_DETAILS, details)
    }

    pub fn scheduled(enqueue_at: DateTime<Utc>) -> Self {
        Self::new(names::SCHEDULED)
            .with_data(keys::ENQUEUE_AT, format_timestamp(enqueue_at))
            .with_data(keys::SCHEDULED_AT, format_timestamp(Utc::now()))
    }

    pub fn deleted() -> Self {
        Self::new(names::DELETED)
            .with_data(keys::DELETED_AT, format_timestamp(Utc::now()))
            .final_state()
    }
}

impl core::fmt::Display for StateValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} ({reason})", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Timestamp format used inside state data.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
