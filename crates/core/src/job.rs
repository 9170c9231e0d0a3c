//! Job invocation descriptors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::JobId;

/// What to run: a target type, a method on it and its serialized arguments.
///
/// Immutable once created. Resolving and invoking the target is the job
/// invoker's concern; this is only the description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    type_name: String,
    method: String,
    args: Vec<String>,
}

impl Job {
    pub fn new(
        type_name: impl Into<String>,
        method: impl Into<String>,
        args: Vec<String>,
    ) -> Result<Self, DomainError> {
        let type_name = type_name.into();
        let method = method.into();
        if type_name.trim().is_empty() {
            return Err(DomainError::validation("job type name must not be empty"));
        }
        if method.trim().is_empty() {
            return Err(DomainError::validation("job method must not be empty"));
        }
        Ok(Self {
            type_name,
            method,
            args,
        })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Arguments, each one an opaque serialized payload.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Encode as the invocation data kept by storage.
    pub fn to_invocation_data(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.type_name,
            "method": self.method,
            "args": self.args,
        })
    }

    /// Decode stored invocation data.
    ///
    /// Fails when the data is corrupt or describes an unusable target.
    pub fn from_invocation_data(data: &serde_json::Value) -> Result<Self, DomainError> {
        #[derive(Deserialize)]
        struct InvocationData {
            #[serde(rename = "type")]
            type_name: String,
            method: String,
            #[serde(default)]
            args: Vec<String>,
        }

        let decoded: InvocationData = serde_json::from_value(data.clone())
            .map_err(|e| DomainError::payload(format!("invocation data: {e}")))?;
        Self::new(decoded.type_name, decoded.method, decoded.args)
    }
}

impl core::fmt::Display for Job {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.type_name, self.method)
    }
}

/// An enqueued unit of work as loaded from storage.
///
/// Loaded fresh for every transition attempt and every execution; never
/// cached across them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundJob {
    pub id: JobId,
    pub job: Job,
    pub created_at: DateTime<Utc>,
}

impl BackgroundJob {
    pub fn new(id: JobId, job: Job, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            job,
            created_at,
        }
    }
}
