//! Per-execution context of a running job.

use std::any::Any;

use serde::Serialize;
use serde::de::DeserializeOwned;

use jobflow_core::{BackgroundJob, JobId, payload};
use jobflow_storage::StorageConnection;

use crate::cancellation::JobCancellationToken;
use crate::config::WorkerConfig;
use crate::error::ParameterError;

/// Ambient identity of the worker executing a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerContext {
    pub server_id: String,
    pub worker_id: String,
}

impl From<&WorkerConfig> for WorkerContext {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            server_id: config.server_id.clone(),
            worker_id: config.worker_id.clone(),
        }
    }
}

/// Insertion-ordered scratch map shared by the filters and the body of one
/// execution. Never persisted.
#[derive(Default)]
pub struct Items {
    entries: Vec<(String, Box<dyn Any + Send>)>,
}

impl Items {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value. A replaced key keeps its position.
    pub fn insert<T: Any + Send>(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        let value: Box<dyn Any + Send> = Box::new(value);
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// The value under `key`, if present and of type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.downcast_mut::<T>())
    }

    pub fn remove(&mut self, key: &str) -> Option<Box<dyn Any + Send>> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl core::fmt::Debug for Items {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

/// Everything a job body and its server filters can reach while it runs.
///
/// Built once per execution and dropped when it ends; a retry of the same
/// job gets a new context with empty [`Items`].
pub struct PerformContext<'a> {
    worker: &'a WorkerContext,
    connection: &'a dyn StorageConnection,
    background_job: BackgroundJob,
    cancellation: &'a dyn JobCancellationToken,
    items: Items,
}

impl<'a> PerformContext<'a> {
    pub fn new(
        worker: &'a WorkerContext,
        connection: &'a dyn StorageConnection,
        background_job: BackgroundJob,
        cancellation: &'a dyn JobCancellationToken,
    ) -> Self {
        Self {
            worker,
            connection,
            background_job,
            cancellation,
            items: Items::new(),
        }
    }

    pub fn worker(&self) -> &WorkerContext {
        self.worker
    }

    pub fn connection(&self) -> &dyn StorageConnection {
        self.connection
    }

    pub fn background_job(&self) -> &BackgroundJob {
        &self.background_job
    }

    pub fn job_id(&self) -> &JobId {
        &self.background_job.id
    }

    pub fn cancellation_token(&self) -> &dyn JobCancellationToken {
        self.cancellation
    }

    pub fn items(&self) -> &Items {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut Items {
        &mut self.items
    }

    /// Serialize `value` and store it under `(job id, name)`.
    pub fn set_job_parameter<T>(&self, name: &str, value: &T) -> Result<(), ParameterError>
    where
        T: Serialize + ?Sized,
    {
        if name.is_empty() {
            return Err(ParameterError::InvalidName);
        }
        let encoded = payload::to_payload(value).map_err(|source| {
            ParameterError::Serialization {
                name: name.to_string(),
                source,
            }
        })?;
        self.connection
            .set_job_parameter(self.job_id(), name, &encoded)
            .map_err(|source| ParameterError::Storage {
                name: name.to_string(),
                source,
            })
    }

    /// Read the parameter under `(job id, name)` as `T`.
    ///
    /// An absent parameter yields `T::default()`; a present but malformed
    /// one fails with [`ParameterError::Retrieval`].
    pub fn get_job_parameter<T>(&self, name: &str) -> Result<T, ParameterError>
    where
        T: DeserializeOwned + Default,
    {
        if name.is_empty() {
            return Err(ParameterError::InvalidName);
        }
        let raw = self
            .connection
            .get_job_parameter(self.job_id(), name)
            .map_err(|source| ParameterError::Storage {
                name: name.to_string(),
                source,
            })?;
        payload::from_optional_payload(raw.as_deref()).map_err(|source| {
            ParameterError::Retrieval {
                name: name.to_string(),
                source,
            }
        })
    }
}

impl core::fmt::Debug for PerformContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PerformContext")
            .field("worker", self.worker)
            .field("background_job", &self.background_job)
            .field("items", &self.items)
            .finish()
    }
}
