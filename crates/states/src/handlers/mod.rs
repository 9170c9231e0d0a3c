//! Per-state storage side effects.
//!
//! A handler is registered for one state name. When a job leaves that state
//! its `unapply` runs; when a job enters it, its `apply` runs. Leaving always
//! happens before entering, so a handler-maintained structure (e.g. "which
//! jobs are in state X") never holds a job under two states at once.

mod enqueued;
mod index;
mod scheduled;

use std::collections::HashMap;
use std::sync::Arc;

use jobflow_core::state::names;
use jobflow_storage::WriteTransaction;

use crate::context::ApplyStateContext;

pub use enqueued::EnqueuedStateHandler;
pub use index::StateIndexHandler;
pub use scheduled::{SCHEDULE_SET, ScheduledStateHandler};

pub trait StateHandler: Send + Sync {
    /// Name of the state this handler is attached to.
    fn state_name(&self) -> &str;

    /// Add side effects of entering the state.
    fn apply(
        &self,
        context: &ApplyStateContext<'_>,
        transaction: &mut dyn WriteTransaction,
    ) -> anyhow::Result<()>;

    /// Remove side effects of occupying the state.
    fn unapply(
        &self,
        context: &ApplyStateContext<'_>,
        transaction: &mut dyn WriteTransaction,
    ) -> anyhow::Result<()>;
}

/// Handlers grouped by (case-insensitive) state name.
#[derive(Clone, Default)]
pub struct StateHandlerCollection {
    handlers: HashMap<String, Vec<Arc<dyn StateHandler>>>,
}

impl StateHandlerCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers for the well-known states: an index for each of them, plus
    /// queue and schedule maintenance.
    pub fn with_defaults() -> Self {
        let mut collection = Self::new();
        for name in [
            names::ENQUEUED,
            names::PROCESSING,
            names::SUCCEEDED,
            names::FAILED,
            names::SCHEDULED,
            names::DELETED,
        ] {
            collection.add(Arc::new(StateIndexHandler::new(name)));
        }
        collection.add(Arc::new(EnqueuedStateHandler));
        collection.add(Arc::new(ScheduledStateHandler));
        collection
    }

    pub fn with_handler(mut self, handler: impl StateHandler + 'static) -> Self {
        self.add(Arc::new(handler));
        self
    }

    pub fn add(&mut self, handler: Arc<dyn StateHandler>) {
        self.handlers
            .entry(handler.state_name().to_ascii_lowercase())
            .or_default()
            .push(handler);
    }

    /// Handlers for `state_name`, in registration order.
    pub fn get(&self, state_name: &str) -> &[Arc<dyn StateHandler>] {
        self.handlers
            .get(&state_name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl core::fmt::Debug for StateHandlerCollection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut states: Vec<_> = self
            .handlers
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        states.sort();
        f.debug_struct("StateHandlerCollection")
            .field("states", &states)
            .finish()
    }
}
