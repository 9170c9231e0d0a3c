use anyhow::Context as _;

use jobflow_core::state::{keys, names};
use jobflow_storage::WriteTransaction;

use super::StateHandler;
use crate::context::ApplyStateContext;

/// Set of scheduled job ids scored by their enqueue time (unix seconds).
pub const SCHEDULE_SET: &str = "schedule";

/// Indexes scheduled jobs by the time they become due.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduledStateHandler;

impl StateHandler for ScheduledStateHandler {
    fn state_name(&self) -> &str {
        names::SCHEDULED
    }

    fn apply(
        &self,
        context: &ApplyStateContext<'_>,
        transaction: &mut dyn WriteTransaction,
    ) -> anyhow::Result<()> {
        let enqueue_at = context
            .new_state
            .timestamp(keys::ENQUEUE_AT)
            .context("scheduled state has no valid EnqueueAt")?;
        transaction.add_to_set(
            SCHEDULE_SET,
            context.job_id().as_str(),
            enqueue_at.timestamp() as f64,
        );
        Ok(())
    }

    fn unapply(
        &self,
        context: &ApplyStateContext<'_>,
        transaction: &mut dyn WriteTransaction,
    ) -> anyhow::Result<()> {
        transaction.remove_from_set(SCHEDULE_SET, context.job_id().as_str());
        Ok(())
    }
}
