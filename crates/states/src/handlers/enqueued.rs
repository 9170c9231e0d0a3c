use anyhow::bail;

use jobflow_core::state::{DEFAULT_QUEUE, keys, names};
use jobflow_storage::WriteTransaction;

use super::StateHandler;
use crate::context::ApplyStateContext;

/// Pushes enqueued jobs onto their queue.
///
/// Queues are drained by fetchers, so there is nothing to undo on unapply.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueuedStateHandler;

impl StateHandler for EnqueuedStateHandler {
    fn state_name(&self) -> &str {
        names::ENQUEUED
    }

    fn apply(
        &self,
        context: &ApplyStateContext<'_>,
        transaction: &mut dyn WriteTransaction,
    ) -> anyhow::Result<()> {
        let queue = context.new_state.get(keys::QUEUE).unwrap_or(DEFAULT_QUEUE);
        if queue.trim().is_empty() {
            bail!("enqueued state has an empty queue name");
        }
        transaction.add_to_queue(queue, context.job_id());
        Ok(())
    }

    fn unapply(
        &self,
        _context: &ApplyStateContext<'_>,
        _transaction: &mut dyn WriteTransaction,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
