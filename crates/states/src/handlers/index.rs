use jobflow_storage::WriteTransaction;

use super::StateHandler;
use crate::context::ApplyStateContext;

/// Keeps the `state:<name>` set in sync with the jobs occupying a state and
/// counts arrivals in final states under `stats:<name>`.
#[derive(Debug, Clone)]
pub struct StateIndexHandler {
    state_name: String,
    set_key: String,
    counter_key: String,
}

impl StateIndexHandler {
    pub fn new(state_name: impl Into<String>) -> Self {
        let state_name = state_name.into();
        let lower = state_name.to_ascii_lowercase();
        Self {
            set_key: Self::set_key(&lower),
            counter_key: format!("stats:{lower}"),
            state_name,
        }
    }

    /// Key of the index set for `state_name`.
    pub fn set_key(state_name: &str) -> String {
        format!("state:{}", state_name.to_ascii_lowercase())
    }
}

impl StateHandler for StateIndexHandler {
    fn state_name(&self) -> &str {
        &self.state_name
    }

    fn apply(
        &self,
        context: &ApplyStateContext<'_>,
        transaction: &mut dyn WriteTransaction,
    ) -> anyhow::Result<()> {
        let job_id = context.job_id().as_str();
        let score = context.background_job.created_at.timestamp_millis() as f64;
        transaction.add_to_set(&self.set_key, job_id, score);
        if context.new_state.is_final() {
            transaction.increment_counter(&self.counter_key);
        }
        Ok(())
    }

    fn unapply(
        &self,
        context: &ApplyStateContext<'_>,
        transaction: &mut dyn WriteTransaction,
    ) -> anyhow::Result<()> {
        transaction.remove_from_set(&self.set_key, context.job_id().as_str());
        Ok(())
    }
}
