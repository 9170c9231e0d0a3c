//! Election and applied filters.
//!
//! Filters are resolved once, when the process is built, and run in
//! registration order on every transition that does not disable them.

use std::sync::Arc;

use jobflow_core::StateValue;
use jobflow_storage::WriteTransaction;

use crate::context::{ApplyStateContext, ElectStateContext};

/// May replace the candidate state before anything is persisted.
///
/// Each filter receives the previous filter's output, never the original
/// candidate. Returning the candidate unchanged leaves the election alone.
/// Errors abort the transition before the transaction opens.
pub trait ElectStateFilter: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn on_state_election(
        &self,
        context: &ElectStateContext<'_>,
        candidate: StateValue,
    ) -> anyhow::Result<StateValue>;
}

/// Observes a transition inside the still-open transaction.
///
/// Writes made through `transaction` commit (or roll back) together with
/// the state itself. Errors roll the whole transition back.
pub trait ApplyStateFilter: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called after the new state is persisted in the transaction.
    fn on_state_applied(
        &self,
        context: &ApplyStateContext<'_>,
        transaction: &mut dyn WriteTransaction,
    ) -> anyhow::Result<()>;

    /// Called for the state being left, right after its handlers unapplied.
    fn on_state_unapplied(
        &self,
        _context: &ApplyStateContext<'_>,
        _transaction: &mut dyn WriteTransaction,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Closure-backed election filter, see [`election_filter_fn`].
pub struct ElectionFn<F> {
    name: String,
    f: F,
}

impl<F> ElectStateFilter for ElectionFn<F>
where
    F: Fn(&ElectStateContext<'_>, StateValue) -> anyhow::Result<StateValue> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_state_election(
        &self,
        context: &ElectStateContext<'_>,
        candidate: StateValue,
    ) -> anyhow::Result<StateValue> {
        (self.f)(context, candidate)
    }
}

pub fn election_filter_fn<F>(name: impl Into<String>, f: F) -> ElectionFn<F>
where
    F: Fn(&ElectStateContext<'_>, StateValue) -> anyhow::Result<StateValue> + Send + Sync,
{
    ElectionFn {
        name: name.into(),
        f,
    }
}

/// Closure-backed applied filter, see [`apply_filter_fn`].
pub struct ApplyFn<F> {
    name: String,
    f: F,
}

impl<F> ApplyStateFilter for ApplyFn<F>
where
    F: Fn(&ApplyStateContext<'_>, &mut dyn WriteTransaction) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_state_applied(
        &self,
        context: &ApplyStateContext<'_>,
        transaction: &mut dyn WriteTransaction,
    ) -> anyhow::Result<()> {
        (self.f)(context, transaction)
    }
}

pub fn apply_filter_fn<F>(name: impl Into<String>, f: F) -> ApplyFn<F>
where
    F: Fn(&ApplyStateContext<'_>, &mut dyn WriteTransaction) -> anyhow::Result<()> + Send + Sync,
{
    ApplyFn {
        name: name.into(),
        f,
    }
}

/// Ordered filter registry.
#[derive(Clone, Default)]
pub struct JobFilters {
    election: Vec<Arc<dyn ElectStateFilter>>,
    applied: Vec<Arc<dyn ApplyStateFilter>>,
}

impl JobFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_election_filter(mut self, filter: impl ElectStateFilter + 'static) -> Self {
        self.election.push(Arc::new(filter));
        self
    }

    pub fn with_apply_filter(mut self, filter: impl ApplyStateFilter + 'static) -> Self {
        self.applied.push(Arc::new(filter));
        self
    }

    pub fn add_election_filter(&mut self, filter: Arc<dyn ElectStateFilter>) {
        self.election.push(filter);
    }

    pub fn add_apply_filter(&mut self, filter: Arc<dyn ApplyStateFilter>) {
        self.applied.push(filter);
    }

    pub fn election_filters(&self) -> &[Arc<dyn ElectStateFilter>] {
        &self.election
    }

    pub fn apply_filters(&self) -> &[Arc<dyn ApplyStateFilter>] {
        &self.applied
    }
}

impl core::fmt::Debug for JobFilters {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JobFilters")
            .field(
                "election",
                &self.election.iter().map(|x| x.name()).collect::<Vec<_>>(),
            )
            .field(
                "applied",
                &self.applied.iter().map(|x| x.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_order_is_preserved() {
        let filters = JobFilters::new()
            .with_election_filter(election_filter_fn("first", |_, c| Ok(c)))
            .with_election_filter(election_filter_fn("second", |_, c| Ok(c)))
            .with_apply_filter(apply_filter_fn("audit", |_, _| Ok(())));

        let names: Vec<_> = filters.election_filters().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(filters.apply_filters()[0].name(), "audit");
    }

    #[test]
    fn default_name_is_the_type_name() {
        struct Noop;
        impl ElectStateFilter for Noop {
            fn on_state_election(
                &self,
                _context: &ElectStateContext<'_>,
                candidate: StateValue,
            ) -> anyhow::Result<StateValue> {
                Ok(candidate)
            }
        }

        assert!(Noop.name().ends_with("Noop"));
    }
}
