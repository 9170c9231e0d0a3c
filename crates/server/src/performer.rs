//! Running a job body between server filters.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cancellation::JobCancelled;
use crate::context::PerformContext;
use crate::error::PerformError;

/// Runs the job body itself. Method resolution and argument decoding live
/// behind this seam.
pub trait JobInvoker: Send + Sync {
    /// Perform the job and return its result (`Value::Null` for none).
    ///
    /// A body that stops because of [`JobCancelled`] should return that
    /// error (e.g. via `context.cancellation_token().check()?`).
    fn invoke(&self, context: &mut PerformContext<'_>) -> anyhow::Result<Value>;
}

/// Closure-backed invoker, see [`invoker_fn`].
pub struct InvokerFn<F> {
    f: F,
}

impl<F> JobInvoker for InvokerFn<F>
where
    F: Fn(&mut PerformContext<'_>) -> anyhow::Result<Value> + Send + Sync,
{
    fn invoke(&self, context: &mut PerformContext<'_>) -> anyhow::Result<Value> {
        (self.f)(context)
    }
}

pub fn invoker_fn<F>(f: F) -> InvokerFn<F>
where
    F: Fn(&mut PerformContext<'_>) -> anyhow::Result<Value> + Send + Sync,
{
    InvokerFn { f }
}

/// Observes (and may veto) the execution of every job.
///
/// All filters of one execution share the same [`PerformContext`], so they
/// can hand data to each other through its items.
pub trait ServerFilter: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Before the body runs. An error skips the body.
    fn on_performing(&self, _context: &mut PerformContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// After the body ran (or failed), only if this filter's
    /// `on_performing` succeeded.
    fn on_performed(
        &self,
        _context: &mut PerformContext<'_>,
        _result: Result<&Value, &PerformError>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Performs jobs through an invoker, wrapped by server filters.
///
/// `on_performing` runs in registration order, `on_performed` in reverse.
#[derive(Clone)]
pub struct JobPerformer {
    invoker: Arc<dyn JobInvoker>,
    filters: Vec<Arc<dyn ServerFilter>>,
}

impl JobPerformer {
    pub fn new(invoker: impl JobInvoker + 'static) -> Self {
        Self {
            invoker: Arc::new(invoker),
            filters: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: impl ServerFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn filters(&self) -> &[Arc<dyn ServerFilter>] {
        &self.filters
    }

    pub fn perform(&self, context: &mut PerformContext<'_>) -> Result<Value, PerformError> {
        let mut entered = 0;
        let mut result = Ok(Value::Null);

        for filter in &self.filters {
            if let Err(source) = filter.on_performing(context) {
                result = Err(PerformError::Filter {
                    filter: filter.name().to_string(),
                    source,
                });
                break;
            }
            entered += 1;
        }

        if result.is_ok() {
            result = self.invoke(context);
        }

        for filter in self.filters[..entered].iter().rev() {
            if let Err(source) = filter.on_performed(context, result.as_ref()) {
                match result {
                    Ok(_) => {
                        result = Err(PerformError::Filter {
                            filter: filter.name().to_string(),
                            source,
                        });
                    }
                    Err(ref original) => warn!(
                        job_id = %context.job_id(),
                        filter = filter.name(),
                        error = %source,
                        original = %original,
                        "server filter failed after the job already failed"
                    ),
                }
            }
        }

        result
    }

    fn invoke(&self, context: &mut PerformContext<'_>) -> Result<Value, PerformError> {
        context.cancellation_token().check()?;

        debug!(job_id = %context.job_id(), job = %context.background_job().job, "invoking job");
        self.invoker
            .invoke(context)
            .map_err(|source| match source.downcast::<JobCancelled>() {
                Ok(reason) => PerformError::Cancelled(reason),
                Err(source) => PerformError::Failed {
                    job: context.background_job().job.to_string(),
                    source,
                },
            })
    }
}

impl core::fmt::Debug for JobPerformer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JobPerformer")
            .field(
                "filters",
                &self.filters.iter().map(|x| x.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
