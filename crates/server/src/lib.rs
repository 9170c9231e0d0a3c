//! Job execution on the server side.
//!
//! A [`Worker`] takes one job at a time through
//! `Enqueued/Scheduled → Processing → Succeeded/Failed`, delegating every
//! transition to a [`jobflow_states::StateChangeProcess`] and running the
//! job body inside a fresh [`PerformContext`]:
//!
//! ```text
//! fetch job id from queues
//!   ↓
//! change state → Processing (expected Enqueued / Scheduled)
//!   ↓
//! PerformContext { job, parameters, items, cancellation }
//!   ↓
//! server filters (performing) → job body → server filters (performed, reversed)
//!   ↓
//! change state → Succeeded / Failed (expected Processing)
//! ```
//!
//! Shutdown re-enqueues the job; an external abort leaves it alone.

pub mod cancellation;
pub mod config;
pub mod context;
pub mod error;
pub mod performer;
pub mod worker;


pub use cancellation::{JobCancellationToken, JobCancelled, NeverCancelled, ServerJobCancellationToken};
pub use config::WorkerConfig;
pub use context::{Items, PerformContext, WorkerContext};
pub use error::{ParameterError, PerformError, WorkerError};
pub use performer::{JobInvoker, JobPerformer, ServerFilter, invoker_fn};
pub use worker::{WorkOutcome, Worker};
