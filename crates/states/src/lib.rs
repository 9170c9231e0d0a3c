//! State change orchestration.
//!
//! Moves a persisted job between named lifecycle states under a per-job
//! distributed lock, letting election filters rewrite the target, state
//! handlers maintain storage side effects and applied filters observe the
//! result, all inside one storage transaction.
//!
//! ```text
//! StateChangeContext
//!   ↓
//! 1. Acquire per-job lock
//!   ↓
//! 2. Load job (absent / corrupt → no transition)
//!   ↓
//! 3. Election filters (cumulative candidate)
//!   ↓
//! 4. Expected-state check (mismatch → no transition)
//!   ↓
//! 5. Transaction: unapply old → apply new → persist → applied filters
//!   ↓
//! 6. Commit → final state
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod process;
pub mod retry;

#[cfg(test)]
mod integration_tests;

pub use config::{HistoryRetentionPolicy, KeepAll, KeepLast, StateChangeConfig};
pub use context::{ApplyStateContext, ElectStateContext, StateChangeContext};
pub use error::StateChangeError;
pub use filter::{ApplyStateFilter, ElectStateFilter, JobFilters, apply_filter_fn, election_filter_fn};
pub use handlers::{StateHandler, StateHandlerCollection};
pub use process::{NoTransitionReason, StateChangeOutcome, StateChangeProcess, StateChanger};
pub use retry::{AttemptsExceeded, AutomaticRetry, BackoffStrategy, RetryPolicy};
