//! `jobflow-core`: background job building blocks.
//!
//! This crate contains the **pure** data model shared by every layer: job
//! identity, invocation descriptors, state values and the shutdown signal.
//! Storage, orchestration and execution live in the crates above it.

pub mod cancellation;
pub mod error;
pub mod id;
pub mod job;
pub mod payload;
pub mod state;

pub use cancellation::CancellationToken;
pub use error::{DomainError, DomainResult};
pub use id::JobId;
pub use job::{BackgroundJob, Job};
pub use state::StateValue;
