//! Storage boundary consumed by the state change engine and workers.
//!
//! This crate defines what a backend must provide (transactional job data,
//! parameters, state history and per-job distributed locks) without making
//! any storage assumptions, plus an in-memory backend for tests and dev.

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod lock;

pub use connection::{JobData, StateHistoryEntry, StorageConnection, WriteTransaction};
pub use error::StorageError;
pub use in_memory::InMemoryStorage;
pub use lock::DistributedLockHandle;
