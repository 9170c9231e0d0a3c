//! Tracing/logging setup shared by every process embedding the job engine.

pub mod subscriber;

pub use subscriber::ObservabilityConfig;

/// Initialize process-wide tracing with JSON output.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    subscriber::init(&ObservabilityConfig::default());
}

/// Initialize process-wide tracing from an explicit configuration.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_with(config: &ObservabilityConfig) -> bool {
    subscriber::init(config)
}
