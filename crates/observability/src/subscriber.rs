//! Tracing/logging initialization.
//!
//! Filtering always honours `RUST_LOG`; the configured directive only
//! applies when it is unset or invalid.

use tracing_subscriber::EnvFilter;

pub const ENV_LOG_FORMAT: &str = "JOBFLOW_LOG_FORMAT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// JSON lines instead of human-readable output.
    pub json: bool,
    /// Filter used when `RUST_LOG` is not set, e.g. `info,jobflow_states=debug`.
    pub default_directive: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            json: true,
            default_directive: "info".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn plain() -> Self {
        Self {
            json: false,
            ..Self::default()
        }
    }

    pub fn with_default_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }

    /// `JOBFLOW_LOG_FORMAT=plain` selects human-readable output.
    pub fn from_env() -> Self {
        let json = !std::env::var(ENV_LOG_FORMAT)
            .map(|v| v.eq_ignore_ascii_case("plain"))
            .unwrap_or(false);
        Self {
            json,
            ..Self::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.default_directive))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init(config: &ObservabilityConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
