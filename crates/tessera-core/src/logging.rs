//! Logging setup
//!
//! Installs a `tracing` fmt subscriber. `RUST_LOG` takes precedence over the
//! configured level so operators can raise verbosity for a single module.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level directive: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Emit ANSI colors
    pub ansi: bool,
    /// Include the event target (module path)
    pub show_target: bool,
    /// Include the emitting thread name, useful for fan-out workers
    pub show_thread_names: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
            show_target: true,
            show_thread_names: false,
        }
    }
}

/// Install the global subscriber.
///
/// Returns false if a subscriber was already installed, which makes repeated
/// calls from tests harmless.
pub fn init_logging(settings: &LoggingSettings) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(settings.ansi)
        .with_target(settings.show_target)
        .with_thread_names(settings.show_thread_names)
        .try_init()
        .is_ok()
}
