//! Logging setup
//!
//! The library itself only emits `tracing` events. Applications (and tests)
//! that want to see them call [`init_logging`] once at startup.

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive such as `"strand_fiber=debug"`. Falls back to
    /// `RUST_LOG`, then `info`.
    pub env_filter: Option<String>,
    /// Include the event target (module path) in each line
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    fn filter(&self) -> EnvFilter {
        if let Some(directive) = &self.env_filter {
            match EnvFilter::try_new(directive) {
                Ok(filter) => return filter,
                Err(err) => eprintln!("invalid log filter {directive:?}: {err}"),
            }
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global `tracing` subscriber. Only the first call has any
/// effect; a subscriber installed elsewhere is left in place.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let installed = tracing_subscriber::registry()
            .with(config.filter())
            .with(fmt::layer().with_target(config.with_target))
            .try_init();
        if installed.is_ok() {
            tracing::debug!("logging initialized");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_logging(LoggingConfig {
            env_filter: Some("strand_fiber=debug".into()),
            ..Default::default()
        });
        init_logging(LoggingConfig::default());
        tracing::debug!("still alive");
    }

    #[test]
    fn test_bad_filter_falls_back() {
        let config = LoggingConfig {
            env_filter: Some("=[".into()),
            with_target: false,
        };
        let _ = config.filter();
    }
}
