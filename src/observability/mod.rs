//! Observability subsystem for shardrelay
//!
//! This module provides:
//! - Structured logging (JSON by default) through `tracing`
//! - A typed vocabulary of lifecycle events
//! - Monotonic operational counters
//!
//! # Usage
//!
//! ```ignore
//! use shardrelay::observability::{Event, MetricsRegistry};
//! use tracing::info;
//!
//! info!(event = %Event::SessionOpened, session = %id, "secondary connected");
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_statements_executed();
//! ```

mod events;
mod metrics;

pub use events::Event;
pub use metrics::{MetricsRegistry, MetricsSnapshot};

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable lines
    Pretty,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.level`. Calling this twice is harmless; the
/// second call leaves the first subscriber in place.
pub fn init_logging(config: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let _ = match config.format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .try_init(),
        LogFormat::Pretty => fmt().with_env_filter(filter).with_target(false).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_log_format_parses_lowercase() {
        let config: LogConfig = serde_json::from_str(r#"{"format": "pretty"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_init_logging_twice_does_not_panic() {
        init_logging(&LogConfig::default());
        init_logging(&LogConfig::default());
    }
}
