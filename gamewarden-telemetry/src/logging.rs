//! Structured logging with tracing and OpenTelemetry key/values.
//!
//! Every thread the agent spawns is named (`dispatch`, `rcon-reader`,
//! `adapter`, `say-queue`, ...) so log lines carry their origin.

use opentelemetry::KeyValue;
use tracing::info_span;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{0}': {1}")]
    InvalidFilter(String, String),

    #[error("A global subscriber is already installed")]
    AlreadyInitialized,
}

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. `RUST_LOG` wins over `default_level`.
    pub fn init(default_level: &str) -> Result<(), LoggingError> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(default_level).map_err(|e| {
                LoggingError::InvalidFilter(default_level.to_string(), e.to_string())
            })?,
        };

        fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .with_target(false)
            .try_init()
            .map_err(|_| LoggingError::AlreadyInitialized)
    }

    /// Audit record for an enforcement action or another admin-visible event.
    #[inline]
    pub fn log_event(event_type: &str, metadata: Vec<KeyValue>) {
        let span = info_span!("admin_event", event_type = event_type, otel.kind = "INTERNAL");
        let _entered = span.enter();
        tracing::info!(metadata = ?metadata, "Admin event recorded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_logging() {
        EventLogger::log_event("kick", vec![KeyValue::new("player", "Joe")]);
        assert!(logs_contain("Admin event recorded"));
        assert!(logs_contain("Joe"));
    }
}
