//! # Gamewarden Telemetry
//!
//! Logging setup, enforcement audit records and Prometheus counters for the
//! dispatch engine and the game-server adapters.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
