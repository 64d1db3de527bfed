use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Logging defaults. `RUST_LOG` takes precedence at runtime.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    #[validate(custom(function = validation::validate_log_level))]
    pub log_level: String,

    /// Dump handler latency statistics on shutdown.
    #[serde(default = "default_true")]
    pub dump_stats_on_exit: bool,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_true() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dump_stats_on_exit: default_true(),
        }
    }
}
