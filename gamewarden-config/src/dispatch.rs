use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Event queue and dispatch loop sizing.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct DispatchConfig {
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1, max = 1048576))]
    pub queue_capacity: usize,

    #[serde(default = "default_poll_interval_ms")]
    #[validate(range(min = 10, max = 10000))]
    pub poll_interval_ms: u64,

    /// Wait on a full queue before the event is dropped.
    #[serde(default = "default_publish_timeout_ms")]
    #[validate(range(max = 60000))]
    pub publish_timeout_ms: u64,

    /// Latency samples kept per handler and event kind.
    #[serde(default = "default_stats_samples")]
    #[validate(range(min = 1, max = 10000))]
    pub stats_samples: usize,
}

fn default_queue_capacity() -> usize {
    400
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_publish_timeout_ms() -> u64 {
    2000
}

fn default_stats_samples() -> usize {
    100
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
            publish_timeout_ms: default_publish_timeout_ms(),
            stats_samples: default_stats_samples(),
        }
    }
}

impl DispatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}
