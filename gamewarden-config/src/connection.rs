//! Connection supervision and RCON command timing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ConnectionConfig {
    /// TCP connect timeout per attempt.
    #[serde(default = "default_connect_timeout_ms")]
    #[validate(range(min = 100, max = 60000))]
    pub connect_timeout_ms: u64,

    /// Pause between two failed connection attempts.
    #[serde(default = "default_retry_interval_secs")]
    #[validate(range(min = 1, max = 300))]
    pub retry_interval_secs: u64,

    /// Total time spent retrying before giving up for good.
    #[serde(default = "default_retry_budget_secs")]
    #[validate(range(min = 1, max = 86400))]
    pub retry_budget_secs: u64,

    /// How long a command waits for its reply.
    #[serde(default = "default_command_timeout_ms")]
    #[validate(range(min = 100, max = 120000))]
    pub command_timeout_ms: u64,

    /// Resends of a timed out command before it fails.
    #[serde(default = "default_command_retries")]
    #[validate(range(max = 5))]
    pub command_retries: u32,

    /// Idle time after which a liveness probe is sent.
    #[serde(default = "default_heartbeat_interval_secs")]
    #[validate(range(min = 1, max = 3600))]
    pub heartbeat_interval_secs: u64,

    /// Server events buffered between the network thread and the adapter.
    #[serde(default = "default_inbound_capacity")]
    #[validate(range(min = 1, max = 100000))]
    pub inbound_capacity: usize,

    /// Server events older than this are dropped unprocessed.
    #[serde(default = "default_inbound_ttl_secs")]
    #[validate(range(min = 1, max = 3600))]
    pub inbound_ttl_secs: u64,

    /// Adapter main loop wait on the inbound queue.
    #[serde(default = "default_main_poll_ms")]
    #[validate(range(min = 10, max = 60000))]
    pub main_poll_ms: u64,

    /// Period of the full roster resync.
    #[serde(default = "default_roster_sync_secs")]
    #[validate(range(min = 10, max = 86400))]
    pub roster_sync_secs: u64,
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_retry_interval_secs() -> u64 {
    2
}

fn default_retry_budget_secs() -> u64 {
    600
}

fn default_command_timeout_ms() -> u64 {
    10000
}

fn default_command_retries() -> u32 {
    0
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_inbound_capacity() -> usize {
    400
}

fn default_inbound_ttl_secs() -> u64 {
    10
}

fn default_main_poll_ms() -> u64 {
    5000
}

fn default_roster_sync_secs() -> u64 {
    300
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            retry_interval_secs: default_retry_interval_secs(),
            retry_budget_secs: default_retry_budget_secs(),
            command_timeout_ms: default_command_timeout_ms(),
            command_retries: default_command_retries(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            inbound_capacity: default_inbound_capacity(),
            inbound_ttl_secs: default_inbound_ttl_secs(),
            main_poll_ms: default_main_poll_ms(),
            roster_sync_secs: default_roster_sync_secs(),
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn retry_budget(&self) -> Duration {
        Duration::from_secs(self.retry_budget_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn inbound_ttl(&self) -> Duration {
        Duration::from_secs(self.inbound_ttl_secs)
    }

    pub fn main_poll(&self) -> Duration {
        Duration::from_millis(self.main_poll_ms)
    }

    pub fn roster_sync(&self) -> Duration {
        Duration::from_secs(self.roster_sync_secs)
    }
}
