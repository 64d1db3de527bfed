//! Outbound chat settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

pub const MIN_MESSAGE_DELAY: Duration = Duration::from_millis(500);
pub const MAX_MESSAGE_DELAY: Duration = Duration::from_secs(3);

/// When yelled messages are repeated as plain chat.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BigMessageRepeat {
    All,
    #[default]
    Pm,
    Off,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct MessagesConfig {
    /// Pause between two chat lines. Clamped to 0.5-3 s.
    #[serde(default = "default_message_delay_ms")]
    pub message_delay_ms: u64,

    /// Longest chat line the server accepts.
    #[serde(default = "default_line_length")]
    #[validate(range(min = 16, max = 1024))]
    pub line_length: usize,

    /// Prepended to every broadcast.
    #[serde(default)]
    #[validate(length(max = 32))]
    pub prefix: String,

    /// Prepended to private messages.
    #[serde(default = "default_private_prefix")]
    #[validate(length(max = 32))]
    pub private_prefix: String,

    #[serde(default = "default_say_queue_capacity")]
    #[validate(range(min = 1, max = 10000))]
    pub say_queue_capacity: usize,

    /// Say-queue worker wait before re-checking for shutdown.
    #[serde(default = "default_say_queue_poll_ms")]
    #[validate(range(min = 10, max = 10000))]
    pub say_queue_poll_ms: u64,

    /// On-screen time of yelled messages.
    #[serde(default = "default_big_msg_duration_secs")]
    #[validate(range(min = 1, max = 60))]
    pub big_msg_duration_secs: u32,

    /// Send private replies as yells instead of chat.
    #[serde(default)]
    pub big_private_responses: bool,

    #[serde(default)]
    pub big_msg_repeat: BigMessageRepeat,
}

fn default_message_delay_ms() -> u64 {
    800
}

fn default_line_length() -> usize {
    128
}

fn default_private_prefix() -> String {
    "[pm]".into()
}

fn default_say_queue_capacity() -> usize {
    100
}

fn default_say_queue_poll_ms() -> u64 {
    2000
}

fn default_big_msg_duration_secs() -> u32 {
    4
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            message_delay_ms: default_message_delay_ms(),
            line_length: default_line_length(),
            prefix: String::new(),
            private_prefix: default_private_prefix(),
            say_queue_capacity: default_say_queue_capacity(),
            say_queue_poll_ms: default_say_queue_poll_ms(),
            big_msg_duration_secs: default_big_msg_duration_secs(),
            big_private_responses: false,
            big_msg_repeat: BigMessageRepeat::default(),
        }
    }
}

impl MessagesConfig {
    pub fn message_delay(&self) -> Duration {
        Duration::from_millis(self.message_delay_ms).clamp(MIN_MESSAGE_DELAY, MAX_MESSAGE_DELAY)
    }

    /// Whether the configured delay had to be clamped.
    pub fn message_delay_clamped(&self) -> bool {
        self.message_delay() != Duration::from_millis(self.message_delay_ms)
    }

    pub fn say_queue_poll(&self) -> Duration {
        Duration::from_millis(self.say_queue_poll_ms)
    }
}
