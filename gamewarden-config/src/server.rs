//! Game server endpoint and credentials.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    #[validate(custom(function = validation::validate_host))]
    pub host: String,

    /// RCON port.
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// RCON password, sent with `login.plainText`.
    #[serde(default)]
    #[validate(length(max = 256))]
    pub password: String,

    /// Game name used in log lines and audit records.
    #[serde(default = "default_game")]
    #[validate(length(min = 1, max = 32))]
    pub game: String,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    47200
}

fn default_game() -> String {
    "bf3".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: String::new(),
            game: default_game(),
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
