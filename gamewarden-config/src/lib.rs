//! # Gamewarden Configuration
//!
//! Layered configuration for the agent: built-in defaults, YAML files and
//! `GAMEWARDEN_*` environment variables, validated before use.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod connection;
mod dispatch;
mod enforcement;
mod error;
mod messages;
mod server;
mod telemetry;
mod validation;

pub use connection::ConnectionConfig;
pub use dispatch::DispatchConfig;
pub use enforcement::{BanAgent, EnforcementConfig, MessageTemplates};
pub use error::ConfigError;
pub use messages::{BigMessageRepeat, MessagesConfig, MAX_MESSAGE_DELAY, MIN_MESSAGE_DELAY};
pub use server::ServerConfig;
pub use telemetry::TelemetryConfig;

pub const ENV_PREFIX: &str = "GAMEWARDEN_";
pub const DEFAULT_CONFIG_FILE: &str = "config/gamewarden.yaml";

#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct WardenConfig {
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,

    #[serde(default)]
    #[validate(nested)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    #[validate(nested)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    #[validate(nested)]
    pub messages: MessagesConfig,

    #[serde(default)]
    #[validate(nested)]
    pub enforcement: EnforcementConfig,

    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl WardenConfig {
    /// Load configuration from the default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/gamewarden.yaml`, skipped when missing
    /// 3. `config/<GAMEWARDEN_ENV>.yaml` (default `production`)
    /// 4. `GAMEWARDEN_*` environment variables, `__` separating sections
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(WardenConfig::default()));

        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            figment = figment.merge(Yaml::file(DEFAULT_CONFIG_FILE));
        }

        let env = std::env::var("GAMEWARDEN_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::finish(figment)
    }

    /// Load from an explicit file on top of the defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        let figment =
            Figment::from(Serialized::defaults(WardenConfig::default())).merge(Yaml::file(path));
        Self::finish(figment)
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__").ignore(&["env"]))
            .extract()?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn full_config_validation() {
        let config = WardenConfig::default();
        config.validate().expect("Default config should validate");
        assert_eq!(config.connection.retry_budget_secs, 600);
        assert_eq!(config.enforcement.ban_agent, BanAgent::Server);
    }

    #[test]
    fn environment_override() {
        std::env::set_var("GAMEWARDEN_DISPATCH__QUEUE_CAPACITY", "1024");
        let config = WardenConfig::load().unwrap();
        assert_eq!(config.dispatch.queue_capacity, 1024);
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("gamewarden-test-{}.yaml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "server:\n  host: bf3.example.org\n  port: 25200\nenforcement:\n  ban_agent: both\nmessages:\n  big_msg_repeat: off"
        )
        .unwrap();

        let config = WardenConfig::load_from_path(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.server.address(), "bf3.example.org:25200");
        assert_eq!(config.enforcement.ban_agent, BanAgent::Both);
        assert_eq!(config.messages.big_msg_repeat, BigMessageRepeat::Off);
        assert_eq!(config.messages.line_length, 128);
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut config = WardenConfig::default();
        config.server.host = "not a host".into();
        config.enforcement.templates.kicked = "$who".into();
        let err = ConfigError::from(config.validate().unwrap_err());
        let text = err.to_string();
        assert!(text.contains("server.host"));
        assert!(text.contains("enforcement.templates.kicked"));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            WardenConfig::load_from_path("does/not/exist.yaml"),
            Err(ConfigError::FileNotFound(_))
        ));
    }
}
