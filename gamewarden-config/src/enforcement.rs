//! Kick and ban policy.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Which ban list receives bans.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BanAgent {
    /// The game server's own ban list.
    #[default]
    Server,
    /// PunkBuster only.
    Punkbuster,
    Both,
}

impl BanAgent {
    pub fn uses_server(self) -> bool {
        matches!(self, BanAgent::Server | BanAgent::Both)
    }

    pub fn uses_punkbuster(self) -> bool {
        matches!(self, BanAgent::Punkbuster | BanAgent::Both)
    }
}

/// Announcement texts. Known variables: `$clientname`, `$adminname`,
/// `$reason`, `$banduration`. An empty template disables the announcement.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct MessageTemplates {
    #[serde(default = "default_kicked")]
    #[validate(custom(function = validation::validate_template))]
    pub kicked: String,
    #[serde(default = "default_kicked_by")]
    #[validate(custom(function = validation::validate_template))]
    pub kicked_by: String,
    #[serde(default = "default_banned")]
    #[validate(custom(function = validation::validate_template))]
    pub banned: String,
    #[serde(default = "default_banned_by")]
    #[validate(custom(function = validation::validate_template))]
    pub banned_by: String,
    #[serde(default = "default_temp_banned")]
    #[validate(custom(function = validation::validate_template))]
    pub temp_banned: String,
    #[serde(default = "default_temp_banned_by")]
    #[validate(custom(function = validation::validate_template))]
    pub temp_banned_by: String,
    #[serde(default = "default_unbanned")]
    #[validate(custom(function = validation::validate_template))]
    pub unbanned: String,
    #[serde(default = "default_unbanned_by")]
    #[validate(custom(function = validation::validate_template))]
    pub unbanned_by: String,
}

fn default_kicked() -> String {
    "$clientname^7 was kicked $reason".into()
}

fn default_kicked_by() -> String {
    "$clientname^7 was kicked by $adminname^7 $reason".into()
}

fn default_banned() -> String {
    "$clientname^7 was banned $reason".into()
}

fn default_banned_by() -> String {
    "$clientname^7 was banned by $adminname^7 $reason".into()
}

fn default_temp_banned() -> String {
    "$clientname^7 was temp banned for $banduration^7 $reason".into()
}

fn default_temp_banned_by() -> String {
    "$clientname^7 was temp banned by $adminname^7 for $banduration^7 $reason".into()
}

fn default_unbanned() -> String {
    "$clientname^7 was un-banned $reason".into()
}

fn default_unbanned_by() -> String {
    "$clientname^7 was un-banned by $adminname^7 $reason".into()
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            kicked: default_kicked(),
            kicked_by: default_kicked_by(),
            banned: default_banned(),
            banned_by: default_banned_by(),
            temp_banned: default_temp_banned(),
            temp_banned_by: default_temp_banned_by(),
            unbanned: default_unbanned(),
            unbanned_by: default_unbanned_by(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct EnforcementConfig {
    #[serde(default)]
    pub ban_agent: BanAgent,

    /// Longest reason sent to the server.
    #[serde(default = "default_reason_max_len")]
    #[validate(range(min = 1, max = 256))]
    pub reason_max_len: usize,

    /// PunkBuster misbehaves on longer temp bans.
    #[serde(default = "default_punkbuster_max_minutes")]
    #[validate(range(min = 1, max = 525600))]
    pub punkbuster_max_minutes: u32,

    #[serde(default)]
    #[validate(nested)]
    pub templates: MessageTemplates,
}

fn default_reason_max_len() -> usize {
    80
}

fn default_punkbuster_max_minutes() -> u32 {
    1440
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            ban_agent: BanAgent::default(),
            reason_max_len: default_reason_max_len(),
            punkbuster_max_minutes: default_punkbuster_max_minutes(),
            templates: MessageTemplates::default(),
        }
    }
}
