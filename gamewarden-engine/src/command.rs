//! Outbound RCON commands.

use std::fmt;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    words: Vec<String>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            words: vec![name.into()],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.words.push(arg.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.words[0]
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.words.join(" "))
    }
}

/// Anything that can execute a command against the game server.
pub trait CommandSender: Send + Sync {
    /// Sends `command` and returns the reply words after the `OK` status.
    fn send_command(&self, command: &Command) -> Result<Vec<String>, EngineError>;
}

/// Frostbite 2 command templates.
pub mod frostbite {
    use super::Command;

    pub fn login_plain_text(password: &str) -> Command {
        Command::new("login.plainText").arg(password)
    }

    pub fn events_enabled(enabled: bool) -> Command {
        Command::new("admin.eventsEnabled").arg(if enabled { "true" } else { "false" })
    }

    pub fn version() -> Command {
        Command::new("version")
    }

    pub fn server_info() -> Command {
        Command::new("serverInfo")
    }

    pub fn list_players() -> Command {
        Command::new("admin.listPlayers").arg("all")
    }

    pub fn say_all(message: &str) -> Command {
        Command::new("admin.say").arg(message).arg("all")
    }

    pub fn say_player(message: &str, player: &str) -> Command {
        Command::new("admin.say").arg(message).arg("player").arg(player)
    }

    pub fn yell_all(message: &str, duration_secs: u32) -> Command {
        Command::new("admin.yell")
            .arg(message)
            .arg(duration_secs.to_string())
    }

    pub fn yell_player(message: &str, duration_secs: u32, player: &str) -> Command {
        Command::new("admin.yell")
            .arg(message)
            .arg(duration_secs.to_string())
            .arg("player")
            .arg(player)
    }

    pub fn kick(player: &str, reason: &str) -> Command {
        Command::new("admin.kickPlayer").arg(player).arg(reason)
    }

    pub fn ban_guid(guid: &str, reason: &str) -> Command {
        Command::new("banList.add")
            .arg("guid")
            .arg(guid)
            .arg("perm")
            .arg(reason)
    }

    pub fn ban_name(name: &str, reason: &str) -> Command {
        Command::new("banList.add")
            .arg("name")
            .arg(name)
            .arg("perm")
            .arg(reason)
    }

    pub fn temp_ban_guid(guid: &str, seconds: u64, reason: &str) -> Command {
        Command::new("banList.add")
            .arg("guid")
            .arg(guid)
            .arg("seconds")
            .arg(seconds.to_string())
            .arg(reason)
    }

    pub fn temp_ban_name(name: &str, seconds: u64, reason: &str) -> Command {
        Command::new("banList.add")
            .arg("name")
            .arg(name)
            .arg("seconds")
            .arg(seconds.to_string())
            .arg(reason)
    }

    pub fn unban_guid(guid: &str) -> Command {
        Command::new("banList.remove").arg("guid").arg(guid)
    }

    pub fn unban_name(name: &str) -> Command {
        Command::new("banList.remove").arg("name").arg(name)
    }

    pub fn unban_ip(ip: &str) -> Command {
        Command::new("banList.remove").arg("ip").arg(ip)
    }

    pub fn save_ban_list() -> Command {
        Command::new("banList.save")
    }

    pub fn get_var(name: &str) -> Command {
        Command::new(format!("vars.{name}"))
    }

    pub fn set_var(name: &str, value: &str) -> Command {
        Command::new(format!("vars.{name}")).arg(value)
    }

    pub fn punkbuster_is_active() -> Command {
        Command::new("punkBuster.isActive")
    }

    /// Raw PunkBuster server command, e.g. `pb_sv_plist`.
    pub fn punkbuster(command: &str) -> Command {
        Command::new("punkBuster.pb_sv_command").arg(command)
    }
}

#[cfg(test)]
mod tests {
    use super::frostbite::*;

    #[test]
    fn test_templates() {
        assert_eq!(say_all("hi").to_string(), "admin.say hi all");
        assert_eq!(
            temp_ban_guid("EA_1", 120, "spam").words(),
            ["banList.add", "guid", "EA_1", "seconds", "120", "spam"]
        );
        assert_eq!(say_player("hi", "Joe").words()[2..], ["player", "Joe"]);
        assert_eq!(server_info().to_string(), "serverInfo");
        assert_eq!(get_var("serverName").name(), "vars.serverName");
        assert_eq!(punkbuster("pb_sv_plist").words()[1], "pb_sv_plist");
    }
}
