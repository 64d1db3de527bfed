//! Event kinds the Frostbite adapter publishes.

use gamewarden_core::events::{kinds as core, EventKind, EventRegistry};
use gamewarden_core::EventError;

pub const GAMESERVER_CONNECT: &str = "gameserver_connect";
pub const CLIENT_SQUAD_CHANGE: &str = "client_squad_change";
pub const CLIENT_SPAWN: &str = "client_spawn";
pub const GAME_ROUND_PLAYER_SCORES: &str = "game_round_player_scores";
pub const GAME_ROUND_TEAM_SCORES: &str = "game_round_team_scores";
pub const PUNKBUSTER_UNKNOWN: &str = "punkbuster_unknown";
pub const PUNKBUSTER_SCHEDULED_TASK: &str = "punkbuster_scheduled_task";
pub const PUNKBUSTER_LOST_PLAYER: &str = "punkbuster_lost_player";
pub const PUNKBUSTER_NEW_CONNECTION: &str = "punkbuster_new_connection";
pub const PUNKBUSTER_UCON: &str = "punkbuster_ucon";
pub const PUNKBUSTER_SCREENSHOT_RECEIVED: &str = "punkbuster_screenshot_received";
pub const SERVER_MAX_PLAYERS_CHANGE: &str = "server_max_players_change";

const EXTRA: &[(&str, &str)] = &[
    (GAMESERVER_CONNECT, "connected to game server"),
    (CLIENT_SQUAD_CHANGE, "Client Squad Change"),
    (CLIENT_SPAWN, "Client Spawn"),
    (GAME_ROUND_PLAYER_SCORES, "round player scores"),
    (GAME_ROUND_TEAM_SCORES, "round team scores"),
    (PUNKBUSTER_UNKNOWN, "PunkBuster unknown"),
    (PUNKBUSTER_SCHEDULED_TASK, "PunkBuster scheduled task"),
    (PUNKBUSTER_LOST_PLAYER, "PunkBuster client connection lost"),
    (PUNKBUSTER_NEW_CONNECTION, "PunkBuster client received IP"),
    (PUNKBUSTER_UCON, "PunkBuster UCON"),
    (PUNKBUSTER_SCREENSHOT_RECEIVED, "PunkBuster Screenshot received"),
    (SERVER_MAX_PLAYERS_CHANGE, "server max player count change"),
];

/// Every kind the adapter needs, resolved once.
#[derive(Debug, Clone, Copy)]
pub struct FrostbiteKinds {
    pub unknown: EventKind,
    pub say: EventKind,
    pub team_say: EventKind,
    pub squad_say: EventKind,
    pub auth: EventKind,
    pub disconnect: EventKind,
    pub kill: EventKind,
    pub team_kill: EventKind,
    pub suicide: EventKind,
    pub kick: EventKind,
    pub ban: EventKind,
    pub temp_ban: EventKind,
    pub unban: EventKind,
    pub team_change: EventKind,
    pub round_start: EventKind,
    pub round_end: EventKind,
    pub warmup: EventKind,
    pub map_change: EventKind,
    pub gameserver_connect: EventKind,
    pub squad_change: EventKind,
    pub spawn: EventKind,
    pub round_player_scores: EventKind,
    pub round_team_scores: EventKind,
    pub pb_unknown: EventKind,
    pub pb_scheduled_task: EventKind,
    pub pb_lost_player: EventKind,
    pub pb_new_connection: EventKind,
    pub pb_ucon: EventKind,
    pub pb_screenshot_received: EventKind,
    pub max_players_change: EventKind,
}

impl FrostbiteKinds {
    /// Registers the adapter-specific kinds and resolves the full set. Must
    /// run before the registry is sealed.
    pub fn register(registry: &EventRegistry) -> Result<Self, EventError> {
        for (name, label) in EXTRA {
            registry.register(name, Some(*label))?;
        }
        let id = |name: &str| registry.id_of(name);
        Ok(Self {
            unknown: id(core::UNKNOWN)?,
            say: id(core::CLIENT_SAY)?,
            team_say: id(core::CLIENT_TEAM_SAY)?,
            squad_say: id(core::CLIENT_SQUAD_SAY)?,
            auth: id(core::CLIENT_AUTH)?,
            disconnect: id(core::CLIENT_DISCONNECT)?,
            kill: id(core::CLIENT_KILL)?,
            team_kill: id(core::CLIENT_KILL_TEAM)?,
            suicide: id(core::CLIENT_SUICIDE)?,
            kick: id(core::CLIENT_KICK)?,
            ban: id(core::CLIENT_BAN)?,
            temp_ban: id(core::CLIENT_BAN_TEMP)?,
            unban: id(core::CLIENT_UNBAN)?,
            team_change: id(core::CLIENT_TEAM_CHANGE)?,
            round_start: id(core::GAME_ROUND_START)?,
            round_end: id(core::GAME_ROUND_END)?,
            warmup: id(core::GAME_WARMUP)?,
            map_change: id(core::GAME_MAP_CHANGE)?,
            gameserver_connect: id(GAMESERVER_CONNECT)?,
            squad_change: id(CLIENT_SQUAD_CHANGE)?,
            spawn: id(CLIENT_SPAWN)?,
            round_player_scores: id(GAME_ROUND_PLAYER_SCORES)?,
            round_team_scores: id(GAME_ROUND_TEAM_SCORES)?,
            pb_unknown: id(PUNKBUSTER_UNKNOWN)?,
            pb_scheduled_task: id(PUNKBUSTER_SCHEDULED_TASK)?,
            pb_lost_player: id(PUNKBUSTER_LOST_PLAYER)?,
            pb_new_connection: id(PUNKBUSTER_NEW_CONNECTION)?,
            pb_ucon: id(PUNKBUSTER_UCON)?,
            pb_screenshot_received: id(PUNKBUSTER_SCREENSHOT_RECEIVED)?,
            max_players_change: id(SERVER_MAX_PLAYERS_CHANGE)?,
        })
    }

    /// Wire names published as-is, with the raw fields as payload.
    pub fn pass_through(&self) -> [(&'static str, EventKind); 1] {
        [("server.onMaxPlayerCountChange", self.max_players_change)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_repeatable_and_fails_once_sealed() {
        let registry = EventRegistry::new();
        let first = FrostbiteKinds::register(&registry).unwrap();
        let second = FrostbiteKinds::register(&registry).unwrap();
        assert_eq!(first.spawn, second.spawn);
        assert_eq!(registry.label_of(CLIENT_SPAWN).unwrap(), "Client Spawn");
        assert_eq!(first.pass_through()[0].1, first.max_players_change);

        let sealed = EventRegistry::new();
        sealed.seal();
        assert!(matches!(
            FrostbiteKinds::register(&sealed),
            Err(EventError::RegistrySealed(_))
        ));
    }
}
