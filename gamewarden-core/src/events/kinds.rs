//! Names of the kinds every registry starts with.
//!
//! Adapters add their own kinds on top of these before the registry is
//! sealed.

pub const EXIT: &str = "exit";
pub const STOP: &str = "stop";
pub const UNKNOWN: &str = "unknown";
pub const CUSTOM: &str = "custom";

pub const PLUGIN_ENABLED: &str = "plugin_enabled";
pub const PLUGIN_DISABLED: &str = "plugin_disabled";
pub const PLUGIN_LOADED: &str = "plugin_loaded";
pub const PLUGIN_UNLOADED: &str = "plugin_unloaded";

pub const CLIENT_SAY: &str = "client_say";
pub const CLIENT_TEAM_SAY: &str = "client_team_say";
pub const CLIENT_SQUAD_SAY: &str = "client_squad_say";
pub const CLIENT_PRIVATE_SAY: &str = "client_private_say";
pub const CLIENT_CONNECT: &str = "client_connect";
pub const CLIENT_AUTH: &str = "client_auth";
pub const CLIENT_DISCONNECT: &str = "client_disconnect";
pub const CLIENT_UPDATE: &str = "client_update";
pub const CLIENT_KILL: &str = "client_kill";
pub const CLIENT_GIB: &str = "client_gib";
pub const CLIENT_GIB_TEAM: &str = "client_gib_team";
pub const CLIENT_GIB_SELF: &str = "client_gib_self";
pub const CLIENT_SUICIDE: &str = "client_suicide";
pub const CLIENT_KILL_TEAM: &str = "client_kill_team";
pub const CLIENT_DAMAGE: &str = "client_damage";
pub const CLIENT_DAMAGE_SELF: &str = "client_damage_self";
pub const CLIENT_DAMAGE_TEAM: &str = "client_damage_team";
pub const CLIENT_JOIN: &str = "client_join";
pub const CLIENT_NAME_CHANGE: &str = "client_name_change";
pub const CLIENT_TEAM_CHANGE: &str = "client_team_change";
pub const CLIENT_TEAM_CHANGE2: &str = "client_team_change2";
pub const CLIENT_ITEM_PICKUP: &str = "client_item_pickup";
pub const CLIENT_ACTION: &str = "client_action";
pub const CLIENT_KICK: &str = "client_kick";
pub const CLIENT_BAN: &str = "client_ban";
pub const CLIENT_BAN_TEMP: &str = "client_ban_temp";
pub const CLIENT_UNBAN: &str = "client_unban";
pub const CLIENT_WARN: &str = "client_warn";
pub const CLIENT_NOTICE: &str = "client_notice";

pub const GAME_ROUND_START: &str = "game_round_start";
pub const GAME_ROUND_END: &str = "game_round_end";
pub const GAME_WARMUP: &str = "game_warmup";
pub const GAME_EXIT: &str = "game_exit";
pub const GAME_MAP_CHANGE: &str = "game_map_change";

/// `(name, label)` pairs pre-registered by [`EventRegistry::new`](super::EventRegistry::new),
/// in id order.
pub const CORE: &[(&str, &str)] = &[
    (EXIT, "Program Exit"),
    (STOP, "Stop Process"),
    (UNKNOWN, "Unknown Event"),
    (CUSTOM, "Custom Event"),
    (PLUGIN_ENABLED, "Plugin Enabled"),
    (PLUGIN_DISABLED, "Plugin Disabled"),
    (PLUGIN_LOADED, "Plugin Loaded"),
    (PLUGIN_UNLOADED, "Plugin Unloaded"),
    (CLIENT_SAY, "Say"),
    (CLIENT_TEAM_SAY, "Team Say"),
    (CLIENT_SQUAD_SAY, "Squad Say"),
    (CLIENT_PRIVATE_SAY, "Private Message"),
    (CLIENT_CONNECT, "Client Connect"),
    (CLIENT_AUTH, "Client Authenticated"),
    (CLIENT_DISCONNECT, "Client Disconnect"),
    (CLIENT_UPDATE, "Client Update"),
    (CLIENT_KILL, "Client Kill"),
    (CLIENT_GIB, "Client Gib"),
    (CLIENT_GIB_TEAM, "Client Gib Team"),
    (CLIENT_GIB_SELF, "Client Gib Self"),
    (CLIENT_SUICIDE, "Client Suicide"),
    (CLIENT_KILL_TEAM, "Client Team Kill"),
    (CLIENT_DAMAGE, "Client Damage"),
    (CLIENT_DAMAGE_SELF, "Client Damage Self"),
    (CLIENT_DAMAGE_TEAM, "Client Team Damage"),
    (CLIENT_JOIN, "Client Join Team"),
    (CLIENT_NAME_CHANGE, "Client Name Change"),
    // new team only
    (CLIENT_TEAM_CHANGE, "Client Team Change"),
    // previous and new team
    (CLIENT_TEAM_CHANGE2, "Client Team Change 2"),
    (CLIENT_ITEM_PICKUP, "Client Item Pickup"),
    (CLIENT_ACTION, "Client Action"),
    (CLIENT_KICK, "Client Kicked"),
    (CLIENT_BAN, "Client Banned"),
    (CLIENT_BAN_TEMP, "Client Temp Banned"),
    (CLIENT_UNBAN, "Client Unbanned"),
    (CLIENT_WARN, "Client Warned"),
    (CLIENT_NOTICE, "Client given a notice"),
    (GAME_ROUND_START, "Game Round Start"),
    (GAME_ROUND_END, "Game Round End"),
    (GAME_WARMUP, "Game Warmup"),
    (GAME_EXIT, "Game Exit"),
    (GAME_MAP_CHANGE, "Map Changed"),
];
