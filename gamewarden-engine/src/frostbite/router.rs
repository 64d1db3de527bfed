//! Server packet to event translation.
//!
//! Wire names look like `actor.onEvent`. They are normalised to
//! `actor.event` (lowercase) and looked up in a route table built once at
//! construction. Names without a route fall back to a static name-to-kind
//! map carrying the raw words. Anything else becomes an `unknown` event.

use std::collections::HashMap;
use std::sync::Arc;

use gamewarden_core::events::{ActorRef, Event, EventKind, Payload};
use gamewarden_core::{EventBus, EventError};
use gamewarden_protocols::{PatternTable, PbMessage, PlayerInfoBlock};
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use super::kinds::FrostbiteKinds;
use crate::command::{frostbite as cmd, CommandSender};
use crate::enforcement::RecentKicks;
use crate::error::EngineError;
use crate::players::{Player, PlayerRegistry, PlayerStore, Team};

pub(crate) type RouteFn = fn(&Router, &[String]) -> Result<Option<Event>, EngineError>;

/// Name used by the server for its own chat lines and environmental kills.
pub const SERVER_ACTOR: &str = "Server";

const COMMAND_PREFIXES: [char; 3] = ['!', '@', '&'];

/// Level and round bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameState {
    pub map: Option<String>,
    pub game_type: Option<String>,
    /// One-based index of the current round, as reported by the server.
    pub round: u32,
    pub max_rounds: u32,
    pub waiting_for_round_start: bool,
    pub round_started_at: Option<i64>,
}

/// `player.onChat` -> `player.chat`
pub fn route_key(wire_name: &str) -> Option<String> {
    let (actor, event) = wire_name.split_once('.')?;
    let event = match event.strip_prefix("on") {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_uppercase()) => rest,
        _ => event,
    };
    if actor.is_empty() || event.is_empty() {
        return None;
    }
    Some(format!(
        "{}.{}",
        actor.to_ascii_lowercase(),
        event.to_ascii_lowercase()
    ))
}

pub struct Router {
    pub(crate) kinds: FrostbiteKinds,
    pub(crate) players: Arc<dyn PlayerRegistry>,
    pub(crate) store: Arc<dyn PlayerStore>,
    bus: EventBus,
    game: Mutex<GameState>,
    routes: HashMap<String, RouteFn>,
    fallback: HashMap<String, EventKind>,
    recent_kicks: RecentKicks,
    pub(crate) punkbuster: &'static PatternTable<PbMessage>,
    world: Arc<Player>,
}

impl Router {
    pub fn new(
        kinds: FrostbiteKinds,
        players: Arc<dyn PlayerRegistry>,
        store: Arc<dyn PlayerStore>,
        bus: EventBus,
        recent_kicks: RecentKicks,
        fallback: &[(&str, EventKind)],
    ) -> Result<Self, EngineError> {
        let entries: [(&str, RouteFn); 14] = [
            ("player.onChat", Router::on_player_chat),
            ("player.onLeave", Router::on_player_leave),
            ("player.onJoin", Router::on_player_join),
            ("player.onAuthenticated", Router::on_player_authenticated),
            ("player.onSpawn", Router::on_player_spawn),
            ("player.onKill", Router::on_player_kill),
            ("player.onKicked", Router::on_player_kicked),
            ("player.onTeamChange", Router::on_player_team_change),
            ("player.onSquadChange", Router::on_player_squad_change),
            ("server.onLevelLoaded", Router::on_server_level_loaded),
            ("server.onRoundOver", Router::on_server_round_over),
            ("server.onRoundOverPlayers", Router::on_server_round_over_players),
            ("server.onRoundOverTeamScores", Router::on_server_round_over_team_scores),
            ("punkBuster.onMessage", Router::on_punkbuster_message),
        ];
        let routes = entries
            .into_iter()
            .filter_map(|(wire, route)| Some((route_key(wire)?, route)))
            .collect();
        let fallback = fallback
            .iter()
            .map(|(wire, kind)| (wire.to_string(), *kind))
            .collect();

        Ok(Self {
            kinds,
            players,
            store,
            bus,
            // Connecting mid-level still yields a round start at the first spawn.
            game: Mutex::new(GameState {
                waiting_for_round_start: true,
                ..GameState::default()
            }),
            routes,
            fallback,
            recent_kicks,
            punkbuster: gamewarden_protocols::punkbuster::table()?,
            world: Arc::new(Player::offline(SERVER_ACTOR, None)),
        })
    }

    pub fn game(&self) -> GameState {
        self.game.lock().clone()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Translates one server packet. The returned event has not been
    /// published yet.
    pub fn route(&self, words: &[String]) -> Result<Option<Event>, EngineError> {
        let Some((name, data)) = words.split_first() else {
            warn!("Cannot route an empty packet");
            return Ok(None);
        };

        if let Some(route) = route_key(name).and_then(|key| self.routes.get(&key)) {
            trace!(event = %name, "Routing server event");
            return route(self, data);
        }
        if let Some(kind) = self.fallback.get(name.as_str()) {
            return Ok(Some(Event::new(*kind, Payload::Words(data.to_vec()))));
        }
        warn!(event = %name, data = ?data, "Unhandled server event");
        Ok(Some(Event::new(
            self.kinds.unknown,
            Payload::Words(words.to_vec()),
        )))
    }

    /// Routes and publishes. Publication problems are logged, not returned.
    pub fn handle(&self, words: &[String]) -> Result<(), EngineError> {
        if let Some(event) = self.route(words)? {
            self.publish(event);
        }
        Ok(())
    }

    pub(crate) fn publish(&self, event: Event) {
        match self.bus.publish(event) {
            Ok(()) => {}
            Err(EventError::Closed) => debug!("Event bus closed, event discarded"),
            Err(err) => warn!(error = %err, "Event not published"),
        }
    }

    pub(crate) fn player(&self, name: &str) -> Arc<Player> {
        self.players.get_or_create(name).0
    }

    fn actor(player: &Arc<Player>) -> ActorRef {
        player.clone()
    }

    fn on_player_chat(&self, data: &[String]) -> Result<Option<Event>, EngineError> {
        let (Some(name), Some(text)) = (data.first(), data.get(1)) else {
            return Ok(None);
        };
        if name == SERVER_ACTOR {
            return Ok(None);
        }
        let player = self.player(name);

        let mut text = text.as_str();
        if let Some(rest) = text.strip_prefix('/') {
            if rest.starts_with(COMMAND_PREFIXES) {
                text = rest;
            }
        }

        let scope = data.get(2).map(String::as_str).unwrap_or("all");
        let kind = if scope.contains("team") {
            self.kinds.team_say
        } else if scope.contains("squad") {
            self.kinds.squad_say
        } else {
            self.kinds.say
        };
        Ok(Some(Event::new(kind, text).with_source(Self::actor(&player))))
    }

    fn on_player_leave(&self, data: &[String]) -> Result<Option<Event>, EngineError> {
        let Some(name) = data.first() else {
            return Ok(None);
        };
        Ok(self.players.disconnect(name).map(|player| {
            Event::new(self.kinds.disconnect, name.as_str()).with_source(Self::actor(&player))
        }))
    }

    /// Sent before the client has really connected, and not always followed by
    /// a leave when the connection fails. Sessions are created by later events.
    fn on_player_join(&self, data: &[String]) -> Result<Option<Event>, EngineError> {
        debug!(player = ?data.first(), "Ignoring join");
        Ok(None)
    }

    fn on_player_authenticated(&self, data: &[String]) -> Result<Option<Event>, EngineError> {
        let Some(name) = data.first() else {
            return Ok(None);
        };
        let player = self.player(name);
        let guid = data.get(1).filter(|g| !g.is_empty()).cloned();
        player.update(|state| {
            if guid.is_some() {
                state.guid = guid;
            }
            state.authed = state.guid.is_some();
        });
        Ok(Some(
            Event::new(self.kinds.auth, Payload::Empty).with_source(Self::actor(&player)),
        ))
    }

    fn on_player_spawn(&self, data: &[String]) -> Result<Option<Event>, EngineError> {
        let (Some(name), Some(team)) = (data.first(), data.get(1)) else {
            return Ok(None);
        };
        let player = self.player(name);
        player.update(|state| state.team = Team::from_wire(team));

        if let Some(round_start) = self.take_round_start() {
            self.publish(round_start);
        }
        Ok(Some(
            Event::new(self.kinds.spawn, Payload::Empty).with_source(Self::actor(&player)),
        ))
    }

    /// Frostbite 2 has no level-started event: the round starts at the first
    /// spawn after a level load.
    fn take_round_start(&self) -> Option<Event> {
        let mut game = self.game.lock();
        if !game.waiting_for_round_start {
            return None;
        }
        game.waiting_for_round_start = false;
        let now = chrono::Utc::now().timestamp();
        game.round_started_at = Some(now);
        debug!(round = game.round, map = ?game.map, "Round started");
        Some(
            Event::new(
                self.kinds.round_start,
                Payload::fields([
                    ("round", game.round.to_string()),
                    ("map", game.map.clone().unwrap_or_default()),
                    ("game_type", game.game_type.clone().unwrap_or_default()),
                ]),
            )
            .with_timestamp(now),
        )
    }

    fn on_player_kill(&self, data: &[String]) -> Result<Option<Event>, EngineError> {
        let [attacker, victim, weapon, headshot, ..] = data else {
            debug!(data = ?data, "Kill event with missing fields");
            return Ok(None);
        };
        let attacker = if attacker.is_empty() || attacker == SERVER_ACTOR {
            self.world.clone()
        } else {
            self.player(attacker)
        };
        let victim = self.player(victim);

        let kind = if Arc::ptr_eq(&attacker, &victim) {
            self.kinds.suicide
        } else if attacker.team().same_side(victim.team()) {
            self.kinds.team_kill
        } else {
            self.kinds.kill
        };
        let hit_location = if headshot == "true" { "head" } else { "torso" };

        Ok(Some(
            Event::new(kind, Payload::words(["100", weapon.as_str(), hit_location]))
                .with_source(Self::actor(&attacker))
                .with_target(Self::actor(&victim)),
        ))
    }

    fn on_player_kicked(&self, data: &[String]) -> Result<Option<Event>, EngineError> {
        let (Some(name), Some(reason)) = (data.first(), data.get(1)) else {
            return Ok(None);
        };
        if self.recent_kicks.take(name) {
            debug!(player = %name, "Kick already reported");
            return Ok(None);
        }
        let mut event = Event::new(
            self.kinds.kick,
            Payload::fields([("reason", reason.as_str()), ("admin", "")]),
        );
        if let Some(player) = self.players.by_name(name) {
            event = event.with_source(Self::actor(&player));
        }
        Ok(Some(event))
    }

    fn on_player_team_change(&self, data: &[String]) -> Result<Option<Event>, EngineError> {
        let (Some(name), Some(team)) = (data.first(), data.get(1)) else {
            return Ok(None);
        };
        let player = self.player(name);
        let team = Team::from_wire(team);
        let squad = data.get(2).and_then(|s| s.parse().ok());
        player.update(|state| {
            state.team = team;
            state.squad = squad;
        });
        Ok(Some(
            Event::new(self.kinds.team_change, team.to_string()).with_source(Self::actor(&player)),
        ))
    }

    fn on_player_squad_change(&self, data: &[String]) -> Result<Option<Event>, EngineError> {
        let (Some(name), Some(team)) = (data.first(), data.get(1)) else {
            return Ok(None);
        };
        let player = self.player(name);
        let team = Team::from_wire(team);
        let squad: Option<u8> = data.get(2).and_then(|s| s.parse().ok());
        player.update(|state| {
            state.team = team;
            state.squad = squad;
        });
        Ok(Some(
            Event::new(self.kinds.squad_change, i64::from(squad.unwrap_or(0)))
                .with_source(Self::actor(&player)),
        ))
    }

    fn on_server_level_loaded(&self, data: &[String]) -> Result<Option<Event>, EngineError> {
        let Some(map) = data.first() else {
            return Ok(None);
        };
        let number = |idx: usize| -> u32 {
            data.get(idx)
                .and_then(|n| n.parse().ok())
                .unwrap_or_else(|| {
                    warn!(data = ?data, field = idx, "Bad number in level load");
                    0
                })
        };

        let previous = {
            let mut game = self.game.lock();
            let previous = game.map.replace(map.clone());
            game.game_type = data.get(1).cloned();
            game.round = number(2) + 1;
            game.max_rounds = number(3);
            game.waiting_for_round_start = true;
            previous
        };
        debug!(map = %map, game_type = ?data.get(1), "Level loaded");

        if let Some(previous) = previous.filter(|p| p != map) {
            self.publish(Event::new(
                self.kinds.map_change,
                Payload::fields([("map", map.as_str()), ("previous", previous.as_str())]),
            ));
        }
        Ok(Some(Event::new(self.kinds.warmup, map.as_str())))
    }

    fn on_server_round_over(&self, data: &[String]) -> Result<Option<Event>, EngineError> {
        let winner = data.first().map(String::as_str).unwrap_or_default();
        Ok(Some(Event::new(self.kinds.round_end, winner)))
    }

    fn on_server_round_over_players(&self, data: &[String]) -> Result<Option<Event>, EngineError> {
        if let Err(err) = PlayerInfoBlock::parse(data) {
            warn!(error = %err, "Malformed end of round player scores");
            return Ok(None);
        }
        Ok(Some(Event::new(
            self.kinds.round_player_scores,
            Payload::Words(data.to_vec()),
        )))
    }

    fn on_server_round_over_team_scores(
        &self,
        data: &[String],
    ) -> Result<Option<Event>, EngineError> {
        Ok(Some(Event::new(
            self.kinds.round_team_scores,
            Payload::Words(data.to_vec()),
        )))
    }

    /// Seeds the game state from a `serverInfo` reply:
    /// `name players max_players game_type map rounds_played rounds_total ...`
    pub fn apply_server_info(&self, info: &[String]) {
        let [name, _, _, game_type, map, played, total, ..] = info else {
            warn!(reply = ?info, "Short serverInfo reply");
            return;
        };
        let mut game = self.game.lock();
        game.map = Some(map.clone());
        game.game_type = Some(game_type.clone());
        if let Ok(played) = played.parse::<u32>() {
            game.round = played + 1;
        }
        if let Ok(total) = total.parse() {
            game.max_rounds = total;
        }
        debug!(server = %name, map = %map, round = game.round, "Server info");
    }

    /// Reconciles the roster with `admin.listPlayers`: updates known
    /// sessions, creates missing ones and ends sessions the server no longer
    /// lists.
    pub fn sync_roster(&self, sender: &dyn CommandSender) -> Result<usize, EngineError> {
        let words = sender.send_command(&cmd::list_players())?;
        let block = match PlayerInfoBlock::parse(&words) {
            Ok(block) => block,
            Err(err) => {
                error!(error = %err, "Unreadable player list");
                return Ok(self.players.connected().len());
            }
        };

        let mut listed = Vec::with_capacity(block.len());
        for info in block.iter() {
            let Some(name) = info.name() else { continue };
            let player = self.player(name);
            player.update(|state| {
                if let Some(guid) = info.get("guid").filter(|g| !g.is_empty()) {
                    state.guid = Some(guid.to_string());
                }
                if let Some(team) = info.get("teamId") {
                    state.team = Team::from_wire(team);
                }
                if let Some(squad) = info.get("squadId").and_then(|s| s.parse().ok()) {
                    state.squad = Some(squad);
                }
                state.authed = state.guid.is_some();
            });
            listed.push(name.to_string());
        }

        for player in self.players.connected() {
            if !listed.iter().any(|name| name == player.name()) {
                if let Some(gone) = self.players.disconnect(player.name()) {
                    debug!(player = %gone.name(), "Removing session missing from player list");
                    self.publish(
                        Event::new(self.kinds.disconnect, gone.name()).with_source(Self::actor(&gone)),
                    );
                }
            }
        }
        debug!(players = listed.len(), "Roster synchronised");
        Ok(listed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_keys() {
        assert_eq!(route_key("player.onChat").as_deref(), Some("player.chat"));
        assert_eq!(
            route_key("server.onLevelLoaded").as_deref(),
            Some("server.levelloaded")
        );
        assert_eq!(
            route_key("punkBuster.onMessage").as_deref(),
            Some("punkbuster.message")
        );
        assert_eq!(route_key("server.online").as_deref(), Some("server.online"));
        assert_eq!(route_key("version"), None);
    }
}
