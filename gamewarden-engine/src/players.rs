//! Connected players, their message delivery and the persisted-player
//! lookup.
//!
//! A [`Player`] is shared between the roster, events in flight and policy
//! handlers. Mutable session details live behind a lock so handlers only
//! ever read them. How private messages reach a player is decided when the
//! session is created, through a [`MessageDelivery`] strategy.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use gamewarden_core::events::Actor;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::command::{frostbite, CommandSender};
use crate::error::EngineError;
use crate::outbound::{OutboundOptions, OutboundQueue};

/// Team as reported by the server. Frostbite uses `0` for the neutral
/// spectator team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Team {
    #[default]
    Unknown,
    Spectator,
    Id(u8),
}

impl Team {
    pub fn from_wire(value: &str) -> Self {
        match value.trim().parse::<u8>() {
            Ok(0) => Team::Spectator,
            Ok(id) => Team::Id(id),
            Err(_) => Team::Unknown,
        }
    }

    /// Whether two players on these teams count as team mates.
    pub fn same_side(self, other: Team) -> bool {
        matches!((self, other), (Team::Id(a), Team::Id(b)) if a == b)
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Team::Unknown => f.write_str("unknown"),
            Team::Spectator => f.write_str("spectator"),
            Team::Id(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerState {
    pub guid: Option<String>,
    /// PunkBuster id.
    pub pbid: Option<String>,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub team: Team,
    pub squad: Option<u8>,
    pub connected: bool,
    pub authed: bool,
}

/// How text is pushed to a single player.
pub trait MessageDelivery: Send + Sync {
    fn deliver(&self, player: &str, text: &str);
    /// Called once the session ends.
    fn close(&self) {}
}

/// Per-player rate-limited queue.
pub struct QueuedDelivery {
    queue: OutboundQueue,
}

impl QueuedDelivery {
    pub fn start(
        player: &str,
        sender: Arc<dyn CommandSender>,
        options: OutboundOptions,
    ) -> Result<Self, EngineError> {
        let target = player.to_string();
        let sink = move |line: &str| -> Result<(), EngineError> {
            sender.send_command(&frostbite::say_player(line, &target))?;
            Ok(())
        };
        let options = OutboundOptions {
            name: format!("pm-{player}"),
            ..options
        };
        Ok(Self {
            queue: OutboundQueue::start(Arc::new(sink), options)?,
        })
    }
}

impl MessageDelivery for QueuedDelivery {
    fn deliver(&self, _player: &str, text: &str) {
        self.queue.enqueue(text);
    }

    fn close(&self) {
        self.queue.shutdown();
    }
}

/// Sends immediately on the caller's thread.
pub struct DirectDelivery {
    sender: Arc<dyn CommandSender>,
}

impl DirectDelivery {
    pub fn new(sender: Arc<dyn CommandSender>) -> Self {
        Self { sender }
    }
}

impl MessageDelivery for DirectDelivery {
    fn deliver(&self, player: &str, text: &str) {
        if let Err(err) = self.sender.send_command(&frostbite::say_player(text, player)) {
            warn!(player, error = %err, "Private message not delivered");
        }
    }
}

/// For players that are not connected.
pub struct NullDelivery;

impl MessageDelivery for NullDelivery {
    fn deliver(&self, player: &str, _text: &str) {
        debug!(player, "Dropping message to offline player");
    }
}

pub struct Player {
    name: String,
    state: Mutex<PlayerState>,
    delivery: Arc<dyn MessageDelivery>,
}

impl Player {
    pub fn new(name: impl Into<String>, delivery: Arc<dyn MessageDelivery>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(PlayerState {
                connected: true,
                ..Default::default()
            }),
            delivery,
        }
    }

    /// A record for someone who is not on the server, e.g. for an offline ban.
    pub fn offline(name: impl Into<String>, guid: Option<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(PlayerState {
                guid,
                ..Default::default()
            }),
            delivery: Arc::new(NullDelivery),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PlayerState {
        self.state.lock().clone()
    }

    pub fn update<T>(&self, f: impl FnOnce(&mut PlayerState) -> T) -> T {
        f(&mut self.state.lock())
    }

    pub fn guid(&self) -> Option<String> {
        self.state.lock().guid.clone()
    }

    pub fn pbid(&self) -> Option<String> {
        self.state.lock().pbid.clone()
    }

    pub fn ip(&self) -> Option<String> {
        self.state.lock().ip.clone()
    }

    pub fn team(&self) -> Team {
        self.state.lock().team
    }

    pub fn squad(&self) -> Option<u8> {
        self.state.lock().squad
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn is_authed(&self) -> bool {
        self.state.lock().authed
    }

    pub fn message(&self, text: &str) {
        self.delivery.deliver(&self.name, text);
    }

    fn end_session(&self) {
        self.state.lock().connected = false;
        self.delivery.close();
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("name", &self.name)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl Actor for Player {
    fn actor_id(&self) -> String {
        self.guid().unwrap_or_else(|| self.name.clone())
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Live sessions keyed by the in-game name.
pub trait PlayerRegistry: Send + Sync {
    fn by_name(&self, name: &str) -> Option<Arc<Player>>;
    fn by_guid(&self, guid: &str) -> Option<Arc<Player>>;
    /// Returns the session and whether it was just created.
    fn get_or_create(&self, name: &str) -> (Arc<Player>, bool);
    fn disconnect(&self, name: &str) -> Option<Arc<Player>>;
    fn connected(&self) -> Vec<Arc<Player>>;
}

pub type DeliveryFactory = Box<dyn Fn(&str) -> Arc<dyn MessageDelivery> + Send + Sync>;

pub struct Roster {
    players: RwLock<HashMap<String, Arc<Player>>>,
    delivery: DeliveryFactory,
}

impl Roster {
    pub fn new(delivery: DeliveryFactory) -> Self {
        Self {
            players: RwLock::new(HashMap::new()),
            delivery,
        }
    }

    /// Roster whose players cannot be messaged.
    pub fn silent() -> Self {
        Self::new(Box::new(|_: &str| -> Arc<dyn MessageDelivery> {
            Arc::new(NullDelivery)
        }))
    }

    pub fn len(&self) -> usize {
        self.players.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.read().is_empty()
    }

    /// Ends every session, e.g. after the connection dropped.
    pub fn clear(&self) {
        let players: Vec<_> = self.players.write().drain().map(|(_, p)| p).collect();
        for player in players {
            player.end_session();
        }
    }
}

impl PlayerRegistry for Roster {
    fn by_name(&self, name: &str) -> Option<Arc<Player>> {
        self.players.read().get(name).cloned()
    }

    fn by_guid(&self, guid: &str) -> Option<Arc<Player>> {
        self.players
            .read()
            .values()
            .find(|p| p.guid().as_deref() == Some(guid))
            .cloned()
    }

    fn get_or_create(&self, name: &str) -> (Arc<Player>, bool) {
        if let Some(player) = self.by_name(name) {
            return (player, false);
        }
        let mut players = self.players.write();
        if let Some(player) = players.get(name) {
            return (player.clone(), false);
        }
        let player = Arc::new(Player::new(name, (self.delivery)(name)));
        players.insert(name.to_string(), player.clone());
        debug!(player = name, "Player session created");
        (player, true)
    }

    fn disconnect(&self, name: &str) -> Option<Arc<Player>> {
        let player = self.players.write().remove(name)?;
        player.end_session();
        debug!(player = name, "Player session ended");
        Some(player)
    }

    fn connected(&self) -> Vec<Arc<Player>> {
        let mut players: Vec<_> = self.players.read().values().cloned().collect();
        players.sort_by(|a, b| a.name().cmp(b.name()));
        players
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPlayer {
    pub guid: String,
    pub name: String,
}

/// Read access to persisted player records.
pub trait PlayerStore: Send + Sync {
    fn find_by_anticheat_id(&self, pbid: &str) -> Vec<StoredPlayer>;
}

pub struct NullStore;

impl PlayerStore for NullStore {
    fn find_by_anticheat_id(&self, _pbid: &str) -> Vec<StoredPlayer> {
        Vec::new()
    }
}

/// In-memory store keyed by PunkBuster id.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Vec<StoredPlayer>>>,
}

impl MemoryStore {
    pub fn insert(&self, pbid: &str, player: StoredPlayer) {
        self.records
            .write()
            .entry(pbid.to_ascii_lowercase())
            .or_default()
            .push(player);
    }
}

impl PlayerStore for MemoryStore {
    fn find_by_anticheat_id(&self, pbid: &str) -> Vec<StoredPlayer> {
        self.records
            .read()
            .get(&pbid.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, String)>>,
        closed: Mutex<u32>,
    }

    impl MessageDelivery for Recorder {
        fn deliver(&self, player: &str, text: &str) {
            self.sent.lock().push((player.into(), text.into()));
        }
        fn close(&self) {
            *self.closed.lock() += 1;
        }
    }

    #[test]
    fn test_team_parsing_and_sides() {
        assert_eq!(Team::from_wire("0"), Team::Spectator);
        assert_eq!(Team::from_wire("2"), Team::Id(2));
        assert_eq!(Team::from_wire("x"), Team::Unknown);
        assert!(Team::Id(1).same_side(Team::Id(1)));
        assert!(!Team::Unknown.same_side(Team::Id(1)));
        assert!(!Team::Unknown.same_side(Team::Unknown));
        assert!(!Team::Spectator.same_side(Team::Spectator));
    }

    #[test]
    fn test_roster_creates_once_and_injects_delivery() {
        let recorder = Arc::new(Recorder::default());
        let factory_recorder = recorder.clone();
        let roster = Roster::new(Box::new(move |_: &str| -> Arc<dyn MessageDelivery> {
            factory_recorder.clone()
        }));

        let (first, created) = roster.get_or_create("Alice");
        assert!(created);
        let (again, created) = roster.get_or_create("Alice");
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &again));

        first.message("hello");
        assert_eq!(recorder.sent.lock()[0], ("Alice".into(), "hello".into()));

        first.update(|s| s.guid = Some("EA_1".into()));
        assert!(roster.by_guid("EA_1").is_some());

        let gone = roster.disconnect("Alice").unwrap();
        assert!(!gone.is_connected());
        assert_eq!(*recorder.closed.lock(), 1);
        assert!(roster.by_name("Alice").is_none());
    }

    #[test]
    fn test_actor_identity_prefers_guid() {
        let player = Player::offline("Bob", None);
        assert_eq!(player.actor_id(), "Bob");
        player.update(|s| s.guid = Some("EA_B".into()));
        assert_eq!(player.actor_id(), "EA_B");
        assert!(!player.is_connected());
    }

    #[test]
    fn test_memory_store_lookup_is_case_insensitive() {
        let store = MemoryStore::default();
        store.insert(
            "ABCDEF",
            StoredPlayer {
                guid: "EA_1".into(),
                name: "Alice".into(),
            },
        );
        assert_eq!(store.find_by_anticheat_id("abcdef").len(), 1);
        assert!(NullStore.find_by_anticheat_id("abcdef").is_empty());
    }
}
