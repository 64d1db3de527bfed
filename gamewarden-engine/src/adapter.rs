//! The seam between the dispatch core and a game server flavour.

use std::sync::Arc;
use std::time::Duration;

use gamewarden_core::events::Event;

use crate::command::Command;
use crate::enforcement::Sanction;
use crate::error::EngineError;
use crate::players::Player;

/// A live connection to one game server.
///
/// Implementations translate wire packets into events on the shared bus and
/// expose the outbound operations policy handlers call back into.
pub trait ProtocolAdapter: Send + Sync {
    /// Connects, authenticates and subscribes to server events. Blocks until
    /// ready or the retry budget is spent.
    fn connect(&self) -> Result<(), EngineError>;

    fn is_connected(&self) -> bool;

    fn send_command(&self, command: &Command) -> Result<Vec<String>, EngineError>;

    /// Translates one server packet without publishing it.
    fn route_packet(&self, words: &[String]) -> Result<Option<Event>, EngineError>;

    /// Public chat through the rate-limited queue.
    fn say(&self, text: &str);

    /// Private message to one player.
    fn message(&self, player: &Player, text: &str);

    /// On-screen message to everyone.
    fn yell(&self, text: &str);

    fn kick(&self, player: &Arc<Player>, sanction: Sanction<'_>) -> Result<(), EngineError>;

    fn ban(&self, player: &Arc<Player>, sanction: Sanction<'_>) -> Result<(), EngineError>;

    fn temp_ban(
        &self,
        player: &Arc<Player>,
        duration: Duration,
        sanction: Sanction<'_>,
    ) -> Result<(), EngineError>;

    fn unban(&self, player: &Arc<Player>, sanction: Sanction<'_>) -> Result<(), EngineError>;

    fn get_var(&self, name: &str) -> Result<String, EngineError>;

    fn set_var(&self, name: &str, value: &str) -> Result<(), EngineError>;

    /// Main loop. Returns when shut down, or with a fatal error.
    fn run(&self) -> Result<(), EngineError>;

    fn shutdown(&self);
}
