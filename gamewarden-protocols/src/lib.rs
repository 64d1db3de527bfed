//! # Gamewarden Protocol Codecs
//!
//! Wire-level pieces of the game-server adapters: the Frostbite 2 RCON
//! packet codec and reply classification, the player info block format, the
//! ordered regex tables used for embedded text sub-protocols (PunkBuster)
//! and chat text helpers.

pub mod frostbite;
pub mod pattern;
pub mod player_info;
pub mod punkbuster;
pub mod reply;
pub mod text;

pub use frostbite::{FrostbiteParseError, Origin, Packet};
pub use pattern::{PatternTable, Route};
pub use player_info::{BlockError, PlayerInfoBlock};
pub use punkbuster::PbMessage;
pub use reply::{classify_reply, CommandError};
