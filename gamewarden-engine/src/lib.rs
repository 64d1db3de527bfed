//! # gamewarden-engine
//!
//! Game server side of the agent: the protocol adapter seam, connection
//! supervision, inbound and outbound queues, player sessions, enforcement
//! and the Frostbite 2 reference adapter.
//!
//! ### Key Submodules:
//! - `connection`: RCON link with its reader thread, reconnecting supervisor
//! - `frostbite`: packet routing, PunkBuster handling, the adapter main loop
//! - `outbound`: rate-limited chat delivery
//! - `enforcement`: kick, ban, temp-ban, unban

pub mod adapter;
pub mod command;
pub mod connection;
pub mod enforcement;
pub mod error;
pub mod frostbite;
pub mod inbound;
pub mod outbound;
pub mod players;

pub mod prelude {
    pub use crate::adapter::ProtocolAdapter;
    pub use crate::command::{Command, CommandSender};
    pub use crate::enforcement::Sanction;
    pub use crate::error::{EngineError, NetworkError, EXIT_FATAL};
    pub use crate::frostbite::FrostbiteAdapter;
    pub use crate::players::{Player, PlayerRegistry, PlayerStore, Team};
}

pub use adapter::ProtocolAdapter;
pub use error::{EngineError, NetworkError};
pub use frostbite::FrostbiteAdapter;
