//! Connection lifecycle: the RCON socket and the supervisor that keeps one
//! alive.

pub mod link;
pub mod supervisor;

use std::time::Duration;

use crate::command::Command;
use crate::error::EngineError;

pub use link::{LinkOptions, RconLink};
pub use supervisor::{
    ConnectionState, ConnectionSupervisor, Connector, FrostbiteConnector, RetryPolicy,
};

/// An established, authenticated transport.
pub trait Link: Send + Sync {
    /// Sends `command` and waits for its reply.
    fn command(&self, command: &Command) -> Result<Vec<String>, EngineError>;
    fn is_alive(&self) -> bool;
    /// Time since anything was last received.
    fn idle_for(&self) -> Duration;
    /// Releases the socket. Returns once the reader thread has exited.
    fn close(&self);
}
