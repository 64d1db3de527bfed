use std::time::Duration;

use gamewarden_core::EventError;
use gamewarden_protocols::{CommandError, FrostbiteParseError};
use thiserror::Error;

/// Exit status for unrecoverable connection problems.
pub const EXIT_FATAL: i32 = 220;

/// Transport-level failure. The link is unusable afterwards.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed packet from server: {0}")]
    Protocol(#[from] FrostbiteParseError),

    #[error("Connection closed")]
    Closed,

    #[error("Not connected")]
    NotConnected,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("Server rejected the RCON password ({0})")]
    AuthenticationRejected(String),

    #[error("Gave up connecting after {attempts} attempts in {waited:?}")]
    RetryBudgetExhausted { attempts: u32, waited: Duration },

    #[error("Invalid sub-protocol pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to spawn thread: {0}")]
    Spawn(std::io::Error),

    #[error("Shutting down")]
    ShuttingDown,
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Network(NetworkError::Io(err))
    }
}

impl EngineError {
    /// Conditions that end the adapter instead of triggering a reconnect.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::AuthenticationRejected(_)
                | EngineError::RetryBudgetExhausted { .. }
                | EngineError::Pattern(_)
                | EngineError::Spawn(_)
        )
    }

    pub fn is_network(&self) -> bool {
        matches!(self, EngineError::Network(_))
    }

    pub fn command_error(&self) -> Option<&CommandError> {
        match self {
            EngineError::Command(err) => Some(err),
            _ => None,
        }
    }

    /// Process exit status the CLI reports for this error.
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() {
            EXIT_FATAL
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors_map_to_exit_status() {
        let err = EngineError::RetryBudgetExhausted {
            attempts: 3,
            waited: Duration::from_secs(6),
        };
        assert!(err.is_fatal());
        assert_eq!(err.exit_code(), EXIT_FATAL);
        assert_eq!(
            EngineError::AuthenticationRejected("InvalidPassword".into()).exit_code(),
            EXIT_FATAL
        );

        let err = EngineError::from(NetworkError::Closed);
        assert!(!err.is_fatal());
        assert!(err.is_network());
        assert_eq!(err.exit_code(), 1);
    }
}
