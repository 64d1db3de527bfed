use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),

    #[error("Unknown event id: {0}")]
    UnknownEventId(u32),

    #[error("Event registry is sealed, cannot register '{0}'")]
    RegistrySealed(String),

    #[error("Event queue capacity exceeded")]
    QueueFull,

    #[error("Event bus is closed")]
    Closed,

    #[error("Invalid capacity (must be greater than zero)")]
    InvalidCapacity,
}
