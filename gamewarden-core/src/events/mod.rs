//! Canonical event taxonomy shared by every game adapter.

pub mod event;
pub mod kinds;
pub mod registry;

pub use event::{Actor, ActorRef, Event, Payload};
pub use registry::{EventKind, EventRegistry};
