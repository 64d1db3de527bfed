//! # gamewarden-core
//!
//! Game-agnostic half of the agent: the event taxonomy every adapter shares
//! and the single-consumer dispatch loop that feeds events to policy
//! handlers.
//!
//! ### Key Submodules:
//! - `events`: kind registry, immutable `Event` values and the `Actor` seam
//! - `dispatch`: `EventBus` producer handle, `DispatchEngine` consumer, handler
//!   registrations and latency statistics

pub mod dispatch;
pub mod error;
pub mod events;

pub mod prelude {
    pub use crate::dispatch::*;
    pub use crate::error::*;
    pub use crate::events::*;
}

pub use dispatch::{DispatchEngine, DispatchOptions, EventBus};
pub use error::EventError;
