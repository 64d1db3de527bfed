//! Single-consumer delivery of events to policy handlers.

pub mod engine;
pub mod handler;
pub mod stats;

pub use engine::{DispatchEngine, DispatchOptions, EventBus};
pub use handler::{EventHandler, Flow, HandlerResult};
pub use stats::{EventStats, LatencySummary};
