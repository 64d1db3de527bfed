//! # Gamewarden Simulator
//!
//! An in-process Frostbite 2 RCON server for tests and local runs.
//!
//! ## Key Components:
//! - **FakeServer:** TCP listener speaking the binary RCON protocol, answering
//!   commands from a reply table and pushing scripted server events.
//! - **Scenario:** YAML description of a password, a player list and a timed
//!   sequence of server events.

pub mod scenario;
pub mod server;

pub use scenario::{Scenario, ScenarioError, ScenarioPlayer, ScenarioStep};
pub use server::{wait_until, FakeServer};
