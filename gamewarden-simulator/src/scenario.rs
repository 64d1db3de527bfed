//! Scripted server sessions.
//!
//! ```yaml
//! password: secret
//! players:
//!   - { name: Joe, guid: EA_1, team: 1, squad: 2 }
//! steps:
//!   - { after_ms: 500, event: ["player.onChat", "Joe", "!help", "all"] }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use figment::{
    providers::{Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::server::FakeServer;

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Scenario file not found: {0}")]
    NotFound(PathBuf),
    #[error("Invalid scenario: {0}")]
    Invalid(#[from] Box<figment::Error>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioPlayer {
    pub name: String,
    #[serde(default)]
    pub guid: String,
    #[serde(default)]
    pub team: u8,
    #[serde(default)]
    pub squad: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioStep {
    /// Pause before the event is pushed.
    #[serde(default)]
    pub after_ms: u64,
    pub event: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub players: Vec<ScenarioPlayer>,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::NotFound(path.to_path_buf()));
        }
        Self::extract(Figment::from(Yaml::file(path)))
    }

    pub fn from_yaml(source: &str) -> Result<Self, ScenarioError> {
        Self::extract(Figment::from(Yaml::string(source)))
    }

    fn extract(figment: Figment) -> Result<Self, ScenarioError> {
        figment.extract().map_err(|err| ScenarioError::Invalid(Box::new(err)))
    }

    /// Publishes the player list on `server`.
    pub fn install(&self, server: &FakeServer) {
        let rows: Vec<_> = self
            .players
            .iter()
            .map(|p| (p.name.as_str(), p.guid.as_str(), p.team, p.squad))
            .collect();
        server.set_players(&rows);
        server.set_password(&self.password);
    }

    /// Pushes every step in order. Stops early once `running` is cleared.
    /// Returns the number of steps played.
    pub fn play(&self, server: &FakeServer, running: &AtomicBool) -> usize {
        info!(steps = self.steps.len(), "Playing scenario");
        for (idx, step) in self.steps.iter().enumerate() {
            if !sleep_while(running, Duration::from_millis(step.after_ms)) {
                return idx;
            }
            let words: Vec<&str> = step.event.iter().map(String::as_str).collect();
            let clients = server.push_event(&words);
            debug!(step = idx, clients, event = ?step.event, "Scenario step pushed");
        }
        self.steps.len()
    }
}

fn sleep_while(running: &AtomicBool, duration: Duration) -> bool {
    let slice = Duration::from_millis(50);
    let mut left = duration;
    while !left.is_zero() {
        if !running.load(Ordering::Acquire) {
            return false;
        }
        let nap = left.min(slice);
        thread::sleep(nap);
        left -= nap;
    }
    running.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
password: secret
players:
  - { name: Joe, guid: EA_1, team: 1, squad: 2 }
  - { name: Ann }
steps:
  - { after_ms: 0, event: ["player.onJoin", "Bob", "EA_3"] }
  - event: ["player.onChat", "Joe", "!help", "all"]
"#;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_yaml(SAMPLE).unwrap();
        assert_eq!(scenario.password, "secret");
        assert_eq!(scenario.players.len(), 2);
        assert_eq!(scenario.players[1].guid, "");
        assert_eq!(scenario.steps[1].after_ms, 0);
        assert_eq!(scenario.steps[1].event[2], "!help");
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Scenario::load("/nonexistent/scenario.yaml"),
            Err(ScenarioError::NotFound(_))
        ));
    }

    #[test]
    fn test_play_stops_when_cleared() {
        let server = FakeServer::start("").unwrap();
        let scenario = Scenario::from_yaml(SAMPLE).unwrap();
        let running = AtomicBool::new(false);
        assert_eq!(scenario.play(&server, &running), 0);

        running.store(true, Ordering::Release);
        assert_eq!(scenario.play(&server, &running), 2);
    }
}
