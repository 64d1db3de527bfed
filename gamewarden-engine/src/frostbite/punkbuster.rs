//! `punkBuster.onMessage` handling.
//!
//! PunkBuster output arrives as raw text lines. The ordered pattern table
//! decides what a line is: known lines without a handler publish nothing,
//! lines matching no pattern publish `punkbuster_unknown` with the raw text.

use gamewarden_core::events::{Event, Payload};
use gamewarden_protocols::{PbMessage, Route};
use regex::Captures;
use tracing::{debug, error, trace, warn};

use super::router::Router;
use crate::error::EngineError;

fn group<'c>(caps: &'c Captures<'_>, name: &str) -> &'c str {
    caps.name(name).map_or("", |m| m.as_str())
}

fn fields(caps: &Captures<'_>, names: &[&str]) -> Payload {
    Payload::fields(names.iter().map(|name| (*name, group(caps, name))))
}

impl Router {
    pub(crate) fn on_punkbuster_message(
        &self,
        data: &[String],
    ) -> Result<Option<Event>, EngineError> {
        let Some(line) = data.first().map(|l| l.trim()).filter(|l| !l.is_empty()) else {
            return Ok(None);
        };

        match self.punkbuster.route(line) {
            Route::Handled(message, caps) => Ok(self.on_pb(*message, &caps, line)),
            Route::Ignored(idx) => {
                trace!(pattern = idx, line, "Ignoring PunkBuster line");
                Ok(None)
            }
            Route::Unmatched => {
                debug!(line, "No pattern for PunkBuster line");
                Ok(Some(Event::new(self.kinds.pb_unknown, line)))
            }
        }
    }

    fn on_pb(&self, message: PbMessage, caps: &Captures<'_>, line: &str) -> Option<Event> {
        match message {
            PbMessage::Version => {
                debug!(version = group(caps, "version"), "PunkBuster server version");
                None
            }
            PbMessage::MasterQuerySent => None,
            PbMessage::PlayerGuid | PbMessage::PlistItem => self.on_pb_player_guid(caps),
            PbMessage::NewConnection => self.on_pb_new_connection(caps, line),
            PbMessage::LostConnection => Some(Event::new(
                self.kinds.pb_lost_player,
                fields(caps, &["slot", "ip", "port", "pbuid", "name"]),
            )),
            PbMessage::ScheduledTask => Some(Event::new(
                self.kinds.pb_scheduled_task,
                fields(caps, &["slot", "task"]),
            )),
            PbMessage::Ucon => Some(Event::new(
                self.kinds.pb_ucon,
                fields(caps, &["from", "ip", "port", "cmd"]),
            )),
            PbMessage::ScreenshotReceived => Some(Event::new(
                self.kinds.pb_screenshot_received,
                fields(
                    caps,
                    &["imgpath", "md5", "slot", "name", "pbid", "ip", "port"],
                ),
            )),
        }
    }

    /// Attaches the PunkBuster id and address. When the server never sent a
    /// guid for this player, one is recovered from persisted players that
    /// shared the PunkBuster id, provided exactly one matches.
    fn on_pb_player_guid(&self, caps: &Captures<'_>) -> Option<Event> {
        let name = group(caps, "name");
        let Some(player) = self.players.by_name(name) else {
            debug!(player = name, "PunkBuster reported an unknown player");
            return None;
        };
        let pbid = group(caps, "pbid").to_string();
        let ip = group(caps, "ip").to_string();
        player.update(|state| {
            state.ip = Some(ip);
            state.pbid = Some(pbid.clone());
        });

        if player.guid().is_some() {
            return None;
        }
        let matches = self.store.find_by_anticheat_id(&pbid);
        match matches.as_slice() {
            [stored] => {
                debug!(player = name, guid = %stored.guid, "Guid recovered from PunkBuster id");
                player.update(|state| {
                    state.guid = Some(stored.guid.clone());
                    state.authed = true;
                });
                Some(Event::new(self.kinds.auth, Payload::Empty).with_source(player))
            }
            [] => {
                error!(player = name, "Server sent no guid and no stored player shares the PunkBuster id");
                None
            }
            _ => {
                warn!(
                    player = name,
                    candidates = matches.len(),
                    "Several stored players share the PunkBuster id"
                );
                None
            }
        }
    }

    fn on_pb_new_connection(&self, caps: &Captures<'_>, line: &str) -> Option<Event> {
        let name = group(caps, "name");
        let Some(player) = self.players.by_name(name) else {
            warn!(player = name, "New PunkBuster connection for an unknown player");
            return None;
        };
        let ip = group(caps, "ip").to_string();
        let port = group(caps, "port").parse().ok();
        player.update(|state| {
            state.ip = Some(ip);
            state.port = port;
        });
        Some(Event::new(self.kinds.pb_new_connection, line).with_source(player))
    }
}
