//! Kick, ban, temp-ban and unban.
//!
//! Each operation resolves how to address the player, renders the
//! announcement from the configured template, sends the server and/or
//! PunkBuster commands, announces through the say-queue and publishes the
//! matching canonical event once the server accepted the action.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gamewarden_config::{BanAgent, EnforcementConfig};
use gamewarden_core::events::{Event, Payload};
use gamewarden_core::EventBus;
use gamewarden_protocols::text;
use gamewarden_telemetry::EventLogger;
use opentelemetry::KeyValue;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::command::{frostbite as cmd, Command, CommandSender};
use crate::error::EngineError;
use crate::frostbite::kinds::FrostbiteKinds;
use crate::outbound::OutboundQueue;
use crate::players::Player;

const KICK_ECHO_WINDOW: Duration = Duration::from_secs(60);
/// PunkBuster kick length used for plain kicks.
const PB_KICK_MINUTES: u32 = 1;

/// Kicks issued by this agent, so the server's `player.onKicked` echo is not
/// reported a second time.
#[derive(Clone, Default)]
pub struct RecentKicks {
    inner: Arc<Mutex<HashMap<String, Instant>>>,
}

impl RecentKicks {
    pub fn record(&self, name: &str) {
        let mut kicks = self.inner.lock();
        kicks.retain(|_, at| at.elapsed() < KICK_ECHO_WINDOW);
        kicks.insert(name.to_string(), Instant::now());
    }

    /// Returns `true` once for a kick recorded within the echo window.
    pub fn take(&self, name: &str) -> bool {
        self.inner
            .lock()
            .remove(name)
            .is_some_and(|at| at.elapsed() < KICK_ECHO_WINDOW)
    }
}

/// Where public announcements go.
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, text: &str);
}

impl Broadcaster for OutboundQueue {
    fn broadcast(&self, text: &str) {
        self.enqueue(text);
    }
}

/// Who acted, why, and whether to announce it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sanction<'a> {
    pub reason: &'a str,
    pub admin: Option<&'a Player>,
    pub silent: bool,
}

impl<'a> Sanction<'a> {
    pub fn new(reason: &'a str) -> Self {
        Self {
            reason,
            ..Default::default()
        }
    }

    pub fn by(mut self, admin: &'a Player) -> Self {
        self.admin = Some(admin);
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

/// Replaces `$clientname`, `$adminname`, `$reason` and `$banduration`.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter()
        .fold(template.to_string(), |out, (name, value)| {
            out.replace(&format!("${name}"), value)
        })
        .trim()
        .to_string()
}

/// Human readable ban length.
pub fn minutes_str(minutes: u64) -> String {
    fn unit(n: u64, name: &str) -> String {
        if n == 1 {
            format!("1 {name}")
        } else {
            format!("{n} {name}s")
        }
    }
    match minutes {
        m if m < 60 => unit(m, "minute"),
        m if m < 1440 && m % 60 == 0 => unit(m / 60, "hour"),
        m if m < 1440 => format!("{:.1} hours", m as f64 / 60.0),
        m if m % 1440 == 0 => unit(m / 1440, "day"),
        m => format!("{:.1} days", m as f64 / 1440.0),
    }
}

/// Server ban list key for a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BanTarget {
    Guid(String),
    Name(String),
}

impl BanTarget {
    /// The guid when known, the name otherwise.
    pub fn for_player(player: &Player) -> Self {
        match player.guid() {
            Some(guid) => BanTarget::Guid(guid),
            None => BanTarget::Name(player.name().to_string()),
        }
    }
}

pub struct Enforcer {
    sender: Arc<dyn CommandSender>,
    announcer: Arc<dyn Broadcaster>,
    bus: EventBus,
    kinds: FrostbiteKinds,
    config: EnforcementConfig,
    ban_agent: RwLock<BanAgent>,
    recent_kicks: RecentKicks,
}

impl Enforcer {
    pub fn new(
        sender: Arc<dyn CommandSender>,
        announcer: Arc<dyn Broadcaster>,
        bus: EventBus,
        kinds: FrostbiteKinds,
        config: EnforcementConfig,
        recent_kicks: RecentKicks,
    ) -> Self {
        let ban_agent = RwLock::new(config.ban_agent);
        Self {
            sender,
            announcer,
            bus,
            kinds,
            config,
            ban_agent,
            recent_kicks,
        }
    }

    pub fn ban_agent(&self) -> BanAgent {
        *self.ban_agent.read()
    }

    /// Falls back to server bans, e.g. when PunkBuster is not running.
    pub fn force_server_agent(&self) {
        let mut agent = self.ban_agent.write();
        if *agent != BanAgent::Server {
            warn!(configured = ?*agent, "PunkBuster unavailable, banning with the server only");
            *agent = BanAgent::Server;
        }
    }

    fn reason(&self, sanction: &Sanction<'_>) -> String {
        text::truncate(&text::strip_colors(sanction.reason), self.config.reason_max_len).to_string()
    }

    fn announcement(
        &self,
        plain: &str,
        by_admin: &str,
        player: &Player,
        sanction: &Sanction<'_>,
        duration: Option<&str>,
    ) -> String {
        let admin_name = sanction.admin.map(Player::name).unwrap_or_default();
        let template = if sanction.admin.is_some() { by_admin } else { plain };
        let mut vars = vec![
            ("clientname", player.name()),
            ("adminname", admin_name),
            ("reason", sanction.reason),
        ];
        if let Some(duration) = duration {
            vars.push(("banduration", duration));
        }
        text::strip_colors(&render(template, &vars))
    }

    fn announce(&self, sanction: &Sanction<'_>, announcement: &str) {
        if !sanction.silent && !announcement.is_empty() {
            self.announcer.broadcast(announcement);
        }
    }

    fn send(&self, command: &Command) -> Result<Vec<String>, EngineError> {
        debug!(command = %command, "Enforcement command");
        self.sender.send_command(command)
    }

    /// Server command whose failure is reported back to the acting admin.
    fn send_relayed(&self, command: &Command, sanction: &Sanction<'_>) -> Result<(), EngineError> {
        match self.send(command) {
            Ok(_) => Ok(()),
            Err(err) => {
                if let Some(admin) = sanction.admin {
                    let status = err
                        .command_error()
                        .and_then(|e| e.status())
                        .map_or_else(|| err.to_string(), str::to_string);
                    admin.message(&format!("Server replied with error {status}"));
                }
                warn!(command = %command.name(), error = %err, "Enforcement command failed");
                Err(err)
            }
        }
    }

    /// PunkBuster commands are best effort.
    fn send_punkbuster(&self, command: String) {
        if let Err(err) = self.send(&cmd::punkbuster(&command)) {
            warn!(command = %command, error = %err, "PunkBuster command failed");
        }
    }

    fn publish(&self, event: Event) {
        if let Err(err) = self.bus.publish(event) {
            warn!(error = %err, "Enforcement event not published");
        }
    }

    fn audit(&self, action: &str, player: &Player, sanction: &Sanction<'_>, extra: Vec<KeyValue>) {
        let mut metadata = vec![
            KeyValue::new("player", player.name().to_string()),
            KeyValue::new("guid", player.guid().unwrap_or_default()),
            KeyValue::new("reason", sanction.reason.to_string()),
            KeyValue::new(
                "admin",
                sanction.admin.map(Player::name).unwrap_or_default().to_string(),
            ),
        ];
        metadata.extend(extra);
        EventLogger::log_event(action, metadata);
    }

    fn event_payload(&self, reason: &str, sanction: &Sanction<'_>, duration: Option<u64>) -> Payload {
        let mut fields = vec![
            ("reason", reason.to_string()),
            (
                "admin",
                sanction.admin.map(Player::name).unwrap_or_default().to_string(),
            ),
        ];
        if let Some(minutes) = duration {
            fields.push(("duration", minutes.to_string()));
        }
        Payload::fields(fields)
    }

    pub fn kick(&self, player: &Arc<Player>, sanction: Sanction<'_>) -> Result<(), EngineError> {
        let reason = self.reason(&sanction);
        let templates = &self.config.templates;
        let announcement =
            self.announcement(&templates.kicked, &templates.kicked_by, player, &sanction, None);

        if self.ban_agent().uses_punkbuster() {
            self.send_punkbuster(format!(
                "pb_sv_kick \"{}\" {PB_KICK_MINUTES} {reason}",
                player.name()
            ));
        }
        self.recent_kicks.record(player.name());
        if let Err(err) = self.send_relayed(&cmd::kick(player.name(), &reason), &sanction) {
            self.recent_kicks.take(player.name());
            return Err(err);
        }

        self.announce(&sanction, &announcement);
        self.audit("client_kick", player, &sanction, Vec::new());
        self.publish(
            Event::new(self.kinds.kick, self.event_payload(&reason, &sanction, None))
                .with_source(player.clone()),
        );
        info!(player = %player.name(), "Player kicked");
        Ok(())
    }

    pub fn ban(&self, player: &Arc<Player>, sanction: Sanction<'_>) -> Result<(), EngineError> {
        let reason = self.reason(&sanction);
        let templates = &self.config.templates;
        let announcement =
            self.announcement(&templates.banned, &templates.banned_by, player, &sanction, None);
        let agent = self.ban_agent();

        if agent.uses_server() {
            let command = match BanTarget::for_player(player) {
                BanTarget::Guid(guid) => cmd::ban_guid(&guid, &reason),
                BanTarget::Name(name) => cmd::ban_name(&name, &reason),
            };
            self.send_relayed(&command, &sanction)?;
            self.send_relayed(&cmd::save_ban_list(), &sanction)?;
            if let Some(admin) = sanction.admin {
                admin.message(&format!("Banned: {} has been added to banlist", player.name()));
            }
        }

        if agent.uses_punkbuster() {
            let state = player.state();
            match state.pbid {
                Some(pbid) => self.send_punkbuster(format!(
                    "pb_sv_banguid {pbid} \"{}\" \"{}\" \"{reason}\"",
                    player.name(),
                    state.ip.unwrap_or_default()
                )),
                None => warn!(player = %player.name(), "No PunkBuster id, skipping PunkBuster ban"),
            }
            // PunkBuster may fail silently and the server ban may be off.
            if state.connected {
                self.recent_kicks.record(player.name());
                if let Err(err) = self.send(&cmd::kick(player.name(), &reason)) {
                    warn!(error = %err, "Kick after PunkBuster ban failed");
                }
            }
        }

        self.announce(&sanction, &announcement);
        self.audit("client_ban", player, &sanction, Vec::new());
        self.publish(
            Event::new(self.kinds.ban, self.event_payload(&reason, &sanction, None))
                .with_source(player.clone()),
        );
        info!(player = %player.name(), "Player banned");
        Ok(())
    }

    pub fn temp_ban(
        &self,
        player: &Arc<Player>,
        duration: Duration,
        sanction: Sanction<'_>,
    ) -> Result<(), EngineError> {
        let minutes = (duration.as_secs() / 60).max(1);
        let reason = self.reason(&sanction);
        let templates = &self.config.templates;
        let duration_text = minutes_str(minutes);
        let announcement = self.announcement(
            &templates.temp_banned,
            &templates.temp_banned_by,
            player,
            &sanction,
            Some(&duration_text),
        );
        let agent = self.ban_agent();

        if agent.uses_punkbuster() && player.is_connected() {
            let pb_minutes = minutes.min(u64::from(self.config.punkbuster_max_minutes));
            self.send_punkbuster(format!(
                "pb_sv_kick \"{}\" {pb_minutes} {reason}",
                player.name()
            ));
            self.recent_kicks.record(player.name());
            if let Err(err) = self.send(&cmd::kick(player.name(), &reason)) {
                warn!(error = %err, "Kick after PunkBuster temp ban failed");
            }
        }

        if agent.uses_server() {
            let seconds = minutes * 60;
            let command = match BanTarget::for_player(player) {
                BanTarget::Guid(guid) => cmd::temp_ban_guid(&guid, seconds, &reason),
                BanTarget::Name(name) => cmd::temp_ban_name(&name, seconds, &reason),
            };
            self.send_relayed(&command, &sanction)?;
            self.send_relayed(&cmd::save_ban_list(), &sanction)?;
        }

        self.announce(&sanction, &announcement);
        self.audit(
            "client_ban_temp",
            player,
            &sanction,
            vec![KeyValue::new("minutes", minutes as i64)],
        );
        self.publish(
            Event::new(
                self.kinds.temp_ban,
                self.event_payload(&reason, &sanction, Some(minutes)),
            )
            .with_source(player.clone()),
        );
        info!(player = %player.name(), minutes, "Player temp banned");
        Ok(())
    }

    /// Removes every server ban entry for the player. Entries that are not on
    /// the ban list are skipped silently.
    pub fn unban(&self, player: &Arc<Player>, sanction: Sanction<'_>) -> Result<(), EngineError> {
        let reason = self.reason(&sanction);
        let templates = &self.config.templates;
        let announcement =
            self.announcement(&templates.unbanned, &templates.unbanned_by, player, &sanction, None);
        let state = player.state();

        let mut removals = Vec::new();
        if let Some(ip) = &state.ip {
            removals.push((cmd::unban_ip(ip), format!("last ip ({ip})")));
        }
        match &state.guid {
            Some(guid) => removals.push((cmd::unban_guid(guid), "guid".to_string())),
            None => removals.push((cmd::unban_name(player.name()), "name".to_string())),
        }

        for (command, what) in removals {
            match self.send(&command) {
                Ok(_) => {
                    self.send_relayed(&cmd::save_ban_list(), &sanction)?;
                    if let Some(admin) = sanction.admin {
                        admin.message(&format!(
                            "Unbanned: {} {what} removed from banlist",
                            player.name()
                        ));
                    }
                }
                Err(EngineError::Command(err)) if err.is_not_in_list() => {
                    debug!(player = %player.name(), entry = %what, "Not in ban list");
                }
                Err(err) => {
                    if let Some(admin) = sanction.admin {
                        admin.message(&format!("Unban failed: {err}"));
                    }
                    return Err(err);
                }
            }
        }

        if self.ban_agent().uses_punkbuster() {
            if let Some(pbid) = &state.pbid {
                self.send_punkbuster(format!("pb_sv_unbanguid {pbid}"));
            }
        }

        self.announce(&sanction, &announcement);
        self.audit("client_unban", player, &sanction, Vec::new());
        self.publish(
            Event::new(self.kinds.unban, self.event_payload(&reason, &sanction, None))
                .with_source(player.clone()),
        );
        info!(player = %player.name(), "Player unbanned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_known_variables() {
        let out = render(
            "$clientname^7 was kicked by $adminname^7 $reason",
            &[("clientname", "Joe"), ("adminname", "Ann"), ("reason", "spam")],
        );
        assert_eq!(out, "Joe^7 was kicked by Ann^7 spam");
        assert_eq!(render("$clientname was kicked $reason", &[("clientname", "Joe"), ("reason", "")]), "Joe was kicked");
    }

    #[test]
    fn test_minutes_str() {
        assert_eq!(minutes_str(1), "1 minute");
        assert_eq!(minutes_str(45), "45 minutes");
        assert_eq!(minutes_str(120), "2 hours");
        assert_eq!(minutes_str(90), "1.5 hours");
        assert_eq!(minutes_str(1440), "1 day");
        assert_eq!(minutes_str(2160), "1.5 days");
    }

    #[test]
    fn test_recent_kicks_are_taken_once() {
        let kicks = RecentKicks::default();
        kicks.record("Joe");
        assert!(kicks.take("Joe"));
        assert!(!kicks.take("Joe"));
        assert!(!kicks.take("Ann"));
    }

    #[test]
    fn test_ban_target_prefers_guid() {
        let player = Player::offline("Joe", None);
        assert_eq!(BanTarget::for_player(&player), BanTarget::Name("Joe".into()));
        let player = Player::offline("Joe", Some("EA_1".into()));
        assert_eq!(BanTarget::for_player(&player), BanTarget::Guid("EA_1".into()));
    }
}
