//! Frostbite 2 (Battlefield 3 era) adapter.
//!
//! Threads: the link's `rcon-reader` feeds the inbound queue, the `adapter`
//! main loop routes packets and publishes events, `say-queue` and the
//! per-player `pm-*` workers deliver chat.

pub mod kinds;
mod punkbuster;
pub mod router;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gamewarden_config::{BigMessageRepeat, MessagesConfig, WardenConfig};
use gamewarden_core::events::{Event, Payload};
use gamewarden_core::EventBus;
use gamewarden_protocols::{text, CommandError};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::adapter::ProtocolAdapter;
use crate::command::{frostbite as cmd, Command, CommandSender};
use crate::connection::{
    ConnectionSupervisor, FrostbiteConnector, Link, LinkOptions, RetryPolicy,
};
use crate::enforcement::{Enforcer, RecentKicks, Sanction};
use crate::error::EngineError;
use crate::inbound::InboundQueue;
use crate::outbound::{OutboundOptions, OutboundQueue};
use crate::players::{
    DeliveryFactory, DirectDelivery, MessageDelivery, Player, PlayerStore,
    QueuedDelivery, Roster,
};

pub use kinds::FrostbiteKinds;
pub use router::{GameState, Router};

const INBOUND_PUT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct FrostbiteAdapter {
    supervisor: Arc<ConnectionSupervisor<FrostbiteConnector>>,
    inbound: InboundQueue,
    router: Router,
    roster: Arc<Roster>,
    say_queue: Arc<OutboundQueue>,
    enforcer: Enforcer,
    bus: EventBus,
    kinds: FrostbiteKinds,
    messages: MessagesConfig,
    main_poll: Duration,
    heartbeat_interval: Duration,
    roster_sync: Duration,
    last_sync: Mutex<Instant>,
    working: Arc<AtomicBool>,
}

impl FrostbiteAdapter {
    /// Registers the Frostbite kinds, so this must run before the registry
    /// is sealed.
    pub fn new(
        config: &WardenConfig,
        bus: EventBus,
        store: Arc<dyn PlayerStore>,
    ) -> Result<Self, EngineError> {
        let kinds = FrostbiteKinds::register(bus.registry())?;
        let connection = &config.connection;
        let messages = config.messages.clone();
        if messages.message_delay_clamped() {
            warn!(
                configured_ms = messages.message_delay_ms,
                used = ?messages.message_delay(),
                "Message delay out of range, clamped"
            );
        }

        let inbound = InboundQueue::new(
            connection.inbound_capacity,
            connection.inbound_ttl(),
            INBOUND_PUT_TIMEOUT,
        );
        let connector = FrostbiteConnector::new(
            config.server.address(),
            config.server.password.clone(),
            LinkOptions {
                connect_timeout: connection.connect_timeout(),
                command_timeout: connection.command_timeout(),
                command_retries: connection.command_retries,
            },
            inbound.clone(),
        );
        let working = Arc::new(AtomicBool::new(true));
        let supervisor = Arc::new(ConnectionSupervisor::new(
            connector,
            RetryPolicy::from_config(connection),
            working.clone(),
            bus.metrics().clone(),
        ));
        let sender: Arc<dyn CommandSender> = supervisor.clone();

        let say_queue = {
            let sender = sender.clone();
            let sink = move |line: &str| -> Result<(), EngineError> {
                sender.send_command(&cmd::say_all(line))?;
                Ok(())
            };
            Arc::new(OutboundQueue::start(
                Arc::new(sink),
                OutboundOptions {
                    name: "say-queue".into(),
                    capacity: messages.say_queue_capacity,
                    poll_timeout: messages.say_queue_poll(),
                    min_delay: messages.message_delay(),
                    line_length: messages.line_length,
                    prefix: messages.prefix.clone(),
                },
            )?)
        };

        let roster = Arc::new(Roster::new(private_delivery(sender.clone(), &messages)));
        let recent_kicks = RecentKicks::default();
        let router = Router::new(
            kinds,
            roster.clone(),
            store,
            bus.clone(),
            recent_kicks.clone(),
            &kinds.pass_through(),
        )?;
        let enforcer = Enforcer::new(
            sender,
            say_queue.clone(),
            bus.clone(),
            kinds,
            config.enforcement.clone(),
            recent_kicks,
        );

        Ok(Self {
            supervisor,
            inbound,
            router,
            roster,
            say_queue,
            enforcer,
            bus,
            kinds,
            messages,
            main_poll: connection.main_poll(),
            heartbeat_interval: connection.heartbeat_interval(),
            roster_sync: connection.roster_sync(),
            last_sync: Mutex::new(Instant::now()),
            working,
        })
    }

    pub fn roster(&self) -> &Arc<Roster> {
        &self.roster
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn enforcer(&self) -> &Enforcer {
        &self.enforcer
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor<FrostbiteConnector> {
        &self.supervisor
    }

    fn is_working(&self) -> bool {
        self.working.load(Ordering::Acquire) && self.bus.is_working()
    }

    /// Runs after every successful (re)connect.
    fn on_connected(&self) -> Result<(), EngineError> {
        self.router.publish(Event::new(
            self.kinds.gameserver_connect,
            Payload::Empty,
        ));

        let version = self.send_command(&cmd::version())?;
        info!(version = ?version, "Connected to game server");

        match self.send_command(&cmd::server_info()) {
            Ok(info) => self.router.apply_server_info(&info),
            Err(err) if err.is_network() => return Err(err),
            Err(err) => warn!(error = %err, "Server info request failed"),
        }

        self.router.sync_roster(self.supervisor.as_ref())?;
        *self.last_sync.lock() = Instant::now();

        let punkbuster_active = match self.send_command(&cmd::punkbuster_is_active()) {
            Ok(words) => words.first().is_some_and(|w| w == "true"),
            Err(err) if err.is_network() => return Err(err),
            Err(err) => {
                warn!(error = %err, "Could not tell whether PunkBuster is running");
                false
            }
        };
        if !punkbuster_active {
            if self.enforcer.ban_agent().uses_punkbuster() {
                self.enforcer.force_server_agent();
            }
        } else if let Err(err) = self.send_command(&cmd::punkbuster("pb_sv_plist")) {
            // Player list lines arrive later as punkBuster.onMessage events.
            warn!(error = %err, "PunkBuster player list request failed");
        }
        Ok(())
    }

    /// Liveness heartbeat and periodic roster sync.
    fn maintain(&self) -> Result<(), EngineError> {
        let Some(link) = self.supervisor.current() else {
            return Ok(());
        };
        if link.idle_for() >= self.heartbeat_interval {
            trace!("Sending heartbeat");
            match self.send_command(&cmd::version()) {
                Ok(_) => {}
                Err(EngineError::Command(CommandError::Timeout(_))) => {
                    warn!("Heartbeat unanswered");
                    self.supervisor.mark_lost(&link);
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }

        let due = self.last_sync.lock().elapsed() >= self.roster_sync;
        if due {
            *self.last_sync.lock() = Instant::now();
            self.router.sync_roster(self.supervisor.as_ref())?;
        }
        Ok(())
    }

    /// Network errors drop the link for the next loop to reconnect. Command
    /// errors only concern the packet being handled.
    fn absorb(&self, err: EngineError) -> Result<(), EngineError> {
        if err.is_fatal() {
            return Err(err);
        }
        if err.is_network() {
            warn!(error = %err, "Game server connection problem");
            self.supervisor.check();
        } else {
            warn!(error = %err, "Server event handling failed");
        }
        Ok(())
    }

    fn teardown(&self) {
        self.say_queue.shutdown();
        self.roster.clear();
        self.supervisor.close();
    }
}

/// Private messages go through a per-player rate-limited queue.
fn private_delivery(sender: Arc<dyn CommandSender>, messages: &MessagesConfig) -> DeliveryFactory {
    let options = OutboundOptions {
        name: "pm".into(),
        capacity: messages.say_queue_capacity,
        poll_timeout: messages.say_queue_poll(),
        min_delay: messages.message_delay(),
        line_length: messages.line_length,
        prefix: messages.private_prefix.clone(),
    };
    Box::new(move |player: &str| -> Arc<dyn MessageDelivery> {
        match QueuedDelivery::start(player, sender.clone(), options.clone()) {
            Ok(delivery) => Arc::new(delivery),
            Err(err) => {
                warn!(player, error = %err, "No message queue for player, sending directly");
                Arc::new(DirectDelivery::new(sender.clone()))
            }
        }
    })
}

impl ProtocolAdapter for FrostbiteAdapter {
    fn connect(&self) -> Result<(), EngineError> {
        // The new link's reader starts pushing as soon as events are enabled.
        let dropped = self.inbound.clear();
        if dropped > 0 {
            debug!(dropped, "Discarded events from the previous connection");
        }
        self.supervisor.establish()?;
        if let Err(err) = self.on_connected() {
            if err.is_network() {
                self.supervisor.check();
            }
            return Err(err);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.supervisor.is_ready()
    }

    fn send_command(&self, command: &Command) -> Result<Vec<String>, EngineError> {
        self.supervisor.send_command(command)
    }

    fn route_packet(&self, words: &[String]) -> Result<Option<Event>, EngineError> {
        self.router.route(words)
    }

    fn say(&self, text: &str) {
        self.say_queue.enqueue(text);
    }

    fn message(&self, player: &Player, text: &str) {
        if self.messages.big_private_responses {
            let line = text::strip_colors(text);
            let yell = cmd::yell_player(&line, self.messages.big_msg_duration_secs, player.name());
            if let Err(err) = self.send_command(&yell) {
                warn!(player = %player.name(), error = %err, "Private yell failed");
            }
            if self.messages.big_msg_repeat == BigMessageRepeat::Off {
                return;
            }
        }
        player.message(text);
    }

    fn yell(&self, message: &str) {
        let prefixed = text::prefix_text(&[self.messages.prefix.as_str()], message);
        for line in text::wrap(&text::strip_colors(&prefixed), self.messages.line_length) {
            let yell = cmd::yell_all(&line, self.messages.big_msg_duration_secs);
            if let Err(err) = self.send_command(&yell) {
                warn!(error = %err, "Yell failed");
            }
        }
        if self.messages.big_msg_repeat == BigMessageRepeat::All {
            self.say(message);
        }
    }

    fn kick(&self, player: &Arc<Player>, sanction: Sanction<'_>) -> Result<(), EngineError> {
        self.enforcer.kick(player, sanction)
    }

    fn ban(&self, player: &Arc<Player>, sanction: Sanction<'_>) -> Result<(), EngineError> {
        self.enforcer.ban(player, sanction)
    }

    fn temp_ban(
        &self,
        player: &Arc<Player>,
        duration: Duration,
        sanction: Sanction<'_>,
    ) -> Result<(), EngineError> {
        self.enforcer.temp_ban(player, duration, sanction)
    }

    fn unban(&self, player: &Arc<Player>, sanction: Sanction<'_>) -> Result<(), EngineError> {
        self.enforcer.unban(player, sanction)
    }

    fn get_var(&self, name: &str) -> Result<String, EngineError> {
        let words = self.send_command(&cmd::get_var(name))?;
        Ok(words.into_iter().next().unwrap_or_default())
    }

    fn set_var(&self, name: &str, value: &str) -> Result<(), EngineError> {
        self.send_command(&cmd::set_var(name, value)).map(|_| ())
    }

    fn run(&self) -> Result<(), EngineError> {
        info!("Listening for game server events");
        let result = loop {
            if !self.is_working() {
                break Ok(());
            }

            if !self.supervisor.is_ready() {
                match self.connect() {
                    Ok(()) => {}
                    Err(EngineError::ShuttingDown) => break Ok(()),
                    Err(err) if err.is_fatal() => break Err(err),
                    Err(err) => {
                        warn!(error = %err, "Connection setup failed");
                        continue;
                    }
                }
            }

            match self.inbound.pop(self.main_poll) {
                Some(packet) => {
                    if let Err(err) = self.router.handle(&packet.words) {
                        if let Err(fatal) = self.absorb(err) {
                            break Err(fatal);
                        }
                    }
                }
                None => trace!("No game server event in the last poll"),
            }

            if let Err(err) = self.maintain() {
                if let Err(fatal) = self.absorb(err) {
                    break Err(fatal);
                }
            }
        };

        if let Err(err) = &result {
            error!(error = %err, "Adapter stopped");
        }
        info!("Stopped listening for game server events");
        self.teardown();
        result
    }

    fn shutdown(&self) {
        info!("Adapter shutdown requested");
        self.working.store(false, Ordering::Release);
    }
}
