//! Connect, authenticate, detect loss, reconnect.
//!
//! ```text
//! Disconnected -> Connecting -> Authenticating -> Ready
//!       ^                                           |
//!       +------------- I/O failure / close ---------+
//! ```
//!
//! Attempts are spaced by a fixed interval and bounded by a total wait
//! budget. Running out of budget, or the server rejecting the password, is
//! fatal.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use gamewarden_config::ConnectionConfig;
use gamewarden_telemetry::MetricsRecorder;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::link::{LinkOptions, RconLink};
use super::Link;
use crate::command::{frostbite, Command, CommandSender};
use crate::error::{EngineError, NetworkError};
use crate::inbound::InboundQueue;

const SLEEP_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Ready => "ready",
            ConnectionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retry_interval: Duration,
    pub total_budget: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            retry_interval: config.retry_interval(),
            total_budget: config.retry_budget(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(2),
            total_budget: Duration::from_secs(600),
        }
    }
}

/// Opens and prepares links for a particular server flavour.
pub trait Connector: Send + Sync {
    type Link: Link + 'static;

    fn connect(&self) -> Result<Self::Link, EngineError>;
    fn authenticate(&self, link: &Self::Link) -> Result<(), EngineError>;
    fn enable_events(&self, link: &Self::Link) -> Result<(), EngineError>;
}

pub struct ConnectionSupervisor<C: Connector> {
    connector: C,
    policy: RetryPolicy,
    state: RwLock<ConnectionState>,
    link: RwLock<Option<Arc<C::Link>>>,
    working: Arc<AtomicBool>,
    metrics: Arc<MetricsRecorder>,
    ever_connected: AtomicBool,
}

impl<C: Connector> ConnectionSupervisor<C> {
    pub fn new(
        connector: C,
        policy: RetryPolicy,
        working: Arc<AtomicBool>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            connector,
            policy,
            state: RwLock::new(ConnectionState::Disconnected),
            link: RwLock::new(None),
            working,
            metrics,
            ever_connected: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
            && self.link.read().as_ref().is_some_and(|link| link.is_alive())
    }

    pub fn current(&self) -> Option<Arc<C::Link>> {
        self.link.read().clone()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
    }

    /// Blocks until a link is ready, the budget runs out or a fatal error
    /// occurs.
    pub fn establish(&self) -> Result<Arc<C::Link>, EngineError> {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            if !self.working.load(Ordering::Acquire) {
                return Err(EngineError::ShuttingDown);
            }
            attempts += 1;

            match self.attempt() {
                Ok(link) => {
                    let link = Arc::new(link);
                    *self.link.write() = Some(link.clone());
                    self.set_state(ConnectionState::Ready);
                    if self.ever_connected.swap(true, Ordering::AcqRel) {
                        self.metrics.reconnects.inc();
                    }
                    info!(attempts, "Connection ready");
                    return Ok(link);
                }
                Err(err) if err.is_fatal() => {
                    self.set_state(ConnectionState::Disconnected);
                    error!(error = %err, "Giving up on the connection");
                    return Err(err);
                }
                Err(err) => {
                    self.set_state(ConnectionState::Disconnected);
                    warn!(attempt = attempts, error = %err, "Connection attempt failed");
                }
            }

            let waited = started.elapsed();
            if waited + self.policy.retry_interval > self.policy.total_budget {
                error!(attempts, ?waited, "Connection retry budget exhausted");
                return Err(EngineError::RetryBudgetExhausted { attempts, waited });
            }
            self.sleep(self.policy.retry_interval);
        }
    }

    fn attempt(&self) -> Result<C::Link, EngineError> {
        self.set_state(ConnectionState::Connecting);
        let link = self.connector.connect()?;

        self.set_state(ConnectionState::Authenticating);
        if let Err(first) = self.connector.authenticate(&link) {
            warn!(error = %first, "Authentication failed, retrying once");
            if let Err(err) = self.connector.authenticate(&link) {
                link.close();
                return Err(err);
            }
        }
        if let Err(err) = self.connector.enable_events(&link) {
            link.close();
            return Err(err);
        }
        Ok(link)
    }

    fn sleep(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while self.working.load(Ordering::Acquire) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }

    /// Drops `link` after a failure, unless it was already replaced.
    pub fn mark_lost(&self, link: &Arc<C::Link>) {
        let lost = {
            let mut current = self.link.write();
            match current.as_ref() {
                Some(active) if Arc::ptr_eq(active, link) => current.take(),
                _ => None,
            }
        };
        if let Some(lost) = lost {
            warn!("Connection to the game server lost");
            lost.close();
            self.set_state(ConnectionState::Disconnected);
        }
    }

    /// Returns `false` and tears the link down if it died on its own.
    pub fn check(&self) -> bool {
        match self.current() {
            Some(link) if link.is_alive() => true,
            Some(link) => {
                self.mark_lost(&link);
                false
            }
            None => false,
        }
    }

    /// Deliberate shutdown of the current link.
    pub fn close(&self) {
        self.set_state(ConnectionState::Closing);
        if let Some(link) = self.link.write().take() {
            link.close();
        }
        self.set_state(ConnectionState::Disconnected);
        info!("Connection closed");
    }
}

impl<C: Connector> CommandSender for ConnectionSupervisor<C> {
    fn send_command(&self, command: &Command) -> Result<Vec<String>, EngineError> {
        let link = self.current().ok_or(NetworkError::NotConnected)?;
        let result = link.command(command);
        if let Err(err) = &result {
            if err.is_network() {
                self.mark_lost(&link);
            }
        }
        result
    }
}

/// Frostbite 2: plain-text login, then event subscription.
pub struct FrostbiteConnector {
    address: String,
    password: String,
    options: LinkOptions,
    inbound: InboundQueue,
}

impl FrostbiteConnector {
    pub fn new(address: String, password: String, options: LinkOptions, inbound: InboundQueue) -> Self {
        Self {
            address,
            password,
            options,
            inbound,
        }
    }

    pub fn inbound(&self) -> &InboundQueue {
        &self.inbound
    }
}

impl Connector for FrostbiteConnector {
    type Link = RconLink;

    fn connect(&self) -> Result<RconLink, EngineError> {
        debug!(address = %self.address, "Connecting");
        RconLink::connect(&self.address, self.options.clone(), self.inbound.clone())
    }

    fn authenticate(&self, link: &RconLink) -> Result<(), EngineError> {
        match link.command(&frostbite::login_plain_text(&self.password)) {
            Ok(_) => {
                info!(peer = %link.peer(), "Authenticated");
                Ok(())
            }
            Err(EngineError::Command(err)) if err.is_invalid_password() => Err(
                EngineError::AuthenticationRejected(err.status().unwrap_or("InvalidPassword").into()),
            ),
            Err(err) => Err(err),
        }
    }

    fn enable_events(&self, link: &RconLink) -> Result<(), EngineError> {
        link.command(&frostbite::events_enabled(true)).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FailingConnector {
        attempts: Mutex<Vec<Instant>>,
    }

    struct NeverLink;

    impl Link for NeverLink {
        fn command(&self, _: &Command) -> Result<Vec<String>, EngineError> {
            Err(NetworkError::Closed.into())
        }
        fn is_alive(&self) -> bool {
            false
        }
        fn idle_for(&self) -> Duration {
            Duration::ZERO
        }
        fn close(&self) {}
    }

    impl Connector for FailingConnector {
        type Link = NeverLink;

        fn connect(&self) -> Result<NeverLink, EngineError> {
            self.attempts.lock().push(Instant::now());
            Err(NetworkError::Io(std::io::ErrorKind::ConnectionRefused.into()).into())
        }
        fn authenticate(&self, _: &NeverLink) -> Result<(), EngineError> {
            Ok(())
        }
        fn enable_events(&self, _: &NeverLink) -> Result<(), EngineError> {
            Ok(())
        }
    }

    struct RejectingConnector {
        logins: Mutex<u32>,
    }

    struct IdleLink;

    impl Link for IdleLink {
        fn command(&self, _: &Command) -> Result<Vec<String>, EngineError> {
            Ok(Vec::new())
        }
        fn is_alive(&self) -> bool {
            true
        }
        fn idle_for(&self) -> Duration {
            Duration::ZERO
        }
        fn close(&self) {}
    }

    impl Connector for RejectingConnector {
        type Link = IdleLink;

        fn connect(&self) -> Result<IdleLink, EngineError> {
            Ok(IdleLink)
        }
        fn authenticate(&self, _: &IdleLink) -> Result<(), EngineError> {
            *self.logins.lock() += 1;
            Err(EngineError::AuthenticationRejected("InvalidPassword".into()))
        }
        fn enable_events(&self, _: &IdleLink) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn supervisor<C: Connector>(connector: C, interval_ms: u64, budget_ms: u64) -> ConnectionSupervisor<C> {
        ConnectionSupervisor::new(
            connector,
            RetryPolicy {
                retry_interval: Duration::from_millis(interval_ms),
                total_budget: Duration::from_millis(budget_ms),
            },
            Arc::new(AtomicBool::new(true)),
            Arc::new(MetricsRecorder::new().unwrap()),
        )
    }

    #[test]
    fn test_always_failing_connector_respects_interval_and_budget() {
        let supervisor = supervisor(FailingConnector::default(), 30, 200);
        let started = Instant::now();
        let err = supervisor.establish().err().unwrap();
        let elapsed = started.elapsed();

        assert!(err.is_fatal());
        let attempts = match err {
            EngineError::RetryBudgetExhausted { attempts, .. } => attempts,
            other => panic!("unexpected error {other}"),
        };
        let calls = supervisor.connector().attempts.lock().clone();
        assert_eq!(calls.len() as u32, attempts);
        assert!((4..=7).contains(&attempts), "attempts = {attempts}");
        for pair in calls.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(30));
        }
        assert!(elapsed <= Duration::from_millis(200) + Duration::from_millis(100));
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_rejected_password_is_fatal_after_one_retry() {
        let supervisor = supervisor(
            RejectingConnector {
                logins: Mutex::new(0),
            },
            10,
            10_000,
        );
        let err = supervisor.establish().err().unwrap();
        assert!(matches!(err, EngineError::AuthenticationRejected(_)));
        assert_eq!(*supervisor.connector().logins.lock(), 2);
    }

    #[test]
    fn test_shutdown_interrupts_retry_loop() {
        let supervisor = Arc::new(supervisor(FailingConnector::default(), 5_000, 60_000));
        let handle = {
            let supervisor = supervisor.clone();
            thread::spawn(move || supervisor.establish())
        };
        thread::sleep(Duration::from_millis(50));
        supervisor.working.store(false, Ordering::Release);
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(EngineError::ShuttingDown)));
    }

    #[test]
    fn test_commands_without_link_fail_fast() {
        let supervisor = supervisor(FailingConnector::default(), 10, 10);
        let err = supervisor.send_command(&frostbite::version()).unwrap_err();
        assert!(matches!(err, EngineError::Network(NetworkError::NotConnected)));
    }
}
