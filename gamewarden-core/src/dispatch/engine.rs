//! Event bus and the dispatch loop.
//!
//! Any number of producers publish through cloned [`EventBus`] handles. One
//! [`DispatchEngine`] owns the receiving end and runs every event through
//! the subscribed handlers on a single thread:
//! - events are delivered in strict publication order
//! - handlers for one event run in subscription order, never concurrently
//! - a veto stops delivery of that event only
//! - a failing or panicking handler is logged and skipped

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use gamewarden_telemetry::MetricsRecorder;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use super::handler::{EventHandler, Flow, HandlerResult, Registration};
use super::stats::EventStats;
use crate::error::EventError;
use crate::events::{kinds, Event, EventKind, EventRegistry, Payload};

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub queue_capacity: usize,
    /// Upper bound on how long the loop blocks before re-checking the working flag.
    pub poll_interval: Duration,
    /// How long [`EventBus::publish`] waits on a full queue before dropping.
    pub publish_timeout: Duration,
    pub stats_samples: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 400,
            poll_interval: Duration::from_millis(500),
            publish_timeout: Duration::from_secs(2),
            stats_samples: 100,
        }
    }
}

struct Envelope {
    event: Event,
    enqueued_at: Instant,
}

struct Shared {
    working: AtomicBool,
    pending: Mutex<Vec<Registration>>,
    owners: Mutex<HashMap<String, Arc<AtomicBool>>>,
    stats: Mutex<EventStats>,
    registry: Arc<EventRegistry>,
    metrics: Arc<MetricsRecorder>,
    publish_timeout: Duration,
}

/// Cloneable producer handle.
#[derive(Clone)]
pub struct EventBus {
    tx: Sender<Envelope>,
    shared: Arc<Shared>,
}

impl EventBus {
    /// Enqueues `event`. Only blocks while the queue is full, for at most the
    /// configured publish timeout, after which the event is dropped.
    pub fn publish(&self, event: Event) -> Result<(), EventError> {
        if !self.is_working() {
            return Err(EventError::Closed);
        }
        let kind = event.kind();
        let envelope = Envelope {
            event,
            enqueued_at: Instant::now(),
        };
        match self.tx.send_timeout(envelope, self.shared.publish_timeout) {
            Ok(()) => {
                self.shared.metrics.events_published.inc();
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => {
                self.shared.metrics.events_dropped.inc();
                error!(
                    event = %self.kind_name(kind),
                    "Event queue full, dropping event"
                );
                Err(EventError::QueueFull)
            }
            Err(SendTimeoutError::Disconnected(_)) => Err(EventError::Closed),
        }
    }

    /// Non-blocking variant of [`EventBus::publish`].
    pub fn try_publish(&self, event: Event) -> Result<(), EventError> {
        if !self.is_working() {
            return Err(EventError::Closed);
        }
        let kind = event.kind();
        let envelope = Envelope {
            event,
            enqueued_at: Instant::now(),
        };
        match self.tx.try_send(envelope) {
            Ok(()) => {
                self.shared.metrics.events_published.inc();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.shared.metrics.events_dropped.inc();
                error!(event = %self.kind_name(kind), "Event queue full, dropping event");
                Err(EventError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(EventError::Closed),
        }
    }

    /// Waits for queue space as long as the bus is working. Never drops.
    pub fn publish_blocking(&self, event: Event) -> Result<(), EventError> {
        let mut envelope = Envelope {
            event,
            enqueued_at: Instant::now(),
        };
        loop {
            if !self.is_working() {
                return Err(EventError::Closed);
            }
            match self.tx.send_timeout(envelope, self.shared.publish_timeout) {
                Ok(()) => {
                    self.shared.metrics.events_published.inc();
                    return Ok(());
                }
                Err(SendTimeoutError::Timeout(back)) => {
                    warn!(
                        event = %self.kind_name(back.event.kind()),
                        "Event queue still full, waiting"
                    );
                    envelope = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Err(EventError::Closed),
            }
        }
    }

    /// Builds an event of the named kind and publishes it.
    pub fn publish_named(&self, name: &str, payload: impl Into<Payload>) -> Result<(), EventError> {
        let kind = self.shared.registry.id_of(name)?;
        self.publish(Event::new(kind, payload))
    }

    /// Adds a closure handler for the given kinds.
    pub fn subscribe<I, F>(&self, owner: &str, interests: I, handler: F)
    where
        I: IntoIterator<Item = EventKind>,
        F: FnMut(&Event) -> HandlerResult + Send + 'static,
    {
        self.subscribe_handler(owner, interests, handler)
    }

    /// Adds a handler for the given kinds. Registrations sharing an owner
    /// share its enabled flag.
    pub fn subscribe_handler<I, H>(&self, owner: &str, interests: I, handler: H)
    where
        I: IntoIterator<Item = EventKind>,
        H: EventHandler + 'static,
    {
        let enabled = self
            .shared
            .owners
            .lock()
            .entry(owner.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(true)))
            .clone();
        let registration = Registration {
            owner: owner.to_string(),
            interests: interests.into_iter().collect(),
            enabled,
            handler: Box::new(handler),
        };
        debug!(owner, kinds = registration.interests.len(), "Handler subscribed");
        self.shared.pending.lock().push(registration);
    }

    /// Enables or disables every handler of `owner`. Returns `false` for an
    /// unknown owner.
    pub fn set_enabled(&self, owner: &str, enabled: bool) -> bool {
        match self.shared.owners.lock().get(owner) {
            Some(flag) => {
                flag.store(enabled, Ordering::Release);
                info!(owner, enabled, "Handler enablement changed");
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self, owner: &str) -> Option<bool> {
        self.shared
            .owners
            .lock()
            .get(owner)
            .map(|flag| flag.load(Ordering::Acquire))
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.shared.registry
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.shared.metrics
    }

    #[inline]
    pub fn is_working(&self) -> bool {
        self.shared.working.load(Ordering::Acquire)
    }

    /// Clears the working flag. The dispatch loop exits at its next poll.
    pub fn shutdown(&self) {
        if self.shared.working.swap(false, Ordering::AcqRel) {
            info!("Event bus shutting down");
        }
    }

    pub fn dump_stats(&self) {
        self.shared.stats.lock().dump(&self.shared.registry);
    }

    pub fn with_stats<T>(&self, f: impl FnOnce(&EventStats) -> T) -> T {
        f(&self.shared.stats.lock())
    }

    fn kind_name(&self, kind: EventKind) -> String {
        self.shared
            .registry
            .name_of(kind)
            .unwrap_or_else(|_| kind.to_string())
    }
}

pub struct DispatchEngine {
    rx: Receiver<Envelope>,
    bus: EventBus,
    registrations: Vec<Registration>,
    stop_kinds: [EventKind; 2],
    poll_interval: Duration,
}

impl DispatchEngine {
    pub fn new(
        registry: Arc<EventRegistry>,
        metrics: Arc<MetricsRecorder>,
        options: DispatchOptions,
    ) -> Result<(Self, EventBus), EventError> {
        if options.queue_capacity == 0 {
            return Err(EventError::InvalidCapacity);
        }
        let stop_kinds = [registry.id_of(kinds::EXIT)?, registry.id_of(kinds::STOP)?];
        let (tx, rx) = channel::bounded(options.queue_capacity);
        let shared = Arc::new(Shared {
            working: AtomicBool::new(true),
            pending: Mutex::new(Vec::new()),
            owners: Mutex::new(HashMap::new()),
            stats: Mutex::new(EventStats::new(options.stats_samples)),
            registry,
            metrics,
            publish_timeout: options.publish_timeout,
        });
        let bus = EventBus { tx, shared };
        let engine = Self {
            rx,
            bus: bus.clone(),
            registrations: Vec::new(),
            stop_kinds,
            poll_interval: options.poll_interval,
        };
        Ok((engine, bus))
    }

    /// Runs the loop on a thread named `dispatch`.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("dispatch".into())
            .spawn(move || self.run())
    }

    /// Blocks until shutdown or until an exit/stop event has been delivered.
    pub fn run(mut self) {
        info!("Dispatch loop started");
        while self.bus.is_working() {
            match self.rx.recv_timeout(self.poll_interval) {
                Ok(envelope) => {
                    if self.process(envelope) {
                        self.bus.shutdown();
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    trace!("Dispatch poll timeout");
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("All event producers gone");
                    break;
                }
            }
        }
        let abandoned = self.rx.len();
        if abandoned > 0 {
            warn!(abandoned, "Dispatch loop stopped with queued events");
        }
        info!("Dispatch loop stopped");
    }

    /// Delivers everything queued right now without blocking. Returns the
    /// number of events processed.
    pub fn drain(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(envelope) = self.rx.try_recv() {
            processed += 1;
            if self.process(envelope) {
                self.bus.shutdown();
                break;
            }
        }
        processed
    }

    fn accept_subscriptions(&mut self) {
        let mut pending = self.bus.shared.pending.lock();
        if !pending.is_empty() {
            self.registrations.append(&mut pending);
        }
    }

    /// Returns `true` when the event asks the loop to stop.
    fn process(&mut self, envelope: Envelope) -> bool {
        self.accept_subscriptions();
        let Envelope { event, enqueued_at } = envelope;
        let kind = event.kind();
        let name = self.bus.kind_name(kind);
        let shared = &self.bus.shared;

        shared.stats.lock().record_wait(enqueued_at.elapsed());
        trace!(event = %name, "Dispatching");

        for registration in self.registrations.iter_mut() {
            if !registration.wants(kind) {
                continue;
            }
            if !registration.enabled.load(Ordering::Acquire) {
                trace!(owner = %registration.owner, event = %name, "Handler disabled, skipping");
                continue;
            }

            let started = Instant::now();
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| registration.handler.handle(&event)));
            let elapsed = started.elapsed();
            shared
                .stats
                .lock()
                .record_handled(&registration.owner, kind, elapsed);
            shared.metrics.handler_latency.observe(elapsed.as_secs_f64());

            match outcome {
                Ok(Ok(Flow::Continue)) => {}
                Ok(Ok(Flow::Veto)) => {
                    shared.metrics.handler_vetoes.inc();
                    info!(owner = %registration.owner, event = %name, "Event vetoed");
                    break;
                }
                Ok(Err(err)) => {
                    shared.metrics.handler_failures.inc();
                    error!(
                        owner = %registration.owner,
                        event = %name,
                        error = ?err,
                        "Handler failed"
                    );
                }
                Err(panic) => {
                    shared.metrics.handler_failures.inc();
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic".to_string());
                    error!(
                        owner = %registration.owner,
                        event = %name,
                        panic = %message,
                        "Handler panicked"
                    );
                }
            }
        }
        shared.metrics.events_dispatched.inc();

        if self.stop_kinds.contains(&kind) {
            info!(event = %name, "Stop event delivered");
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tracing_test::traced_test;

    fn setup() -> (DispatchEngine, EventBus) {
        let registry = Arc::new(EventRegistry::new());
        let metrics = Arc::new(MetricsRecorder::new().unwrap());
        DispatchEngine::new(registry, metrics, DispatchOptions::default()).unwrap()
    }

    fn kind(bus: &EventBus, name: &str) -> EventKind {
        bus.registry().id_of(name).unwrap()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let registry = Arc::new(EventRegistry::new());
        let metrics = Arc::new(MetricsRecorder::new().unwrap());
        let options = DispatchOptions {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            DispatchEngine::new(registry, metrics, options),
            Err(EventError::InvalidCapacity)
        ));
    }

    #[test]
    fn test_fifo_and_subscription_order() {
        let (mut engine, bus) = setup();
        let say = kind(&bus, kinds::CLIENT_SAY);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for owner in ["first", "second"] {
            let seen = seen.clone();
            bus.subscribe(owner, [say], move |event: &Event| {
                let text = event.payload().as_text().unwrap_or_default().to_string();
                seen.lock().push(format!("{owner}:{text}"));
                Ok(Flow::Continue)
            });
        }

        bus.publish(Event::new(say, "a")).unwrap();
        bus.publish(Event::new(say, "b")).unwrap();
        assert_eq!(engine.drain(), 2);

        assert_eq!(
            *seen.lock(),
            vec!["first:a", "second:a", "first:b", "second:b"]
        );
    }

    #[traced_test]
    #[test]
    fn test_veto_stops_later_handlers_for_that_event_only() {
        let (mut engine, bus) = setup();
        let say = kind(&bus, kinds::CLIENT_SAY);
        let late_calls = Arc::new(AtomicUsize::new(0));

        bus.subscribe("censor", [say], |event: &Event| {
            if event.payload().as_text() == Some("badword") {
                Ok(Flow::Veto)
            } else {
                Ok(Flow::Continue)
            }
        });
        let counter = late_calls.clone();
        bus.subscribe("chatlog", [say], move |_: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Continue)
        });

        bus.publish(Event::new(say, "badword")).unwrap();
        bus.publish(Event::new(say, "hello")).unwrap();
        engine.drain();

        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
        assert!(logs_contain("Event vetoed"));
        assert!(logs_contain("censor"));
    }

    #[traced_test]
    #[test]
    fn test_failing_handlers_are_isolated() {
        let (mut engine, bus) = setup();
        let kill = kind(&bus, kinds::CLIENT_KILL);
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        bus.subscribe("before", [kill], move |_: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Continue)
        });
        bus.subscribe("broken", [kill], |_: &Event| Err(anyhow::anyhow!("no database")));
        bus.subscribe("panicky", [kill], |_: &Event| panic!("boom"));
        let counter = calls.clone();
        bus.subscribe("after", [kill], move |_: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Continue)
        });

        bus.publish(Event::new(kill, Payload::Empty)).unwrap();
        engine.drain();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(logs_contain("Handler failed"));
        assert!(logs_contain("no database"));
        assert!(logs_contain("Handler panicked"));
        assert_eq!(bus.metrics().handler_failures.get(), 2.0);
    }

    #[test]
    fn test_disabled_owner_is_skipped_but_kept() {
        let (mut engine, bus) = setup();
        let say = kind(&bus, kinds::CLIENT_SAY);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        bus.subscribe("spamcontrol", [say], move |_: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Continue)
        });

        assert!(bus.set_enabled("spamcontrol", false));
        assert!(!bus.set_enabled("missing", false));
        bus.publish(Event::new(say, "x")).unwrap();
        engine.drain();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        bus.set_enabled("spamcontrol", true);
        bus.publish(Event::new(say, "y")).unwrap();
        engine.drain();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handlers_only_see_their_interests() {
        let (mut engine, bus) = setup();
        let say = kind(&bus, kinds::CLIENT_SAY);
        let kick = kind(&bus, kinds::CLIENT_KICK);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        bus.subscribe("kicklog", [kick], move |_: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Continue)
        });
        bus.publish(Event::new(say, "x")).unwrap();
        bus.publish(Event::new(kick, "y")).unwrap();
        engine.drain();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_full_queue_drops() {
        let registry = Arc::new(EventRegistry::new());
        let metrics = Arc::new(MetricsRecorder::new().unwrap());
        let options = DispatchOptions {
            queue_capacity: 1,
            publish_timeout: Duration::from_millis(10),
            ..Default::default()
        };
        let (_engine, bus) = DispatchEngine::new(registry, metrics, options).unwrap();
        let say = kind(&bus, kinds::CLIENT_SAY);

        bus.publish(Event::new(say, "1")).unwrap();
        assert_eq!(bus.publish(Event::new(say, "2")), Err(EventError::QueueFull));
        assert_eq!(bus.try_publish(Event::new(say, "3")), Err(EventError::QueueFull));
        assert_eq!(bus.metrics().events_dropped.get(), 2.0);
    }

    #[test]
    fn test_blocking_publish_waits_for_room() {
        let registry = Arc::new(EventRegistry::new());
        let metrics = Arc::new(MetricsRecorder::new().unwrap());
        let options = DispatchOptions {
            queue_capacity: 1,
            publish_timeout: Duration::from_millis(10),
            ..Default::default()
        };
        let (mut engine, bus) = DispatchEngine::new(registry, metrics, options).unwrap();
        let say = kind(&bus, kinds::CLIENT_SAY);
        bus.publish(Event::new(say, "1")).unwrap();

        let producer = {
            let bus = bus.clone();
            thread::spawn(move || bus.publish_blocking(Event::new(say, "2")))
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(engine.drain(), 1);
        assert_eq!(producer.join().unwrap(), Ok(()));
        assert_eq!(engine.drain(), 1);
        assert_eq!(bus.metrics().events_dropped.get(), 0.0);
    }

    #[test]
    fn test_stop_event_ends_loop_after_delivery() {
        let (engine, bus) = setup();
        let stop = kind(&bus, kinds::STOP);
        let saw_stop = Arc::new(AtomicBool::new(false));
        let flag = saw_stop.clone();
        bus.subscribe("admin", [stop], move |_: &Event| {
            flag.store(true, Ordering::SeqCst);
            Ok(Flow::Continue)
        });

        let handle = engine.spawn().unwrap();
        bus.publish(Event::new(stop, Payload::Empty)).unwrap();
        handle.join().unwrap();

        assert!(saw_stop.load(Ordering::SeqCst));
        assert!(!bus.is_working());
        assert_eq!(
            bus.publish_named(kinds::CLIENT_SAY, "late"),
            Err(EventError::Closed)
        );
    }

    #[test]
    fn test_shutdown_flag_is_observed() {
        let registry = Arc::new(EventRegistry::new());
        let metrics = Arc::new(MetricsRecorder::new().unwrap());
        let options = DispatchOptions {
            poll_interval: Duration::from_millis(20),
            ..Default::default()
        };
        let (engine, bus) = DispatchEngine::new(registry, metrics, options).unwrap();
        let handle = engine.spawn().unwrap();
        bus.shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn test_stats_are_recorded() {
        let (mut engine, bus) = setup();
        let say = kind(&bus, kinds::CLIENT_SAY);
        bus.subscribe("stats", [say], |_: &Event| Ok(Flow::Continue));
        bus.publish(Event::new(say, "x")).unwrap();
        engine.drain();
        let samples = bus.with_stats(|stats| stats.summary("stats", say).map(|s| s.samples));
        assert_eq!(samples, Some(1));
        assert!(bus.with_stats(|stats| stats.queue_wait().is_some()));
    }

    struct Counter {
        seen: Arc<AtomicUsize>,
    }

    impl EventHandler for Counter {
        fn handle(&mut self, _event: &Event) -> HandlerResult {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Continue)
        }
    }

    #[test]
    fn test_struct_handlers() {
        let (mut engine, bus) = setup();
        let connect = kind(&bus, kinds::CLIENT_CONNECT);
        let seen = Arc::new(AtomicUsize::new(0));
        bus.subscribe_handler("welcome", [connect], Counter { seen: seen.clone() });
        bus.publish(Event::new(connect, Payload::Empty)).unwrap();
        bus.publish(Event::new(connect, Payload::Empty)).unwrap();
        engine.drain();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(bus.is_enabled("welcome"), Some(true));
    }
}
