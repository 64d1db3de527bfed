//! Wiring of one agent: registry, dispatch thread and Frostbite adapter.

use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, Context};
use gamewarden_config::WardenConfig;
use gamewarden_core::dispatch::{Flow, HandlerResult};
use gamewarden_core::events::{Event, EventKind, EventRegistry};
use gamewarden_core::{DispatchEngine, DispatchOptions, EventBus};
use gamewarden_engine::players::NullStore;
use gamewarden_engine::{FrostbiteAdapter, ProtocolAdapter};
use gamewarden_telemetry::MetricsRecorder;
use tracing::{debug, info, warn};

pub struct Agent {
    pub adapter: Arc<FrostbiteAdapter>,
    pub bus: EventBus,
    dispatch: Option<JoinHandle<()>>,
    dump_stats: bool,
}

fn dispatch_options(config: &WardenConfig) -> DispatchOptions {
    DispatchOptions {
        queue_capacity: config.dispatch.queue_capacity,
        poll_interval: config.dispatch.poll_interval(),
        publish_timeout: config.dispatch.publish_timeout(),
        stats_samples: config.dispatch.stats_samples,
    }
}

impl Agent {
    /// Builds everything and starts the dispatch thread. The adapter is not
    /// connected until [`Agent::run`].
    pub fn start(config: &WardenConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(EventRegistry::new());
        let metrics = Arc::new(MetricsRecorder::new().context("metrics registry")?);
        let (engine, bus) = DispatchEngine::new(registry.clone(), metrics, dispatch_options(config))?;

        let adapter = Arc::new(FrostbiteAdapter::new(config, bus.clone(), Arc::new(NullStore))?);
        registry.seal();
        debug!(kinds = registry.len(), "Event registry sealed");

        subscribe_console(&bus);
        let dispatch = engine.spawn().context("spawning dispatch thread")?;

        Ok(Self {
            adapter,
            bus,
            dispatch: Some(dispatch),
            dump_stats: config.telemetry.dump_stats_on_exit,
        })
    }

    /// Ctrl-C stops the adapter and the bus.
    pub fn stop_on_interrupt(&self) -> anyhow::Result<()> {
        let adapter = self.adapter.clone();
        let bus = self.bus.clone();
        ctrlc::set_handler(move || {
            info!("Interrupt received, shutting down");
            adapter.shutdown();
            bus.shutdown();
        })
        .context("installing the interrupt handler")
    }

    /// Runs the adapter on the calling thread until shutdown or a fatal
    /// error, then stops dispatch.
    pub fn run(mut self) -> anyhow::Result<()> {
        let result = self.adapter.run();
        self.bus.shutdown();
        if let Some(dispatch) = self.dispatch.take() {
            if dispatch.join().is_err() {
                warn!("Dispatch thread panicked");
            }
        }
        if self.dump_stats {
            self.bus.dump_stats();
        }
        match self.bus.metrics().gather_metrics() {
            Ok(text) => debug!(metrics = %text, "Final counters"),
            Err(err) => warn!(error = %err, "Could not gather metrics"),
        }
        result.map_err(|err| anyhow!(err).context("game server adapter stopped"))
    }
}

/// Logs every event. Stands in for the policy plugins that normally
/// subscribe here.
fn subscribe_console(bus: &EventBus) {
    let registry = bus.registry().clone();
    let every_kind: Vec<EventKind> = registry.kinds().into_iter().map(|(kind, _)| kind).collect();
    bus.subscribe("console", every_kind, move |event: &Event| -> HandlerResult {
        let name = registry
            .name_of(event.kind())
            .unwrap_or_else(|_| event.kind().to_string());
        info!(
            kind = %name,
            source = ?event.source(),
            target = ?event.target(),
            payload = ?event.payload(),
            "Event"
        );
        Ok(Flow::Continue)
    });
}
