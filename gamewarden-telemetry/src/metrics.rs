//! Prometheus counters for event flow and handler latency.

use prometheus::{Counter, Histogram, HistogramOpts, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub events_published: Counter,
    pub events_dropped: Counter,
    pub events_dispatched: Counter,
    pub handler_failures: Counter,
    pub handler_vetoes: Counter,
    pub reconnects: Counter,
    pub handler_latency: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events_published =
            Counter::new("gamewarden_events_published_total", "Events accepted by the bus")?;
        let events_dropped = Counter::new(
            "gamewarden_events_dropped_total",
            "Events dropped because the queue was full or expired",
        )?;
        let events_dispatched =
            Counter::new("gamewarden_events_dispatched_total", "Events run through handlers")?;
        let handler_failures =
            Counter::new("gamewarden_handler_failures_total", "Handler errors and panics")?;
        let handler_vetoes =
            Counter::new("gamewarden_handler_vetoes_total", "Events vetoed by a handler")?;
        let reconnects =
            Counter::new("gamewarden_reconnects_total", "Game server connection attempts")?;
        let handler_latency = Histogram::with_opts(
            HistogramOpts::new(
                "gamewarden_handler_latency_seconds",
                "Time spent inside a single handler",
            )
            .buckets(vec![0.000_1, 0.001, 0.01, 0.1, 1.0]),
        )?;

        registry.register(Box::new(events_published.clone()))?;
        registry.register(Box::new(events_dropped.clone()))?;
        registry.register(Box::new(events_dispatched.clone()))?;
        registry.register(Box::new(handler_failures.clone()))?;
        registry.register(Box::new(handler_vetoes.clone()))?;
        registry.register(Box::new(reconnects.clone()))?;
        registry.register(Box::new(handler_latency.clone()))?;

        Ok(Self {
            registry,
            events_published,
            events_dropped,
            events_dispatched,
            handler_failures,
            handler_vetoes,
            reconnects,
            handler_latency,
        })
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_contains_counters() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.events_published.inc();
        metrics.events_dropped.inc_by(2.0);
        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("gamewarden_events_published_total 1"));
        assert!(text.contains("gamewarden_events_dropped_total 2"));
    }
}
