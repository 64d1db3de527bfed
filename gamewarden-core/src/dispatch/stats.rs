//! Bounded latency samples per handler and event kind.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tracing::info;

use crate::events::{EventKind, EventRegistry};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub samples: usize,
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
    pub stddev: Duration,
}

impl LatencySummary {
    fn from_samples(samples: &VecDeque<Duration>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let nanos: Vec<f64> = samples.iter().map(|d| d.as_nanos() as f64).collect();
        let n = nanos.len() as f64;
        let mean = nanos.iter().sum::<f64>() / n;
        let variance = nanos.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        let min = nanos.iter().copied().fold(f64::INFINITY, f64::min);
        let max = nanos.iter().copied().fold(0.0, f64::max);
        let to_duration = |nanos: f64| Duration::from_nanos(nanos.round() as u64);

        Some(Self {
            samples: nanos.len(),
            min: to_duration(min),
            max: to_duration(max),
            mean: to_duration(mean),
            stddev: to_duration(variance.sqrt()),
        })
    }
}

#[derive(Debug)]
pub struct EventStats {
    capacity: usize,
    handled: HashMap<(String, EventKind), VecDeque<Duration>>,
    queue_wait: VecDeque<Duration>,
}

impl EventStats {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            handled: HashMap::new(),
            queue_wait: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    fn push(buf: &mut VecDeque<Duration>, capacity: usize, sample: Duration) {
        if buf.len() == capacity {
            buf.pop_front();
        }
        buf.push_back(sample);
    }

    pub fn record_handled(&mut self, owner: &str, kind: EventKind, elapsed: Duration) {
        let capacity = self.capacity;
        let buf = self
            .handled
            .entry((owner.to_string(), kind))
            .or_insert_with(|| VecDeque::with_capacity(capacity));
        Self::push(buf, capacity, elapsed);
    }

    pub fn record_wait(&mut self, waited: Duration) {
        Self::push(&mut self.queue_wait, self.capacity, waited);
    }

    pub fn summary(&self, owner: &str, kind: EventKind) -> Option<LatencySummary> {
        self.handled
            .get(&(owner.to_string(), kind))
            .and_then(LatencySummary::from_samples)
    }

    pub fn queue_wait(&self) -> Option<LatencySummary> {
        LatencySummary::from_samples(&self.queue_wait)
    }

    /// Logs one line per `(owner, kind)` plus the queue wait summary.
    pub fn dump(&self, registry: &EventRegistry) {
        let mut keys: Vec<_> = self.handled.keys().collect();
        keys.sort();
        for (owner, kind) in keys {
            if let Some(s) = self.summary(owner, *kind) {
                let name = registry
                    .name_of(*kind)
                    .unwrap_or_else(|_| kind.to_string());
                info!(
                    owner = %owner,
                    event = %name,
                    samples = s.samples,
                    min = ?s.min,
                    max = ?s.max,
                    mean = ?s.mean,
                    stddev = ?s.stddev,
                    "Handler latency"
                );
            }
        }
        if let Some(s) = self.queue_wait() {
            info!(
                samples = s.samples,
                min = ?s.min,
                max = ?s.max,
                mean = ?s.mean,
                stddev = ?s.stddev,
                "Event queue wait"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::kinds;

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let registry = EventRegistry::new();
        let kind = registry.id_of(kinds::CLIENT_SAY).unwrap();
        let mut stats = EventStats::new(3);
        for ms in [100, 1, 2, 3] {
            stats.record_handled("censor", kind, Duration::from_millis(ms));
        }
        let summary = stats.summary("censor", kind).unwrap();
        assert_eq!(summary.samples, 3);
        assert_eq!(summary.max, Duration::from_millis(3));
        assert_eq!(summary.min, Duration::from_millis(1));
    }

    #[test]
    fn test_summary_math() {
        let mut stats = EventStats::new(10);
        stats.record_wait(Duration::from_millis(2));
        stats.record_wait(Duration::from_millis(4));
        let s = stats.queue_wait().unwrap();
        assert_eq!(s.mean, Duration::from_millis(3));
        assert_eq!(s.stddev, Duration::from_millis(1));
    }

    #[test]
    fn test_empty_summary() {
        let stats = EventStats::new(10);
        assert!(stats.queue_wait().is_none());
    }
}
