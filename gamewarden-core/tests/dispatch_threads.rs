//! The dispatch thread against several producer threads.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use gamewarden_core::dispatch::{Flow, HandlerResult};
use gamewarden_core::events::{kinds, Event, EventRegistry, Payload};
use gamewarden_core::{DispatchEngine, DispatchOptions};
use gamewarden_telemetry::MetricsRecorder;
use parking_lot::Mutex;

#[test]
fn test_per_producer_order_survives_concurrency() {
    let registry = Arc::new(EventRegistry::new());
    let say = registry.id_of(kinds::CLIENT_SAY).unwrap();
    let stop = registry.id_of(kinds::STOP).unwrap();
    registry.seal();
    let metrics = Arc::new(MetricsRecorder::new().unwrap());
    let options = DispatchOptions {
        queue_capacity: 16,
        poll_interval: Duration::from_millis(20),
        ..DispatchOptions::default()
    };
    let (engine, bus) = DispatchEngine::new(registry, metrics, options).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        bus.subscribe("collector", [say], move |event: &Event| -> HandlerResult {
            if let Some(words) = event.payload().as_words() {
                seen.lock().push((words[0].clone(), words[1].parse::<u32>()?));
            }
            Ok(Flow::Continue)
        });
    }
    let dispatch = engine.spawn().unwrap();

    let producers: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| {
            let bus = bus.clone();
            thread::spawn(move || {
                for n in 0..200u32 {
                    let event = Event::new(say, Payload::words([name.to_string(), n.to_string()]));
                    bus.publish_blocking(event).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    bus.publish_blocking(Event::new(stop, Payload::Empty)).unwrap();
    dispatch.join().unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 600);
    for name in ["a", "b", "c"] {
        let order: Vec<u32> = seen.iter().filter(|(p, _)| p == name).map(|(_, n)| *n).collect();
        assert_eq!(order, (0..200).collect::<Vec<_>>());
    }
    assert_eq!(bus.metrics().events_dropped.get(), 0.0);
    assert!(!bus.is_working());
}
