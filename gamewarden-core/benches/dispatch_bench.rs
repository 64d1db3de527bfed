#[macro_use]
extern crate criterion;

use std::sync::Arc;

use criterion::Criterion;

use gamewarden_core::prelude::*;
use gamewarden_telemetry::MetricsRecorder;

fn bench_publish_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_throughput");

    for handlers in [1, 8, 32] {
        group.throughput(criterion::Throughput::Elements(1));
        group.bench_function(format!("handlers_{}", handlers), |b| {
            let registry = Arc::new(EventRegistry::new());
            let metrics = Arc::new(MetricsRecorder::new().unwrap());
            let (mut engine, bus) =
                DispatchEngine::new(registry.clone(), metrics, DispatchOptions::default())
                    .unwrap();
            let say = registry.id_of(kinds::CLIENT_SAY).unwrap();
            for i in 0..handlers {
                bus.subscribe(&format!("plugin{}", i), [say], |_: &Event| Ok(Flow::Continue));
            }
            let event = Event::new(say, "hello world");
            b.iter(|| {
                bus.try_publish(event.clone()).unwrap();
                engine.drain();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_publish_drain);
criterion_main!(benches);
