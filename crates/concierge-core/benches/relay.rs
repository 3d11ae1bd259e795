//! Relay hot-path benchmarks.

use concierge_core::{ManualClock, RelayConfig, RelayEngine};
use concierge_transport::BusEvent;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

const NOW: u64 = 1_700_000_000_000;

fn engine_with_clients(clients: usize) -> RelayEngine {
    let engine = RelayEngine::with_clock(
        RelayConfig::default(),
        Arc::new(ManualClock::new(NOW, 0)),
    );
    for i in 0..clients {
        engine.handle(BusEvent::message(
            format!("concierge/player-{}/join", i),
            Vec::new(),
        ));
    }
    engine
}

/// Benchmark stamping and relaying a position update.
fn bench_relay_positions(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay_positions");
    let engine = engine_with_clients(100);

    for size in [1usize, 16, 128] {
        let positions: Vec<String> = (0..size)
            .map(|i| format!(r#"{{"x":{},"y":{},"color":[255,0,0,1]}}"#, i, i * 2))
            .collect();
        let body = format!(r#"{{"positions":[{}]}}"#, positions.join(","));

        group.bench_with_input(BenchmarkId::from_parameter(size), &body, |b, body| {
            b.iter(|| {
                engine.handle(black_box(BusEvent::message(
                    "gigascapes/player-1/positions",
                    body.clone().into_bytes(),
                )))
            });
        });
    }

    group.finish();
}

/// Benchmark computing the recent-client set.
fn bench_recent_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("recent_snapshot");

    for clients in [10usize, 1_000, 5_000] {
        let engine = engine_with_clients(clients);
        group.bench_function(BenchmarkId::from_parameter(clients), |b| {
            b.iter(|| black_box(engine.recent_snapshot()));
        });
    }

    group.finish();
}

/// Benchmark answering a nudge.
fn bench_nudge(c: &mut Criterion) {
    let engine = engine_with_clients(1_000);
    c.bench_function("nudge_1000_clients", |b| {
        b.iter(|| engine.handle(black_box(BusEvent::message("concierge/nudge", Vec::new()))));
    });
}

criterion_group!(
    benches,
    bench_relay_positions,
    bench_recent_snapshot,
    bench_nudge
);
criterion_main!(benches);
