//! Benchmarks for inbound routing
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use dashlink::router::MessageRouter;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn counting_router() -> (Arc<MessageRouter>, Arc<AtomicUsize>) {
    let router = Arc::new(MessageRouter::new());
    router.install_sequence_relay();

    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    router.add_sequence_handler(move |_| {
        seen.fetch_add(1, Ordering::Relaxed);
    });
    (router, count)
}

fn update_payload(values: usize) -> Vec<u8> {
    let fields: Vec<String> = (0..values).map(|i| format!("\"seq{}\": {}", i, i)).collect();
    format!("{{\"update\": {{\"$t\": 1700000000, {}}}}}", fields.join(", ")).into_bytes()
}

fn bench_broker(c: &mut Criterion) {
    let mut group = c.benchmark_group("broker");
    let (router, _count) = counting_router();

    for size in [1, 10, 100] {
        let payload = update_payload(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("update_{}", size), |b| {
            b.iter(|| router.route_broker(black_box("plant/line1"), black_box(&payload)).unwrap())
        });
    }

    group.throughput(Throughput::Elements(1));
    group.bench_function("compact_sample", |b| {
        let payload = b"s,temp,1700000000.25,21.5".to_vec();
        b.iter(|| router.route_broker(black_box("plant/line1"), black_box(&payload)).unwrap())
    });

    group.finish();
}

fn bench_legacy(c: &mut Criterion) {
    let mut group = c.benchmark_group("legacy");
    let (router, _count) = counting_router();

    group.bench_function("sequence_update", |b| {
        let frame = r#"{"type": "sequence_update", "timestamp": "2023-11-14T22:13:20Z",
            "parameters": {"name": "/plant/line1/temp", "value": 21.5}}"#;
        b.iter(|| router.route_legacy(black_box(frame)).unwrap())
    });

    group.bench_function("unhandled_type", |b| {
        let frame = r#"{"type": "status", "parameters": {"state": "running"}}"#;
        b.iter(|| router.route_legacy(black_box(frame)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_broker, bench_legacy);
criterion_main!(benches);
