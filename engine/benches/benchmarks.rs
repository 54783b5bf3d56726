//! Performance benchmarks for optimist-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use optimist_engine::{
    views, Cache, CacheSnapshot, CacheValue, Ledger, ListResult, MemoryCache, Operation,
    PushEvent, QueryKey, Record,
};
use serde_json::json;
use std::time::Duration;

fn populated_ledger(size: u64) -> Ledger {
    let ledger = Ledger::new();
    for i in 0..size {
        ledger.add(Operation::update(
            format!("op_{i}"),
            "patients",
            format!("r{i}"),
            json!({"name": "Test"}),
            i,
        ));
    }
    ledger
}

fn populated_cache(size: usize) -> MemoryCache {
    let cache = MemoryCache::new();
    let items = (0..size)
        .map(|i| Record::new(format!("r{i}")).with_field("name", "Test"))
        .collect();
    cache.write(
        QueryKey::list_all("patients"),
        CacheValue::List(ListResult::from_items(items)),
    );
    cache
}

fn bench_ledger(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger");

    for size in [10u64, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("has_conflict", size), size, |b, &size| {
            let ledger = populated_ledger(size);
            b.iter(|| ledger.has_conflict(black_box("patients"), black_box(Some("missing"))))
        });

        group.bench_with_input(BenchmarkId::new("pending_for", size), size, |b, &size| {
            let ledger = populated_ledger(size);
            b.iter(|| ledger.pending_for(black_box("patients")))
        });

        group.bench_with_input(BenchmarkId::new("sweep_none", size), size, |b, &size| {
            let ledger = populated_ledger(size);
            b.iter(|| ledger.sweep(black_box(0), Duration::from_secs(300)))
        });
    }

    group.finish();
}

fn bench_views(c: &mut Criterion) {
    let mut group = c.benchmark_group("views");

    for size in [10usize, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("push_update", size), size, |b, &size| {
            let cache = populated_cache(size);
            let event = PushEvent::update(Record::new("r5").with_field("name", "Pushed"));
            b.iter(|| views::apply_push_event(&cache, "patients", black_box(&event)))
        });

        group.bench_with_input(BenchmarkId::new("snapshot_restore", size), size, |b, &size| {
            let cache = populated_cache(size);
            let keys = views::record_keys(&cache, "patients", "r5");
            b.iter(|| {
                let snapshot = CacheSnapshot::capture(&cache, &keys);
                views::remove_from_views(&cache, "patients", "r5");
                snapshot.restore(&cache);
            })
        });
    }

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    let text = r#"{"action":"update","record":{"id":"r1","name":"FromOtherClient","updated":"2024-01-01T00:00:00.000Z"}}"#;
    group.bench_function("push_event_parse", |b| {
        b.iter(|| PushEvent::parse(black_box(text)))
    });

    let op = Operation::create("op_1", "patients", "temp-1", json!({"name": "Acme"}), 1000);
    group.bench_function("operation_to_json", |b| {
        b.iter(|| serde_json::to_string(black_box(&op)))
    });

    group.finish();
}

criterion_group!(benches, bench_ledger, bench_views, bench_serialization,);
criterion_main!(benches);
