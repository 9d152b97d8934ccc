//! Benchmark for the node registry over the in-memory store
//!
//! Target: 10K heartbeats/sec, sweeps over 1000-node registries

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use liveness_registry::{now_ms, LivenessConfig, MemoryStore, NodeRegistry, SharedStore};
use std::sync::Arc;

const REGISTRY_KEY: &str = "phonon_bench.nodelist";

fn setup(rt: &tokio::runtime::Runtime, nodes: usize, stale_every: usize) -> (MemoryStore, Arc<NodeRegistry>) {
    rt.block_on(async {
        let store = MemoryStore::new("bench-self");
        let registry = NodeRegistry::new(
            Arc::new(store.clone()),
            "bench",
            LivenessConfig::with_ttl_secs(30),
        )
        .await
        .unwrap();

        let now = now_ms();
        for i in 0..nodes {
            let ts = if stale_every > 0 && i % stale_every == 0 {
                now - 120_000
            } else {
                now
            };
            store
                .hset(REGISTRY_KEY, &format!("node-{:04}", i), &ts.to_string())
                .await
                .unwrap();
        }
        (store, registry)
    })
}

fn bench_refresh_session(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_registry");
    group.throughput(Throughput::Elements(1));

    let rt = tokio::runtime::Runtime::new().unwrap();
    let (_store, registry) = setup(&rt, 1000, 0);

    group.bench_function("refresh_session", |b| {
        let mut counter = 0u64;
        b.iter(|| {
            counter += 1;
            let node_id = format!("node-{:04}", counter % 1000);
            rt.block_on(registry.refresh_session_for(black_box(node_id)))
                .unwrap();
        });
    });

    group.finish();
}

fn bench_find_expired(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_registry");
    group.throughput(Throughput::Elements(1000));

    let rt = tokio::runtime::Runtime::new().unwrap();
    let (_store, registry) = setup(&rt, 1000, 10);

    group.bench_function("find_expired_1000", |b| {
        b.iter(|| {
            let expired = rt.block_on(registry.find_expired_nodes()).unwrap();
            black_box(expired);
        });
    });

    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_registry");
    group.throughput(Throughput::Elements(1000));

    let rt = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("sweep_1000_with_100_stale", |b| {
        b.iter_batched(
            || setup(&rt, 1000, 10),
            |(_store, registry)| {
                let removed = rt.block_on(registry.remove_expired_nodes(None)).unwrap();
                black_box(removed);
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_concurrent_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_registry");
    group.throughput(Throughput::Elements(100));

    let rt = tokio::runtime::Runtime::new().unwrap();
    let (_store, registry) = setup(&rt, 1000, 0);

    group.bench_function("concurrent_100_refreshes", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut handles = Vec::new();
                for i in 0..100 {
                    let reg = registry.clone();
                    handles.push(tokio::spawn(async move {
                        let _ = reg.refresh_session_for(format!("node-{:04}", i)).await;
                    }));
                }
                for handle in handles {
                    let _ = handle.await;
                }
            });
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_refresh_session,
    bench_find_expired,
    bench_sweep,
    bench_concurrent_refresh,
);
criterion_main!(benches);
