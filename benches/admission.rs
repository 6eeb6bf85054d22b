//! Performance benchmarks for a3s-ledger
//!
//! Run with: cargo bench

use a3s_ledger::{
    AdmissionConfig, CircuitBreaker, CircuitBreakerConfig, KvStore, MemoryKvStore,
    RequestAdmissionService,
};
use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;

fn bench_circuit_breaker(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let breaker = CircuitBreaker::new("bench", CircuitBreakerConfig::default());

    c.bench_function("CircuitBreaker execute (closed)", |b| {
        b.to_async(&rt)
            .iter(|| async { breaker.execute(|| async { Ok(1u64) }).await.unwrap() });
    });
}

fn bench_cache_hit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = Arc::new(MemoryKvStore::new());
    let service = RequestAdmissionService::new(
        Arc::clone(&store) as Arc<dyn KvStore>,
        AdmissionConfig::default(),
    );

    // Warm the entry once; every iteration after that is a hit
    rt.block_on(async {
        let _: u64 = service
            .execute_optimized("bench:key", "/api/v1/bench", None, || async { Ok(42) })
            .await
            .unwrap();
    });

    c.bench_function("RequestAdmissionService cache hit", |b| {
        b.to_async(&rt).iter(|| async {
            let value: u64 = service
                .execute_optimized("bench:key", "/api/v1/bench", None, || async { Ok(42) })
                .await
                .unwrap();
            value
        });
    });
}

fn bench_queue_passthrough(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let queue = a3s_ledger::RequestQueue::new(a3s_ledger::QueueConfig::default());

    c.bench_function("RequestQueue execute (uncontended)", |b| {
        b.to_async(&rt)
            .iter(|| async { queue.execute(|| async { Ok(1u64) }).await.unwrap() });
    });
}

criterion_group!(
    benches,
    bench_circuit_breaker,
    bench_cache_hit,
    bench_queue_passthrough
);
criterion_main!(benches);
