//! Worker pool throughput benchmark
//!
//! Measures the dispatch path: submit → idle worker (or new worker) → reply,
//! and the same path behind the registrar for named invocations.

use std::sync::Arc;
use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::future::join_all;
use serde_json::json;
use tokio::runtime::Runtime;

use courier::invocation::Registry;
use courier::worker::{WorkerPool, WorkerPoolConfig};
use courier::LocalDirectory;

/// Round-trip latency of a single task through a warm pool
fn bench_call_single(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("pool/single");
    group.throughput(Throughput::Elements(1));

    group.bench_function("call", |b| {
        b.to_async(&rt).iter_custom(|iters| async move {
            let pool = WorkerPool::spawn(WorkerPoolConfig::new().with_initial_capacity(1)).unwrap();

            let start = Instant::now();
            for i in 0..iters {
                pool.call(async move { Ok(json!(i)) }).await.unwrap();
            }
            let elapsed = start.elapsed();

            pool.shutdown(Duration::from_secs(1)).await.unwrap();
            elapsed
        });
    });

    group.finish();
}

/// Many concurrent tasks competing for a bounded pool
fn bench_call_concurrent(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("pool/concurrent");
    group.sample_size(20);

    for max_capacity in [2, 8, 32] {
        let task_count = 2000u64;
        group.throughput(Throughput::Elements(task_count));
        group.bench_with_input(
            BenchmarkId::new("max_capacity", max_capacity),
            &max_capacity,
            |b, &max_capacity| {
                b.to_async(&rt).iter(|| async move {
                    let pool = WorkerPool::spawn(
                        WorkerPoolConfig::new().with_max_capacity(max_capacity),
                    )
                    .unwrap();

                    let calls = (0..task_count).map(|i| {
                        let pool = pool.clone();
                        async move {
                            pool.call(async move {
                                tokio::task::yield_now().await;
                                Ok(json!(i))
                            })
                            .await
                        }
                    });
                    for outcome in join_all(calls).await {
                        outcome.unwrap();
                    }

                    pool.shutdown(Duration::from_secs(1)).await.unwrap();
                });
            },
        );
    }

    group.finish();
}

/// Named invocation through registrar, router and entry
fn bench_invoke(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("registry/invoke");
    group.throughput(Throughput::Elements(1));

    group.bench_function("local_provider", |b| {
        b.to_async(&rt).iter_custom(|iters| async move {
            let pool = WorkerPool::spawn(WorkerPoolConfig::new().with_max_capacity(8)).unwrap();
            let registry = Registry::builder(pool.clone(), Arc::new(LocalDirectory::new())).spawn();
            registry
                .register("bench@echo", |_me, args| async move { Ok(json!(args)) })
                .await
                .unwrap();

            let start = Instant::now();
            for i in 0..iters {
                registry.call("bench@echo", vec![json!(i)]).await.unwrap();
            }
            let elapsed = start.elapsed();

            registry.shutdown(Duration::from_secs(1)).await.unwrap();
            pool.shutdown(Duration::from_secs(1)).await.unwrap();
            elapsed
        });
    });

    group.finish();
}

criterion_group!(benches, bench_call_single, bench_call_concurrent, bench_invoke);

criterion_main!(benches);
