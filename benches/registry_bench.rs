//! 模块注册表性能基准测试
//!
//! 使用 Criterion 框架进行性能测试，包括：
//! - 缓存命中加载基准
//! - 并发加载去重基准
//! - 依赖图加载顺序计算基准

use std::sync::Arc;
use std::time::Duration;

use chips_registry::{DependencyGraph, ModuleConfig, ModuleRegistry, RegistryConfig, StaticResolver};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

// ============================================================================
// 测试辅助
// ============================================================================

/// 长度为 `size` 的依赖链：m{i} 依赖 m{i-1}
fn chain(size: usize) -> Vec<ModuleConfig> {
    (0..size)
        .map(|i| {
            let config = ModuleConfig::new(format!("m{i}"), format!("./m{i}"));
            if i == 0 {
                config
            } else {
                config.with_dependency(format!("m{}", i - 1))
            }
        })
        .collect()
}

fn registry_with_chain(size: usize) -> ModuleRegistry {
    let resolver = StaticResolver::new();
    for i in 0..size {
        resolver.insert(format!("./m{i}"), i);
    }
    let config = RegistryConfig::builder().max_cache_size(size.max(1)).build();
    let registry = ModuleRegistry::builder(Arc::new(resolver))
        .config(config)
        .build()
        .unwrap();
    for module in chain(size) {
        registry.register_module(module);
    }
    registry
}

// ============================================================================
// 加载基准测试
// ============================================================================

/// 缓存命中的加载
fn cache_hit_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let registry = registry_with_chain(10);
    rt.block_on(async {
        registry.load_module("m9", false).await.unwrap();
    });

    c.bench_function("load_module_cache_hit", |b| {
        b.to_async(&rt).iter(|| async {
            registry.load_module(black_box("m9"), false).await
        });
    });
}

/// 强制重载整条依赖链末端的模块
fn forced_reload_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let registry = registry_with_chain(10);

    c.bench_function("load_module_forced", |b| {
        b.to_async(&rt).iter(|| async {
            registry.load_module(black_box("m9"), true).await
        });
    });
}

/// 并发加载同一模块
fn concurrent_load_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("concurrent_load");
    group.measurement_time(Duration::from_secs(10));

    for concurrency in [10, 50, 100].iter() {
        group.throughput(Throughput::Elements(*concurrency as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(concurrency),
            concurrency,
            |b, &concurrency| {
                b.to_async(&rt).iter(|| async {
                    let registry = registry_with_chain(20);
                    let mut handles = Vec::with_capacity(concurrency);
                    for _ in 0..concurrency {
                        let registry = registry.clone();
                        handles.push(tokio::spawn(async move {
                            registry.load_module("m19", false).await
                        }));
                    }
                    for handle in handles {
                        let _ = handle.await;
                    }
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// 依赖图基准测试
// ============================================================================

/// 不同规模依赖链的加载顺序计算
fn load_order_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("topological_order");

    for size in [10, 100, 1000].iter() {
        let modules = chain(*size);
        let graph = DependencyGraph::build(modules.iter());
        let root = format!("m{}", size - 1);

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| graph.topological_order(black_box(&root)));
        });
    }

    group.finish();
}

/// 循环检测
fn cycle_detection_benchmark(c: &mut Criterion) {
    let mut modules = chain(200);
    modules[0] = ModuleConfig::new("m0", "./m0").with_dependency("m199");
    let graph = DependencyGraph::build(modules.iter());

    c.bench_function("detect_cycles_200", |b| {
        b.iter(|| black_box(graph.detect_cycles()));
    });
}

criterion_group!(
    name = load_benches;
    config = Criterion::default().sample_size(100);
    targets = cache_hit_benchmark, forced_reload_benchmark
);

criterion_group!(
    name = concurrent_benches;
    config = Criterion::default().sample_size(50);
    targets = concurrent_load_benchmark
);

criterion_group!(
    name = graph_benches;
    config = Criterion::default().sample_size(100);
    targets = load_order_benchmark, cycle_detection_benchmark
);

criterion_main!(load_benches, concurrent_benches, graph_benches);
