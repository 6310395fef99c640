//! Performance benchmarks for the tcpsweep scanner

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;
use tcpsweep::{
    config::ScanConfig,
    output::{EventSink, ScanEvent},
    scanner::ScanCoordinator,
    utils::target_parser::AddressExpander,
};
use tokio::runtime::Runtime;

/// Discards every event
struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, event: &ScanEvent) {
        black_box(event);
    }
}

/// Benchmark CIDR expansion for growing block sizes
fn bench_address_expansion(c: &mut Criterion) {
    let mut group = c.benchmark_group("address_expansion");
    let expander = AddressExpander::new(1 << 20);

    for prefix in [24u8, 20, 16] {
        let spec = format!("10.0.0.0/{}", prefix);
        group.bench_with_input(BenchmarkId::from_parameter(&spec), &spec, |b, spec| {
            b.iter(|| black_box(expander.expand(&[spec.as_str()])))
        });
    }

    group.bench_function("mixed_specs", |b| {
        let specs = ["192.168.0.0/24", "10.1.2.3", "not-an-ip", "2001:db8::/120"];
        b.iter(|| black_box(expander.expand(&specs)))
    });

    group.finish();
}

/// Benchmark a full loopback sweep against closed ports
fn bench_loopback_sweep(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("loopback_sweep");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(10);

    // Port 9 (discard) is almost never served on loopback.
    for workers in [1usize, 8, 32] {
        let config = ScanConfig::new(vec![9], vec!["127.0.0.0/26".to_string()])
            .with_concurrency(workers)
            .with_timeout_secs(0.2);

        group.bench_with_input(BenchmarkId::from_parameter(workers), &config, |b, config| {
            b.to_async(&rt).iter(|| async {
                let coordinator = ScanCoordinator::new(config, Arc::new(NullSink)).unwrap();
                black_box(coordinator.run().await)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_address_expansion, bench_loopback_sweep);
criterion_main!(benches);
