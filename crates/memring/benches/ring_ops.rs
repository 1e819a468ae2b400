//! Throughput benchmarks for the core ring operations.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use memring_rs::{Ring, RingConfig, BULK_CONFIG};

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    for &count in &[100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("bare", count), &count, |b, &count| {
            b.iter(|| {
                let ring: Ring<u64> = Ring::new(&BULK_CONFIG);
                for i in 0..count {
                    ring.add_value(black_box(i as u64), 0, "").unwrap();
                }
                ring.len()
            });
        });
        group.bench_with_input(BenchmarkId::new("mapped", count), &count, |b, &count| {
            b.iter(|| {
                let ring: Ring<u64> = Ring::new(&RingConfig::new(true, true).without_tracking());
                for i in 0..count {
                    ring.add_value(black_box(i as u64), 0, "").unwrap();
                }
                ring.len()
            });
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup_by_id");
    let count = 1_000usize;

    let mapped: Ring<u64> = Ring::new(&RingConfig::new(true, false).without_tracking());
    let bare: Ring<u64> = Ring::new(&BULK_CONFIG);
    for i in 0..count {
        mapped.add_value(i as u64, i as u32 + 1, "").unwrap();
        bare.add_value(i as u64, i as u32 + 1, "").unwrap();
    }

    group.bench_function("with_id_map", |b| {
        b.iter(|| mapped.get_by_id(black_box(777)).unwrap());
    });
    group.bench_function("chain_walk", |b| {
        b.iter(|| bare.get_by_id(black_box(777)).unwrap());
    });
    group.finish();
}

fn bench_sorted_insert(c: &mut Criterion) {
    c.bench_function("insert_sorted_1000", |b| {
        // a fixed pseudo-random sequence keeps runs comparable
        let mut state = 0x9e3779b9u64;
        let values: Vec<u64> = (0..1_000)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                state >> 40
            })
            .collect();
        b.iter(|| {
            let ring: Ring<u64> = Ring::new(&BULK_CONFIG);
            for &v in &values {
                ring.insert_sorted_value(black_box(v), 0, "", true).unwrap();
            }
            ring.len()
        });
    });
}

criterion_group!(benches, bench_append, bench_lookup, bench_sorted_insert);
criterion_main!(benches);
