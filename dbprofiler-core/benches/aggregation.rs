//! Benchmarks for client-side aggregation on the bulk path
//!
//! Run with: cargo bench -p dbprofiler-core

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use dbprofiler_core::strategy::{column_cells, distinct_and_nulls, frequency_map};
use std::hint::black_box;

/// Rows of three text columns: low cardinality, high cardinality, sparse.
fn generate_rows(count: usize) -> Vec<Vec<Option<String>>> {
    const STATUSES: [&str; 4] = ["new", "paid", "shipped", "cancelled"];
    (0..count)
        .map(|i| {
            vec![
                Some(STATUSES[i % 4].to_string()),
                Some(format!("customer-{}", i)),
                (i % 3 == 0).then(|| format!("note {}", i % 17)),
            ]
        })
        .collect()
}

fn bench_distinct_and_nulls(c: &mut Criterion) {
    let mut group = c.benchmark_group("distinct_and_nulls");

    for count in [1_000, 10_000, 100_000] {
        let rows = generate_rows(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("three_columns", count), &rows, |b, rows| {
            b.iter(|| {
                for index in 0..3 {
                    black_box(distinct_and_nulls(column_cells(rows, index)));
                }
            });
        });
    }

    group.finish();
}

fn bench_frequency_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("frequency_map");

    for count in [1_000, 10_000, 100_000] {
        let rows = generate_rows(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("low_cardinality", count), &rows, |b, rows| {
            b.iter(|| black_box(frequency_map(column_cells(rows, 0))));
        });
        group.bench_with_input(BenchmarkId::new("sparse", count), &rows, |b, rows| {
            b.iter(|| black_box(frequency_map(column_cells(rows, 2))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_distinct_and_nulls, bench_frequency_map);
criterion_main!(benches);
