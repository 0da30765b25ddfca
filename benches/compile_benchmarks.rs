//! Compile throughput benchmarks: join chains, aggregation and batches.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sql2ddlog::ast::builders::*;
use sql2ddlog::ast::ViewDefinition;
use sql2ddlog::schema::{ColumnSchema, DataType};
use sql2ddlog::{compile_batch, compile_view_to_string, Catalog, Config, TableSchema};
use std::hint::black_box;

fn make_catalog(tables: usize) -> Catalog {
    Catalog::from_tables((0..tables).map(|i| {
        TableSchema::new(
            &format!("t{i}"),
            vec![
                ColumnSchema::new("id", DataType::BigInt, false),
                ColumnSchema::new("name", DataType::Varchar, true),
                ColumnSchema::new("amount", DataType::Integer, true),
            ],
        )
    }))
    .unwrap()
}

fn join_chain(tables: usize) -> ViewDefinition {
    let mut from = table("t0");
    for i in 1..tables {
        from = from.join(
            table(&format!("t{i}")),
            qcol(&format!("t{}", i - 1), "id").eq(qcol(&format!("t{i}"), "id")),
        );
    }
    QueryBuilder::new().select_all().from(from).view("v0")
}

fn grouped(i: usize) -> ViewDefinition {
    QueryBuilder::new()
        .select(col("name"))
        .select_as(sum(col("amount")), "total")
        .select_as(count_star(), "n")
        .from(table(&format!("t{i}")))
        .filter(col("id").gt(lit_int(10)))
        .group_by(col("name"))
        .view(&format!("g{i}"))
}

fn bench_join_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_chain");
    for tables in [2usize, 4, 8] {
        let catalog = make_catalog(tables);
        let view = join_chain(tables);
        let config = Config::default();
        group.bench_with_input(BenchmarkId::from_parameter(tables), &tables, |b, _| {
            b.iter(|| compile_view_to_string(black_box(&catalog), &config, black_box(&view)));
        });
    }
    group.finish();
}

fn bench_aggregation(c: &mut Criterion) {
    let catalog = make_catalog(1);
    let view = grouped(0);
    let config = Config::default();
    c.bench_function("aggregation", |b| {
        b.iter(|| compile_view_to_string(black_box(&catalog), &config, black_box(&view)));
    });
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    let catalog = make_catalog(16);
    let views: Vec<ViewDefinition> = (0..16).map(grouped).collect();
    for parallel in [false, true] {
        let mut config = Config::default();
        config.batch.parallel = parallel;
        let label = if parallel { "parallel" } else { "sequential" };
        group.bench_with_input(BenchmarkId::from_parameter(label), &config, |b, config| {
            b.iter(|| compile_batch(black_box(&catalog), config, black_box(&views)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_join_chain, bench_aggregation, bench_batch);
criterion_main!(benches);
