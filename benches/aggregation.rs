//! Performance benchmarks for classification and N-way aggregation.
//!
//! Run with: `cargo bench --bench aggregation`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | Pairwise classify | <5ms | 10k records per side |
//! | N-way aggregate | Linear in snapshots | Dedup via identity hash set |
//! | Full assemble | <50ms | 12 snapshots × 1k records |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use deck_diff_kernel::{
    aggregate, classify, index, CompareRule, ComparatorRegistry, ComparisonPolicy, Record,
    ResponseAssembler, SnapshotResult,
};

fn rule() -> CompareRule {
    CompareRule {
        key_fields: vec!["code".to_string()],
        value_fields: vec!["capacity_mw".to_string()],
        ..CompareRule::default()
    }
}

/// Records where roughly one in ten keys shifts per generation and one in
/// twenty is replaced.
fn make_records(generation: u64, count: u64) -> Vec<serde_json::Value> {
    (0..count)
        .map(|i| {
            let code = if i % 20 == generation % 20 { i + 1_000_000 * generation } else { i };
            let capacity = if i % 10 == generation % 10 {
                100.0 + generation as f64
            } else {
                100.0
            };
            json!({"code": code, "capacity_mw": capacity})
        })
        .collect()
}

fn make_snapshot(generation: u64, count: u64) -> SnapshotResult {
    let id = format!("NW2024{:02}", generation + 1);
    SnapshotResult::ok(id, format!("Deck {}", generation), BTreeMap::new())
        .with_field("plants", serde_json::Value::Array(make_records(generation, count)))
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    let rule = rule();
    let policy = ComparisonPolicy::default();

    for count in [100u64, 1_000, 10_000] {
        let before: Vec<Record> = make_snapshot(0, count).records("plants");
        let after: Vec<Record> = make_snapshot(1, count).records("plants");
        let before = index(before, |r| rule.key_of(r));
        let after = index(after, |r| rule.key_of(r));

        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(classify(&before, &after, &rule, &policy)))
        });
    }
    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    let rule = rule();
    let policy = ComparisonPolicy::default();

    for snapshots in [2u64, 4, 12] {
        let decks: Vec<SnapshotResult> = (0..snapshots).map(|g| make_snapshot(g, 1_000)).collect();
        let ordered: Vec<&SnapshotResult> = decks.iter().collect();

        group.throughput(Throughput::Elements(snapshots * 1_000));
        group.bench_with_input(BenchmarkId::new("snapshots", snapshots), &ordered, |b, ordered| {
            b.iter(|| black_box(aggregate(ordered, "plants", &rule, &policy)))
        });
    }
    group.finish();
}

fn bench_assemble(c: &mut Criterion) {
    let assembler = ResponseAssembler::new(
        Arc::new(ComparatorRegistry::with_defaults()),
        ComparisonPolicy::default(),
    );
    let decks: Vec<SnapshotResult> = (0..12).map(|g| make_snapshot(g, 1_000)).collect();

    c.bench_function("assemble_12x1000", |b| {
        b.iter(|| black_box(assembler.assemble("plant_capacity", &decks, false)))
    });
}

criterion_group!(benches, bench_classify, bench_aggregate, bench_assemble);
criterion_main!(benches);
