//! Pipeline Benchmark
//!
//! Compares the two execution modes on a semi-join + SUM query:
//! - interpretation over growing relation sizes
//! - compilation plus native execution over the same sizes
//! - raw buffer growth, host side

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use duet_core::{
    BitsetTable, Catalog, ExecutionMode, Executor, ExecutorConfig, PodVec, QueryPlan, Relation,
    Selection,
};
use std::hint::black_box;

fn setup_catalog(rows: u64) -> Catalog {
    let keys = (0..rows).map(|i| (i * 7919) % (rows / 2 + 1)).collect();
    let values = (0..rows).collect();
    Catalog::new(vec![Relation::new(0, vec![keys, values]).unwrap()]).unwrap()
}

fn bench_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("semi_join_sum");

    for rows in [1_000u64, 100_000, 1_000_000] {
        let catalog = setup_catalog(rows);
        let members = BitsetTable::from_values((0..rows / 2).step_by(3), 1 << 32).unwrap();
        let plan = QueryPlan::new([0])
            .semi_join(Selection::new(0, 0), &members)
            .project(Selection::new(0, 1));

        for mode in [ExecutionMode::Interpret, ExecutionMode::Compile] {
            let mut executor = Executor::new(ExecutorConfig {
                mode,
                ..ExecutorConfig::default()
            });
            group.bench_with_input(BenchmarkId::new(mode.to_string(), rows), &plan, |b, plan| {
                b.iter(|| black_box(executor.execute(&catalog, plan).unwrap().result.amount()))
            });
        }
    }

    group.finish();
}

fn bench_buffer_growth(c: &mut Criterion) {
    c.bench_function("pod_vec_push_100k", |b| {
        b.iter(|| {
            let mut vec = PodVec::<u64>::new();
            for i in 0..100_000u64 {
                vec.push_back(black_box(i));
            }
            black_box(vec.len())
        })
    });
}

criterion_group!(benches, bench_modes, bench_buffer_growth);
criterion_main!(benches);
