//! Store throughput benchmarks for traj_store using Criterion.rs.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use tempfile::TempDir;
use traj_core::test_helpers::multiply_run;
use traj_core::{values, ExplorationPlan, Tree};
use traj_store::{LoadMode, StorageService};

fn swept_tree(runs: usize) -> Tree {
    let mut tree = Tree::new("bench");
    tree.add_parameter("x", 1).expect("add x");
    tree.add_parameter("y", 1).expect("add y");
    let xs = values((0..runs).map(|run| run as i64));
    let ys = values((0..runs).map(|run| (run % 7) as i64));
    tree.explore(&ExplorationPlan::parallel([("x", xs), ("y", ys)]).expect("plan"))
        .expect("explore");
    tree
}

fn bench_store_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_run");
    group.sample_size(10);
    for runs in [100usize, 1_000] {
        let tree = swept_tree(runs);
        let outputs: Vec<_> = (0..runs).map(|run| multiply_run(&tree, run)).collect();
        group.bench_with_input(BenchmarkId::new("commit_all", runs), &outputs, |b, outputs| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().expect("tempdir");
                    let store = StorageService::open(dir.path().join("bench.jsonl")).expect("open");
                    store.store_full(&tree).expect("store tree");
                    (dir, store)
                },
                |(_dir, store)| {
                    for output in outputs {
                        store.store_run(output).expect("store run");
                    }
                },
                BatchSize::PerIteration,
            );
        });
    }
    group.finish();
}

fn bench_open(c: &mut Criterion) {
    let runs = 2_000;
    let tree = swept_tree(runs);
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("bench.jsonl");
    {
        let store = StorageService::open(&path).expect("open");
        store.store_full(&tree).expect("store tree");
        for run in 0..runs {
            store.store_run(&multiply_run(&tree, run)).expect("store run");
        }
    }

    let mut group = c.benchmark_group("open");
    group.sample_size(10);
    group.bench_function("scan_ledger", |b| {
        b.iter(|| {
            let store = StorageService::open(&path).expect("open");
            black_box(store.list_completed_runs().expect("ledger").len());
        });
    });
    for mode in [LoadMode::Lazy, LoadMode::Eager] {
        group.bench_function(BenchmarkId::new("open_tree", format!("{mode:?}")), |b| {
            b.iter(|| {
                let store = StorageService::open(&path).expect("open");
                black_box(store.open_tree(mode).expect("load").len());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_store_run, bench_open);
criterion_main!(benches);
