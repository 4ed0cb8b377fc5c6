//! Path resolution benchmarks for traj_core using Criterion.rs.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use traj_core::tree::Tree;

fn wide_tree(groups: usize, leaves: usize) -> Tree {
    let mut tree = Tree::new("bench");
    for group in 0..groups {
        for leaf in 0..leaves {
            tree.add_parameter(&format!("group{group}.sub.p{leaf}"), leaf as i64)
                .expect("add parameter");
        }
    }
    tree
}

fn bench_resolution(c: &mut Criterion) {
    let sizes = vec![("small", 10, 10), ("medium", 100, 50), ("large", 500, 100)];

    let mut group = c.benchmark_group("path_resolution");
    for (name, groups, leaves) in sizes {
        let tree = wide_tree(groups, leaves);
        let full = format!("group{}.sub.p{}", groups / 2, leaves / 2);
        let shorthand = format!("group{}.sub.p{}", groups - 1, leaves - 1)
            .split_once('.')
            .map(|(_, rest)| rest.to_string())
            .unwrap_or_default();

        group.bench_with_input(BenchmarkId::new("full_path", name), &full, |b, path| {
            b.iter(|| black_box(tree.get(path).is_ok()));
        });
        // Ambiguous across every group: exercises the whole leaf bucket.
        group.bench_with_input(BenchmarkId::new("ambiguous_shorthand", name), &shorthand, |b, path| {
            b.iter(|| black_box(tree.get(path).is_err()));
        });
    }
    group.finish();
}

fn bench_rebuild_index(c: &mut Criterion) {
    let mut tree = wide_tree(100, 50);
    c.bench_function("rebuild_index_5000", |b| {
        b.iter(|| {
            tree.rebuild_index();
            black_box(tree.index().len());
        });
    });
}

criterion_group!(benches, bench_resolution, bench_rebuild_index);
criterion_main!(benches);
