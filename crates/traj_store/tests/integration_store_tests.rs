use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use traj_core::test_helpers::{multiply_run, xy_tree};
use traj_core::{values, ExplorationPlan, Payload, Value};
use traj_store::{merge_files, LoadMode, Record, StorageError, StorageService};

fn store_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(format!("{name}.jsonl"))
}

fn append_raw(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .expect("store file should exist");
    file.write_all(bytes).expect("raw append");
}

/// Stores the x/y tree and commits `runs` through `store_run`.
fn seeded_store(path: &Path, runs: &[usize]) -> StorageService {
    let tree = xy_tree("sweep");
    let store = StorageService::open(path).expect("open store");
    store.store_full(&tree).expect("store tree");
    for &run in runs {
        store
            .store_run(&multiply_run(&tree, run))
            .expect("store run");
    }
    store
}

#[test]
fn test_ledger_starts_empty_and_fills_up() {
    let dir = TempDir::new().expect("tempdir");
    let store = seeded_store(&store_path(&dir, "sweep"), &[]);
    assert!(store.list_completed_runs().expect("ledger").is_empty());

    let tree = xy_tree("sweep");
    for run in 0..tree.run_count() {
        store
            .store_run(&multiply_run(&tree, run))
            .expect("store run");
    }
    assert_eq!(
        store.list_completed_runs().expect("ledger"),
        (0..12).collect::<BTreeSet<_>>()
    );
}

#[test]
fn test_eager_round_trip_restores_tree() {
    let dir = TempDir::new().expect("tempdir");
    let path = store_path(&dir, "sweep");
    let mut tree = xy_tree("sweep");
    tree.add_parameter("solver.tolerance", 1e-6).expect("add tolerance");
    tree.add_result_value("summary.note", "baseline").expect("add note");
    for run in [0, 11] {
        tree.integrate_run(multiply_run(&tree, run)).expect("integrate");
    }
    StorageService::open(&path)
        .expect("open")
        .store_full(&tree)
        .expect("store");

    let loaded = StorageService::open(&path)
        .expect("reopen")
        .open_tree(LoadMode::Eager)
        .expect("load");

    assert_eq!(loaded.name(), "sweep");
    assert_eq!(loaded.run_count(), 12);
    assert_eq!(loaded.explored_parameters(), tree.explored_parameters());
    assert_eq!(loaded.exploration_fingerprint(), tree.exploration_fingerprint());
    assert_eq!(loaded.completed_runs(), tree.completed_runs());
    assert_eq!(loaded.run_value(0, "z", "z"), Some(&Value::from(6)));
    assert_eq!(loaded.run_value(11, "z", "z"), Some(&Value::from(32)));
    assert_eq!(
        loaded.parameter("tolerance").expect("tolerance").default_value(),
        &Value::from(1e-6)
    );
    assert_eq!(
        loaded.result("note").expect("note").value("note"),
        Some(&Value::from("baseline"))
    );
}

#[test]
fn test_store_full_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    let path = store_path(&dir, "sweep");
    let mut tree = xy_tree("sweep");
    tree.integrate_run(multiply_run(&tree, 3)).expect("integrate");

    let store = StorageService::open(&path).expect("open");
    store.store_full(&tree).expect("first store");
    store.store_full(&tree).expect("second store");

    let loaded = store.open_tree(LoadMode::Eager).expect("load");
    assert_eq!(loaded.len(), tree.len());
    assert_eq!(loaded.run_value(3, "z", "z"), Some(&Value::from(12)));
}

#[test]
fn test_concurrent_store_run_commits_every_run() {
    let dir = TempDir::new().expect("tempdir");
    let path = store_path(&dir, "sweep");
    let store = seeded_store(&path, &[]);
    let tree = xy_tree("sweep");

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let store = &store;
            let tree = &tree;
            scope.spawn(move || {
                for run in (worker..12).step_by(4) {
                    store
                        .store_run(&multiply_run(tree, run))
                        .expect("store run");
                }
            });
        }
    });

    assert_eq!(store.list_completed_runs().expect("ledger").len(), 12);
    drop(store);

    let loaded = StorageService::open(&path)
        .expect("reopen")
        .open_tree(LoadMode::Eager)
        .expect("load");
    for run in 0..12 {
        let binding = loaded.bindings(run).expect("binding");
        let expected = binding["x"].as_i64().expect("x") * binding["y"].as_i64().expect("y");
        assert_eq!(loaded.run_value(run, "z", "z"), Some(&Value::from(expected)));
    }
}

#[test]
fn test_crash_inside_run_leaves_it_out_of_ledger() {
    let dir = TempDir::new().expect("tempdir");
    let path = store_path(&dir, "sweep");
    let store = seeded_store(&path, &[0, 1, 2, 3, 4]);
    drop(store);

    // Run 5 began and wrote a result, then the process died mid-append.
    let tree = xy_tree("sweep");
    let output = multiply_run(&tree, 5);
    append_raw(&path, &Record::begin(5).encode().expect("encode"));
    append_raw(
        &path,
        &Record::Result {
            path: "z".to_string(),
            run: Some(5),
            items: output.results["z"].clone(),
        }
        .encode()
        .expect("encode"),
    );
    append_raw(&path, br#"{"kind":"commit","run":5,"dura"#);

    let store = StorageService::open(&path).expect("reopen repairs tail");
    assert_eq!(
        store.list_completed_runs().expect("ledger"),
        (0..5).collect::<BTreeSet<_>>()
    );
    assert_eq!(store.open_attempts().expect("attempts"), vec![5]);

    // The retry supersedes the stale attempt.
    store.store_run(&output).expect("retry run 5");
    assert!(store.list_completed_runs().expect("ledger").contains(&5));
    assert!(store.open_attempts().expect("attempts").is_empty());
}

#[test]
fn test_store_run_rejects_second_commit() {
    let dir = TempDir::new().expect("tempdir");
    let store = seeded_store(&store_path(&dir, "sweep"), &[2]);
    let tree = xy_tree("sweep");
    let error = store
        .store_run(&multiply_run(&tree, 2))
        .expect_err("run 2 is committed");
    assert!(matches!(error, StorageError::RunAlreadyCommitted(2)));
}

#[test]
fn test_lazy_load_resolves_on_demand() {
    let dir = TempDir::new().expect("tempdir");
    let path = store_path(&dir, "sweep");
    let store = seeded_store(&path, &[0, 7]);

    let mut tree = store.open_tree(LoadMode::Lazy).expect("lazy load");
    let result = tree.result("runs.run_00000007.z").expect("run 7 z");
    assert!(!result.is_fully_loaded());
    assert!(matches!(result.item("z"), Some(Payload::Unresolved(_))));

    let value = store
        .resolve(&mut tree, "runs.run_00000007.z", "z")
        .expect("resolve");
    assert_eq!(value, Value::from(21));
    assert_eq!(tree.run_value(7, "z", "z"), Some(&Value::from(21)));

    assert_eq!(store.resolve_all(&mut tree, "runs").expect("resolve rest"), 1);
    assert_eq!(tree.run_value(0, "z", "z"), Some(&Value::from(6)));
}

#[test]
fn test_foreign_placeholder_is_unresolved() {
    let dir = TempDir::new().expect("tempdir");
    let first = seeded_store(&store_path(&dir, "first"), &[1]);
    let second = seeded_store(&store_path(&dir, "second"), &[]);

    let mut tree = first.open_tree(LoadMode::Lazy).expect("lazy load");
    let error = second
        .resolve(&mut tree, "runs.run_00000001.z", "z")
        .expect_err("placeholder belongs to the first store");
    assert!(matches!(error, StorageError::Unresolved { .. }));
}

#[test]
fn test_partial_load_of_subtree() {
    let dir = TempDir::new().expect("tempdir");
    let path = store_path(&dir, "sweep");
    let mut tree = xy_tree("sweep");
    tree.add_parameter("solver.tolerance", 0.1).expect("add");
    tree.add_parameter("solver.steps", 10).expect("add");
    StorageService::open(&path)
        .expect("open")
        .store_full(&tree)
        .expect("store");

    let mut partial = traj_core::Tree::new("partial");
    StorageService::open(&path)
        .expect("reopen")
        .load(&mut partial, "solver", LoadMode::Eager)
        .expect("load solver");
    assert!(partial.contains("solver.steps"));
    assert!(!partial.contains("summary"));
    assert!(partial.contains("x"));
    assert!(partial.is_explored());
    assert_eq!(partial.run_count(), 12);
}

#[test]
fn test_expanded_exploration_is_persisted() {
    let dir = TempDir::new().expect("tempdir");
    let path = store_path(&dir, "sweep");
    let mut tree = xy_tree("sweep");
    let store = StorageService::open(&path).expect("open");
    store.store_full(&tree).expect("store");

    let extra = ExplorationPlan::parallel([("x", values([10])), ("y", values([10]))]).expect("plan");
    tree.expand(&extra).expect("expand");
    store.store_parameters(&tree).expect("store parameters");

    let stored = store
        .stored_exploration()
        .expect("read exploration")
        .expect("exploration present");
    assert_eq!(stored.run_count, 13);
    assert_eq!(Some(stored.fingerprint.clone()), tree.exploration_fingerprint());
    assert_eq!(stored.values_of("x").map(<[Value]>::len), Some(13));

    let tail = stored.tail(12).expect("one extra run");
    assert_eq!(tail.run_count(), 1);
    assert!(stored.tail(13).is_none());
}

#[test]
fn test_failures_are_recorded_without_touching_ledger() {
    let dir = TempDir::new().expect("tempdir");
    let store = seeded_store(&store_path(&dir, "sweep"), &[]);
    store.record_failure(4, "diverged").expect("record failure");

    assert!(store.list_completed_runs().expect("ledger").is_empty());
    assert_eq!(
        store.failures().expect("failures").get(&4).map(String::as_str),
        Some("diverged")
    );
}

#[test]
fn test_compact_keeps_live_records_only() {
    let dir = TempDir::new().expect("tempdir");
    let path = store_path(&dir, "sweep");
    let store = seeded_store(&path, &[0, 1]);
    let tree = xy_tree("sweep");
    store.store_full(&tree).expect("supersede structure");
    append_raw(&path, &Record::begin(9).encode().expect("encode"));
    drop(store);

    let store = StorageService::open(&path).expect("reopen");
    let stats = store.compact().expect("compact");
    assert!(stats.bytes_after < stats.bytes_before);
    assert!(store.open_attempts().expect("attempts").is_empty());

    let loaded = store.open_tree(LoadMode::Eager).expect("load");
    assert_eq!(loaded.completed_runs().len(), 2);
    assert_eq!(loaded.run_value(1, "z", "z"), Some(&Value::from(7)));
    assert_eq!(loaded.run_count(), 12);
}

#[test]
fn test_merge_files_concatenates_runs() {
    let dir = TempDir::new().expect("tempdir");
    let a = store_path(&dir, "a");
    let b = store_path(&dir, "b");
    let out = store_path(&dir, "merged");
    drop(seeded_store(&a, &[0, 1]));
    drop(seeded_store(&b, &[0]));

    let merged = merge_files(&a, &b, &out).expect("merge");
    assert_eq!(
        merged.list_completed_runs().expect("ledger"),
        BTreeSet::from([0, 1, 12])
    );
    let tree = merged.open_tree(LoadMode::Eager).expect("load");
    assert_eq!(tree.run_count(), 24);
    assert_eq!(tree.run_value(12, "z", "z"), Some(&Value::from(6)));

    assert!(merge_files(&a, &b, &out).is_err());
}

#[test]
fn test_non_finite_result_reloads() {
    let dir = TempDir::new().expect("tempdir");
    let path = store_path(&dir, "sweep");
    let store = seeded_store(&path, &[]);
    let tree = xy_tree("sweep");
    let mut view = tree.run_view(2).expect("run view");
    view.add_result_value("ratio", f64::NAN).expect("add ratio");
    view.add_result_value("limit", f64::NEG_INFINITY).expect("add limit");
    store.store_run(&view.into_output()).expect("store run");
    drop(store);

    let loaded = StorageService::open(&path)
        .expect("reopen")
        .open_tree(LoadMode::Eager)
        .expect("load");
    let ratio = loaded
        .run_value(2, "ratio", "ratio")
        .and_then(Value::as_f64)
        .expect("ratio");
    assert!(ratio.is_nan());
    assert_eq!(
        loaded.run_value(2, "limit", "limit"),
        Some(&Value::from(f64::NEG_INFINITY))
    );
}

#[test]
fn test_load_of_single_run_binds_its_exploration() {
    let dir = TempDir::new().expect("tempdir");
    let path = store_path(&dir, "sweep");
    let store = seeded_store(&path, &(0..12).collect::<Vec<_>>());

    let mut tree = traj_core::Tree::new("sweep");
    store
        .load(&mut tree, "runs.run_00000003", LoadMode::Eager)
        .expect("load run 3");
    assert_eq!(tree.run_count(), 12);
    assert!(tree.contains("runs.run_00000003.z"));
    assert_eq!(tree.run_value(3, "z", "z"), Some(&Value::from(12)));
    assert_eq!(tree.run_value(2, "z", "z"), None);
}

#[test]
fn test_load_of_missing_run_fails() {
    let dir = TempDir::new().expect("tempdir");
    let store = seeded_store(&store_path(&dir, "sweep"), &[0]);

    for subtree in ["runs.run_00000004", "runs.run_00000040"] {
        let mut tree = traj_core::Tree::new("sweep");
        assert!(store.load(&mut tree, subtree, LoadMode::Eager).is_err());
    }
}

#[test]
fn test_load_of_explored_parameter_restores_exploration() {
    let dir = TempDir::new().expect("tempdir");
    let store = seeded_store(&store_path(&dir, "sweep"), &[5]);

    let mut tree = traj_core::Tree::new("sweep");
    store.load(&mut tree, "x", LoadMode::Eager).expect("load x");
    assert!(tree.is_explored());
    assert_eq!(tree.run_count(), 12);
    assert!(tree.contains("y"));
    assert_eq!(tree.bindings(5).expect("bindings")["y"], Value::from(8));
}

#[test]
fn test_removed_nodes_stay_removed() {
    let dir = TempDir::new().expect("tempdir");
    let path = store_path(&dir, "sweep");
    let mut tree = xy_tree("sweep");
    tree.add_parameter("solver.tolerance", 0.1).expect("add tolerance");
    tree.add_result_value("summary.note", "baseline").expect("add note");
    let store = StorageService::open(&path).expect("open");
    store.store_full(&tree).expect("store");

    tree.remove("summary").expect("remove summary");
    tree.remove("solver").expect("remove solver");
    store.store_full(&tree).expect("store again");
    drop(store);

    let store = StorageService::open(&path).expect("reopen");
    let loaded = store.open_tree(LoadMode::Eager).expect("load");
    assert!(!loaded.contains("summary.note"));
    assert!(!loaded.contains("solver.tolerance"));
    assert!(!loaded.contains("solver"));
    assert_eq!(loaded.run_count(), 12);

    store.compact().expect("compact");
    let compacted = store.open_tree(LoadMode::Eager).expect("load compacted");
    assert!(!compacted.contains("summary"));
    assert!(!compacted.contains("solver"));
}
