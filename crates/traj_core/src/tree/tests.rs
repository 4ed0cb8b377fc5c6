use super::*;
use crate::error::Error;
use crate::test_helpers::{grouped_tree, multiply_run, xy_tree, xy_tree_unexplored};
use crate::value::values;

#[test]
fn test_shorthand_ambiguity_and_full_path() {
    let tree = grouped_tree();

    let error = tree.get("x").expect_err("x is ambiguous");
    assert_eq!(
        error,
        Error::Structural(StructuralError::Ambiguous {
            shorthand: "x".to_string(),
            candidates: vec!["group1.x".to_string(), "group2.x".to_string()],
        })
    );

    let x = tree.parameter("group1.x").expect("full path resolves");
    assert_eq!(x.default_value(), &Value::from(1));
    assert_eq!(tree.get("y").expect("unique leaf").path(), "group2.y");
    assert_eq!(tree.get("group2").expect("group").path(), "group2");
}

#[test]
fn test_add_creates_intermediate_groups_in_order() {
    let mut tree = Tree::new("t");
    tree.add_parameter("sim.physics.dt", 0.1).expect("add dt");
    tree.add_parameter("sim.steps", 100).expect("add steps");
    tree.add_result_value("summary.note", "ok").expect("add note");

    let paths: Vec<&str> = tree.nodes().into_iter().map(|(path, _)| path).collect();
    assert_eq!(
        paths,
        vec![
            "sim",
            "sim.physics",
            "sim.physics.dt",
            "sim.steps",
            "summary",
            "summary.note"
        ]
    );
    assert_eq!(tree.index().len(), tree.len());
    assert_eq!(
        tree.result("note").expect("note").value("note"),
        Some(&Value::from("ok"))
    );
}

#[test]
fn test_add_rejects_duplicates_reserved_and_non_groups() {
    let mut tree = Tree::new("t");
    tree.add_parameter("a", 1).expect("add a");

    assert_eq!(
        tree.add_parameter("a", 2),
        Err(StructuralError::DuplicatePath("a".to_string()).into())
    );
    assert_eq!(
        tree.add_parameter("a.b", 2),
        Err(StructuralError::NotAGroup("a".to_string()).into())
    );
    assert_eq!(
        tree.add_group("runs.extra"),
        Err(StructuralError::ReservedName("runs.extra".to_string()).into())
    );
    assert!(matches!(
        tree.add_group("bad..name"),
        Err(Error::Structural(StructuralError::InvalidName { .. }))
    ));
}

#[test]
fn test_wrong_node_type_is_reported() {
    let tree = grouped_tree();
    assert_eq!(
        tree.result("group1.x"),
        Err(StructuralError::WrongNodeType {
            path: "group1.x".to_string(),
            expected: "result",
            actual: "parameter",
        }
        .into())
    );
}

#[test]
fn test_remove_subtree_updates_index() {
    let mut tree = grouped_tree();
    tree.remove("group2").expect("remove group2");

    assert!(!tree.contains("group2.x"));
    assert_eq!(tree.get("x").expect("x now unique").path(), "group1.x");
    assert_eq!(
        tree.remove("group2"),
        Err(StructuralError::NotFound("group2".to_string()).into())
    );
    assert_eq!(tree.remove(""), Err(StructuralError::RootRemoval.into()));

    let rebuilt = PathIndex::rebuild(tree.nodes().into_iter().map(|(path, _)| path));
    assert_eq!(tree.index(), &rebuilt);
}

#[test]
fn test_remove_rejects_explored_parameter() {
    let mut tree = xy_tree("t");
    assert_eq!(
        tree.remove("x"),
        Err(StructuralError::ExploredParameter("x".to_string()).into())
    );
}

#[test]
fn test_explore_binds_cartesian_runs() {
    let tree = xy_tree("t");

    assert_eq!(tree.run_count(), 12);
    assert_eq!(tree.explored_parameters(), ["x".to_string(), "y".to_string()]);

    let first = tree.bindings(0).expect("run 0");
    assert_eq!(first["x"], Value::from(1));
    assert_eq!(first["y"], Value::from(6));
    let last = tree.bindings(11).expect("run 11");
    assert_eq!(last["x"], Value::from(4));
    assert_eq!(last["y"], Value::from(8));

    assert_eq!(
        tree.bindings(12),
        Err(StructuralError::RunOutOfRange {
            run: 12,
            run_count: 12
        }
        .into())
    );
}

#[test]
fn test_explore_errors() {
    let mut tree = xy_tree_unexplored("t");

    let wrong_type = ExplorationPlan::parallel([("x", values([1.5, 2.5]))]).expect("plan");
    assert_eq!(
        tree.explore(&wrong_type),
        Err(ExplorationError::TypeMismatch {
            path: "x".to_string(),
            index: 0,
            expected: "int".to_string(),
            actual: "float".to_string(),
        }
        .into())
    );

    let unknown = ExplorationPlan::parallel([("w", values([1]))]).expect("plan");
    assert_eq!(
        tree.explore(&unknown),
        Err(ExplorationError::UnknownParameter("w".to_string()).into())
    );

    let plan = ExplorationPlan::parallel([("x", values([1, 2]))]).expect("plan");
    tree.explore(&plan).expect("first exploration");
    assert_eq!(
        tree.explore(&plan),
        Err(ExplorationError::AlreadyExplored.into())
    );
}

#[test]
fn test_explore_resolves_shorthand_axes() {
    let mut tree = grouped_tree();
    let plan = ExplorationPlan::cartesian([("y", values([0.1, 0.2]))]).expect("plan");
    tree.explore(&plan).expect("explore y");
    assert_eq!(tree.explored_parameters(), ["group2.y".to_string()]);
}

#[test]
fn test_expand_appends_runs() {
    let mut tree = xy_tree("t");
    let extra = ExplorationPlan::parallel([("y", values([9])), ("x", values([5]))]).expect("plan");
    tree.expand(&extra).expect("expand");

    assert_eq!(tree.run_count(), 13);
    let added = tree.bindings(12).expect("run 12");
    assert_eq!(added["x"], Value::from(5));
    assert_eq!(added["y"], Value::from(9));

    let partial = ExplorationPlan::parallel([("x", values([6]))]).expect("plan");
    assert!(matches!(
        tree.expand(&partial),
        Err(Error::Exploration(ExplorationError::ParameterSetMismatch { .. }))
    ));
}

#[test]
fn test_find_runs_by_predicate() {
    let tree = xy_tree("t");
    let runs = tree.find_runs(|binding| {
        binding["x"].as_i64() == Some(2) && binding["y"].as_i64().unwrap_or(0) >= 7
    });
    assert_eq!(runs, vec![4, 5]);
}

#[test]
fn test_run_view_binds_explored_values() {
    let mut tree = xy_tree_unexplored("t");
    tree.add_parameter("scale", 2.0).expect("add scale");
    tree.explore(&crate::test_helpers::xy_plan()).expect("explore");

    let view = tree.run_view(4).expect("view");
    assert_eq!(view.run_name(), "run_00000004");
    assert_eq!(view.parameter("x").expect("x"), &Value::from(2));
    assert_eq!(view.parameter("y").expect("y"), &Value::from(7));
    assert_eq!(view.parameter_f64("scale").expect("scale"), 2.0);
    assert!(view.is_explored("x"));
    assert!(!view.is_explored("scale"));
    assert_eq!(view.bindings().len(), 2);
}

#[test]
fn test_integrate_run_isolates_results() {
    let mut tree = xy_tree("t");
    tree.integrate_run(multiply_run(&tree, 0)).expect("integrate 0");
    tree.integrate_run(multiply_run(&tree, 11)).expect("integrate 11");

    assert_eq!(tree.run_value(0, "z", "z"), Some(&Value::from(6)));
    assert_eq!(tree.run_value(11, "z", "z"), Some(&Value::from(32)));
    assert_eq!(tree.completed_runs().iter().copied().collect::<Vec<_>>(), vec![0, 11]);

    // Run-scoped lookup only sees the owning run.
    let in_zero = tree.get_in_run(0, "z").expect("z of run 0");
    assert_eq!(in_zero.path(), "runs.run_00000000.z");
    assert!(tree.get("z").is_err());

    let results = tree.run_results(11);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "z");
    assert_eq!(results[0].1.run(), Some(11));

    assert_eq!(
        tree.integrate_run(multiply_run(&tree, 0)),
        Err(StructuralError::RunAlreadyCompleted(0).into())
    );
}

#[test]
fn test_run_view_rejects_conflicting_results() {
    let tree = xy_tree("t");
    let mut view = tree.run_view(0).expect("view");
    view.add_result_value("stats.mean", 1.0).expect("add mean");

    assert_eq!(
        view.add_result_value("stats.mean", 2.0),
        Err(StructuralError::DuplicatePath("stats.mean".to_string()).into())
    );
    assert!(view.add_result_value("stats.mean.inner", 2.0).is_err());
    assert!(view.add_result_value("runs.z", 2.0).is_err());
    view.add_result("stats.spread", [("min", 0.5), ("max", 1.5)])
        .expect("add spread");

    let output = view.into_output();
    assert_eq!(output.value("stats.spread", "max"), Some(&Value::from(1.5)));
}

#[test]
fn test_restore_round_trip_preserves_exploration() {
    let source = xy_tree("t");
    let mut restored = Tree::new("t");
    for (path, parameter) in source.parameters() {
        restored
            .restore_parameter(
                path,
                parameter.default_value().clone(),
                parameter.explored().map(<[Value]>::to_vec),
            )
            .expect("restore parameter");
    }
    restored
        .restore_exploration(source.explored_parameters().to_vec(), source.run_count())
        .expect("restore exploration");

    assert_eq!(restored.bindings(7), source.bindings(7));
    assert_eq!(
        restored.exploration_fingerprint(),
        source.exploration_fingerprint()
    );
    assert_eq!(
        restored.restore_exploration(vec!["x".to_string()], 3),
        Err(ExplorationError::LengthMismatch {
            path: "x".to_string(),
            expected: 3,
            actual: 12,
        }
        .into())
    );
}
