//! Test helpers for common tree setups.
//!
//! Shared by the unit tests here and by the store and runner test suites.

use crate::exploration::ExplorationPlan;
use crate::tree::{RunOutput, Tree};
use crate::value::values;

/// `x ∈ {1,2,3,4}` times `y ∈ {6,7,8}`, last axis fastest.
///
/// # Panics
///
/// Panics if the hard-coded axes are rejected (should never happen).
pub fn xy_plan() -> ExplorationPlan {
    ExplorationPlan::cartesian([("x", values([1, 2, 3, 4])), ("y", values([6, 7, 8]))])
        .expect("x/y axes should form a valid plan")
}

/// Tree with integer parameters `x` and `y`, unexplored.
///
/// # Panics
///
/// Panics if the parameters cannot be added (should never happen).
pub fn xy_tree_unexplored(name: &str) -> Tree {
    let mut tree = Tree::new(name);
    tree.add_parameter("x", 1).expect("add x");
    tree.add_parameter("y", 1).expect("add y");
    tree
}

/// Tree with `x` and `y` explored over [`xy_plan`]: 12 runs.
///
/// # Panics
///
/// Panics if exploration fails (should never happen).
pub fn xy_tree(name: &str) -> Tree {
    let mut tree = xy_tree_unexplored(name);
    tree.explore(&xy_plan()).expect("explore x/y");
    tree
}

/// Tree with `group1.x`, `group2.x` and `group2.y`, for shorthand resolution.
///
/// # Panics
///
/// Panics if the parameters cannot be added (should never happen).
pub fn grouped_tree() -> Tree {
    let mut tree = Tree::new("grouped");
    tree.add_parameter("group1.x", 1).expect("add group1.x");
    tree.add_parameter("group2.x", 2).expect("add group2.x");
    tree.add_parameter("group2.y", 0.5).expect("add group2.y");
    tree
}

/// Runs `z = x * y` for run `run` of an x/y tree.
///
/// # Panics
///
/// Panics if the run view cannot be built or `x`/`y` are missing.
pub fn multiply_run(tree: &Tree, run: usize) -> RunOutput {
    let mut view = tree.run_view(run).expect("run view");
    let x = view.parameter("x").expect("x").as_i64().expect("x is an int");
    let y = view.parameter("y").expect("y").as_i64().expect("y is an int");
    view.add_result_value("z", x * y).expect("add z");
    view.into_output()
}
