use std::sync::Arc;

use super::Combination;
use crate::value::Value;

/// Predicate over one run's bindings; `false` discards the combination.
pub type Constraint = Arc<dyn Fn(&Combination) -> bool + Send + Sync>;

/// Returns false for combinations rejected by any constraint.
pub(super) fn is_valid_combination(
    constraints: &[Constraint],
    axes: &[(String, Vec<Value>)],
    row: &[Value],
) -> bool {
    if constraints.is_empty() {
        return true;
    }
    let combination: Combination = axes
        .iter()
        .map(|(path, _)| path.clone())
        .zip(row.iter().cloned())
        .collect();
    constraints.iter().all(|constraint| constraint(&combination))
}
