//! Exploration framework: turning candidate values into an ordered run sequence.
//!
//! An [`ExplorationPlan`] holds one equal-length value list per explored
//! parameter; entry `i` of every list is the binding of run `i`. Plans are
//! built from a cartesian product, from pre-built parallel lists, from a list
//! of per-run binding maps, or through a [`ParameterSpace`] (grid search with
//! constraints, or seeded random sampling).
//!
//! # Run ordering
//!
//! Cartesian products vary the **last declared axis fastest**. For axes
//! `x = [1, 2]` and `y = [6, 7, 8]` the runs are `(1,6) (1,7) (1,8) (2,6) ...`.
//! Resume and merge identify runs by index, so this order is fixed.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::ExplorationError;
use crate::value::Value;

#[path = "exploration/combinations.rs"]
mod combinations;
#[path = "exploration/constraints.rs"]
mod constraints;
#[path = "exploration/fingerprint.rs"]
mod fingerprint;
#[path = "exploration/sampling.rs"]
mod sampling;

pub use constraints::Constraint;
pub use fingerprint::{exploration_fingerprint, stable_json};

/// One run's bindings, keyed by parameter path.
pub type Combination = BTreeMap<String, Value>;

/// Parallel per-parameter value lists of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplorationPlan {
    axes: Vec<(String, Vec<Value>)>,
    run_count: usize,
}

impl ExplorationPlan {
    /// Cartesian product of the candidate lists, last axis varying fastest.
    pub fn cartesian<P: Into<String>>(
        axes: impl IntoIterator<Item = (P, Vec<Value>)>,
    ) -> Result<Self, ExplorationError> {
        let axes = collect_axes(axes)?;
        let rows = combinations::cartesian_rows(&axes);
        let paths = axes.into_iter().map(|(path, _)| path).collect();
        Self::from_rows(paths, rows)
    }

    /// Pre-built lists for custom, non-cartesian designs.
    pub fn parallel<P: Into<String>>(
        axes: impl IntoIterator<Item = (P, Vec<Value>)>,
    ) -> Result<Self, ExplorationError> {
        let axes = collect_axes(axes)?;
        let expected = axes[0].1.len();
        for (path, values) in &axes {
            if values.len() != expected {
                return Err(ExplorationError::LengthMismatch {
                    path: path.clone(),
                    expected,
                    actual: values.len(),
                });
            }
        }
        if expected == 0 {
            return Err(ExplorationError::Empty);
        }
        Ok(Self {
            axes,
            run_count: expected,
        })
    }

    /// One binding map per run; every run must bind the same parameters.
    ///
    /// Axes are ordered by parameter path.
    pub fn custom(runs: Vec<Combination>) -> Result<Self, ExplorationError> {
        let Some(first) = runs.first() else {
            return Err(ExplorationError::Empty);
        };
        let paths: Vec<String> = first.keys().cloned().collect();
        if paths.is_empty() {
            return Err(ExplorationError::Empty);
        }

        let mut rows = Vec::with_capacity(runs.len());
        for run in runs {
            if !run.keys().eq(paths.iter()) {
                return Err(ExplorationError::ParameterSetMismatch {
                    expected: paths,
                    actual: run.keys().cloned().collect(),
                });
            }
            rows.push(run.into_values().collect());
        }
        Self::from_rows(paths, rows)
    }

    /// Transposes row-major combinations into per-parameter lists.
    pub(crate) fn from_rows(
        paths: Vec<String>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self, ExplorationError> {
        if paths.is_empty() || rows.is_empty() {
            return Err(ExplorationError::Empty);
        }
        let run_count = rows.len();
        let mut columns: Vec<Vec<Value>> = paths
            .iter()
            .map(|_| Vec::with_capacity(run_count))
            .collect();
        for row in rows {
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
        }
        Ok(Self {
            axes: paths.into_iter().zip(columns).collect(),
            run_count,
        })
    }

    pub fn axes(&self) -> &[(String, Vec<Value>)] {
        &self.axes
    }

    pub fn run_count(&self) -> usize {
        self.run_count
    }

    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.axes.iter().map(|(path, _)| path.as_str())
    }

    pub fn values_of(&self, path: &str) -> Option<&[Value]> {
        self.axes
            .iter()
            .find(|(axis, _)| axis == path)
            .map(|(_, values)| values.as_slice())
    }

    pub fn binding(&self, run: usize) -> Option<Combination> {
        if run >= self.run_count {
            return None;
        }
        Some(
            self.axes
                .iter()
                .map(|(path, values)| (path.clone(), values[run].clone()))
                .collect(),
        )
    }

    /// Stable digest of the axes, see [`exploration_fingerprint`].
    pub fn fingerprint(&self) -> String {
        exploration_fingerprint(
            self.axes
                .iter()
                .map(|(path, values)| (path.as_str(), values.as_slice())),
        )
    }
}

fn collect_axes<P: Into<String>>(
    axes: impl IntoIterator<Item = (P, Vec<Value>)>,
) -> Result<Vec<(String, Vec<Value>)>, ExplorationError> {
    let axes: Vec<(String, Vec<Value>)> = axes
        .into_iter()
        .map(|(path, values)| (path.into(), values))
        .collect();
    if axes.is_empty() {
        return Err(ExplorationError::Empty);
    }
    let mut seen = HashSet::new();
    for (path, _) in &axes {
        if !seen.insert(path.as_str()) {
            return Err(ExplorationError::DuplicateAxis(path.clone()));
        }
    }
    Ok(axes)
}

/// Defines a parameter space for exploration.
///
/// Supports grid search (cartesian product) and random sampling strategies.
/// Constraints discard combinations before they become runs.
#[derive(Clone, Default)]
pub struct ParameterSpace {
    axes: Vec<(String, Vec<Value>)>,
    constraints: Vec<Constraint>,
}

impl ParameterSpace {
    /// Create an empty grid.
    pub fn grid() -> Self {
        Self::default()
    }

    /// Add candidate values for one parameter. Re-declaring a path replaces its values.
    pub fn axis(mut self, path: impl Into<String>, values: Vec<Value>) -> Self {
        let path = path.into();
        match self.axes.iter_mut().find(|(axis, _)| *axis == path) {
            Some((_, existing)) => *existing = values,
            None => self.axes.push((path, values)),
        }
        self
    }

    /// Keep only combinations for which `predicate` returns true.
    pub fn constraint<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Combination) -> bool + Send + Sync + 'static,
    {
        self.constraints.push(Arc::new(predicate));
        self
    }

    pub fn paths(&self) -> Vec<String> {
        self.axes.iter().map(|(path, _)| path.clone()).collect()
    }

    /// Number of unconstrained combinations.
    pub fn size(&self) -> usize {
        self.axes
            .iter()
            .fold(1usize, |total, (_, values)| total.saturating_mul(values.len()))
    }

    /// Generate all valid combinations (cartesian product minus constrained ones).
    pub fn generate(&self) -> Result<ExplorationPlan, ExplorationError> {
        let axes = collect_axes(self.axes.clone())?;
        let rows = combinations::cartesian_rows(&axes)
            .into_iter()
            .filter(|row| constraints::is_valid_combination(&self.constraints, &axes, row))
            .collect();
        ExplorationPlan::from_rows(self.paths(), rows)
    }
}

impl fmt::Debug for ParameterSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterSpace")
            .field("axes", &self.axes)
            .field("constraints", &self.constraints.len())
            .finish()
    }
}
