use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, StructuralError};
use crate::exploration::Combination;
use crate::naming::{self, is_within, leaf_of, reject_reserved, validate_path};
use crate::path_index::PathIndex;
use crate::value::Value;

/// Everything a worker needs to execute one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInput {
    pub run: usize,
    /// Every parameter path bound to its value for this run.
    pub parameters: BTreeMap<String, Value>,
    /// Explored parameter paths in declaration order.
    pub explored: Vec<String>,
}

/// Results produced by one run, keyed by path relative to the run namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub run: usize,
    pub results: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl RunOutput {
    pub fn new(run: usize) -> Self {
        Self {
            run,
            results: BTreeMap::new(),
            duration_ms: 0,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Looks up one item of one result.
    pub fn value(&self, path: &str, item: &str) -> Option<&Value> {
        self.results.get(path)?.get(item)
    }
}

/// Run-bound view handed to the simulation callback.
///
/// Owns its data, so it can cross to a worker thread while the coordinator
/// keeps the tree. Parameter lookups accept natural-naming shorthands.
#[derive(Debug, Clone)]
pub struct RunView {
    input: RunInput,
    index: PathIndex,
    results: BTreeMap<String, BTreeMap<String, Value>>,
}

impl RunView {
    pub fn new(input: RunInput) -> Self {
        let index = PathIndex::rebuild(input.parameters.keys());
        Self {
            input,
            index,
            results: BTreeMap::new(),
        }
    }

    pub fn run(&self) -> usize {
        self.input.run
    }

    pub fn run_name(&self) -> String {
        naming::run_name(self.input.run)
    }

    pub fn input(&self) -> &RunInput {
        &self.input
    }

    /// Run value of an explored parameter, the default otherwise.
    pub fn parameter(&self, shorthand: &str) -> Result<&Value> {
        let full = self.index.resolve(shorthand)?;
        self.input
            .parameters
            .get(&full)
            .ok_or_else(|| StructuralError::NotFound(full).into())
    }

    pub fn parameter_f64(&self, shorthand: &str) -> Result<f64> {
        let value = self.parameter(shorthand)?;
        value.as_f64().ok_or_else(|| {
            Error::InvalidValue(format!(
                "parameter `{shorthand}` is {}, not numeric",
                value.type_name()
            ))
        })
    }

    pub fn is_explored(&self, shorthand: &str) -> bool {
        self.index
            .resolve(shorthand)
            .map(|full| self.input.explored.contains(&full))
            .unwrap_or(false)
    }

    /// Values of the explored parameters for this run.
    pub fn bindings(&self) -> Combination {
        self.input
            .explored
            .iter()
            .filter_map(|path| {
                self.input
                    .parameters
                    .get(path)
                    .map(|value| (path.clone(), value.clone()))
            })
            .collect()
    }

    /// Adds a result with named items, scoped to this run.
    pub fn add_result<K, V>(&mut self, path: &str, items: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        validate_path(path)?;
        reject_reserved(path)?;
        if self.results.contains_key(path) {
            return Err(StructuralError::DuplicatePath(path.to_string()).into());
        }
        // A result is a leaf; it cannot sit above or below another one.
        if let Some(existing) = self
            .results
            .keys()
            .find(|existing| is_within(path, existing) || is_within(existing, path))
        {
            return Err(StructuralError::NotAGroup(existing.clone()).into());
        }

        let items = items
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        self.results.insert(path.to_string(), items);
        Ok(())
    }

    /// Adds a result holding a single item named after the leaf.
    pub fn add_result_value(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let leaf = leaf_of(path).to_string();
        let value: Value = value.into();
        self.add_result(path, [(leaf, value)])
    }

    /// Items of a result added during this run.
    pub fn result(&self, path: &str) -> Option<&BTreeMap<String, Value>> {
        self.results.get(path)
    }

    pub fn into_output(self) -> RunOutput {
        RunOutput {
            run: self.input.run,
            results: self.results,
            duration_ms: 0,
        }
    }
}
