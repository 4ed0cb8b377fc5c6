//! Natural-naming index over full node paths.
//!
//! Full paths are looked up directly. Shorthands (any trailing run of path
//! segments) are resolved through a bucket keyed by leaf name, so resolution
//! costs one bucket scan instead of a walk over the whole tree.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::StructuralError;
use crate::naming::{ends_with_segments, leaf_of, validate_path};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathIndex {
    paths: HashSet<String>,
    by_leaf: HashMap<String, BTreeSet<String>>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from a full traversal.
    pub fn rebuild<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::new();
        for path in paths {
            index.insert(path.as_ref());
        }
        index
    }

    /// Returns `false` if the path was already indexed.
    pub fn insert(&mut self, full_path: &str) -> bool {
        if !self.paths.insert(full_path.to_string()) {
            return false;
        }
        self.by_leaf
            .entry(leaf_of(full_path).to_string())
            .or_default()
            .insert(full_path.to_string());
        true
    }

    /// Returns `false` if the path was not indexed.
    pub fn remove(&mut self, full_path: &str) -> bool {
        if !self.paths.remove(full_path) {
            return false;
        }
        let leaf = leaf_of(full_path);
        if let Some(bucket) = self.by_leaf.get_mut(leaf) {
            bucket.remove(full_path);
            if bucket.is_empty() {
                self.by_leaf.remove(leaf);
            }
        }
        true
    }

    pub fn contains(&self, full_path: &str) -> bool {
        self.paths.contains(full_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// All indexed paths whose trailing segments equal `shorthand`, sorted.
    pub fn matches(&self, shorthand: &str) -> Vec<&str> {
        self.by_leaf
            .get(leaf_of(shorthand))
            .map(|bucket| {
                bucket
                    .iter()
                    .filter(|path| ends_with_segments(path, shorthand))
                    .map(String::as_str)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn resolve(&self, shorthand: &str) -> Result<String, StructuralError> {
        self.resolve_visible(shorthand, |_| true)
    }

    /// Resolves among the paths accepted by `visible`.
    ///
    /// An exact full-path hit wins over longer paths sharing the same suffix.
    pub fn resolve_visible<F>(&self, shorthand: &str, visible: F) -> Result<String, StructuralError>
    where
        F: Fn(&str) -> bool,
    {
        validate_path(shorthand)?;
        if self.paths.contains(shorthand) && visible(shorthand) {
            return Ok(shorthand.to_string());
        }

        let candidates: Vec<&str> = self
            .matches(shorthand)
            .into_iter()
            .filter(|path| visible(path))
            .collect();

        match candidates.as_slice() {
            [] => Err(StructuralError::NotFound(shorthand.to_string())),
            [only] => Ok((*only).to_string()),
            many => Err(StructuralError::Ambiguous {
                shorthand: shorthand.to_string(),
                candidates: many.iter().map(|path| (*path).to_string()).collect(),
            }),
        }
    }
}
