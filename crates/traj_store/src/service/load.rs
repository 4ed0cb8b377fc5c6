use std::collections::BTreeMap;

use log::debug;
use traj_core::naming::{is_within, join, owning_run, run_scoped_path};
use traj_core::{ExplorationPlan, Payload, StructuralError, Tree, Value};

use super::{unexpected, Inner, StorageService};
use crate::catalog::ResultEntry;
use crate::error::{Result, StorageError};
use crate::record::{Record, RecordKind};

/// How result items are brought into the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    #[default]
    Eager,
    /// Structure only; result items stay [`Payload::Unresolved`] until
    /// [`StorageService::resolve`] is called.
    Lazy,
}

/// The exploration a store was written with.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredExploration {
    pub axes: Vec<(String, Vec<Value>)>,
    pub run_count: usize,
    pub fingerprint: String,
}

impl StoredExploration {
    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.axes.iter().map(|(path, _)| path.as_str())
    }

    pub fn values_of(&self, path: &str) -> Option<&[Value]> {
        self.axes
            .iter()
            .find(|(axis, _)| axis == path)
            .map(|(_, values)| values.as_slice())
    }

    /// Runs `from..run_count` as a plan, for expanding a shorter tree.
    pub fn tail(&self, from: usize) -> Option<ExplorationPlan> {
        if from >= self.run_count {
            return None;
        }
        ExplorationPlan::parallel(
            self.axes
                .iter()
                .map(|(path, values)| {
                    let tail = values.get(from..).map(<[Value]>::to_vec).unwrap_or_default();
                    (path.clone(), tail)
                }),
        )
        .ok()
    }
}

impl StorageService {
    /// Loads every stored node within `subtree` (`""` for everything) into `tree`.
    ///
    /// An unexplored `tree` adopts the stored exploration together with every
    /// parameter it names, even those outside `subtree`, so run indices stay
    /// bound. An explored `tree` must agree with the stored explored lists.
    /// Committed runs are marked completed.
    pub fn load(&self, tree: &mut Tree, subtree: &str, mode: LoadMode) -> Result<()> {
        let mut inner = self.lock()?;
        let inner = &mut *inner;
        let within = |path: &str| is_within(path, subtree);

        let groups: Vec<String> = inner
            .catalog
            .groups
            .iter()
            .filter(|(path, _)| within(*path))
            .map(|(path, _)| path.to_string())
            .collect();
        for path in groups {
            tree.restore_group(&path)?;
        }

        let adopted = match inner.catalog.exploration {
            Some(span) if !tree.is_explored() => match inner.read_record(span)? {
                Record::Exploration {
                    parameters,
                    run_count,
                    ..
                } => {
                    if let Some(missing) = parameters
                        .iter()
                        .find(|path| inner.catalog.parameters.get(path).is_none())
                    {
                        return Err(StorageError::Corrupt {
                            offset: span.offset,
                            reason: format!("explored parameter `{missing}` has no record"),
                        });
                    }
                    Some((parameters, run_count))
                }
                other => return Err(unexpected(span, RecordKind::Exploration, &other)),
            },
            _ => None,
        };
        let adopts = |path: &str| {
            adopted
                .as_ref()
                .map_or(false, |(explored, _)| explored.iter().any(|axis| axis == path))
        };

        let parameters: Vec<(String, _)> = inner
            .catalog
            .parameters
            .iter()
            .filter(|(path, _)| within(*path) || adopts(*path))
            .map(|(path, span)| (path.to_string(), *span))
            .collect();
        for (path, span) in parameters {
            let (default, explored) = match inner.read_record(span)? {
                Record::Parameter {
                    default, explored, ..
                } => (default, explored),
                other => return Err(unexpected(span, RecordKind::Parameter, &other)),
            };
            let explored = if adopts(&path) {
                explored
            } else if tree.is_explored() {
                check_explored(tree, &path, explored.as_deref())?;
                explored
            } else {
                // No exploration to bind the values to.
                None
            };
            tree.restore_parameter(&path, default, explored)?;
        }
        if let Some((parameters, run_count)) = adopted {
            tree.restore_exploration(parameters, run_count)?;
        }

        let aggregates: Vec<ResultEntry> = inner
            .catalog
            .aggregates
            .iter()
            .filter(|(path, _)| within(*path))
            .map(|(_, entry)| entry.clone())
            .collect();
        for entry in aggregates {
            let items = inner.payloads(&entry, mode)?;
            tree.restore_result(&entry.path, None, items)?;
        }

        let runs: Vec<(usize, Vec<ResultEntry>)> = inner
            .catalog
            .committed
            .iter()
            .map(|(run, committed)| (*run, committed.results.clone()))
            .collect();
        let requested = owning_run(subtree);
        let mut requested_found = false;
        let mut skipped = 0;
        for (run, results) in runs {
            if run >= tree.run_count() {
                skipped += 1;
                continue;
            }
            requested_found |= requested == Some(run);
            for entry in results {
                let full = run_scoped_path(run, &entry.path);
                if within(&full) {
                    let items = inner.payloads(&entry, mode)?;
                    tree.restore_result(&full, Some(run), items)?;
                }
            }
            tree.mark_completed(run)?;
        }
        if skipped > 0 {
            debug!("{skipped} committed runs lie outside the loaded exploration");
        }
        if requested.is_some() && !requested_found {
            return Err(StructuralError::NotFound(subtree.to_string()).into());
        }
        Ok(())
    }

    /// Loads the whole store into a fresh tree.
    pub fn open_tree(&self, mode: LoadMode) -> Result<Tree> {
        let mut tree = Tree::new(self.tree_name()?);
        self.load(&mut tree, "", mode)?;
        Ok(tree)
    }

    /// Point load of one placeholder; the loaded value replaces it in `tree`.
    pub fn resolve(&self, tree: &mut Tree, path: &str, item: &str) -> Result<Value> {
        let (full, payload) = {
            let handle = tree.get(path)?;
            let result = handle
                .as_result()
                .ok_or_else(|| StructuralError::WrongNodeType {
                    path: handle.path().to_string(),
                    expected: "result",
                    actual: handle.node().type_name(),
                })?;
            let payload = result
                .item(item)
                .cloned()
                .ok_or_else(|| StructuralError::NotFound(join(handle.path(), item)))?;
            (handle.path().to_string(), payload)
        };

        match payload {
            Payload::Loaded(value) => Ok(value),
            Payload::Unresolved(locator) => {
                let value = self.lock()?.read_item(locator, &full, item)?;
                tree.set_result_item(&full, item, Payload::Loaded(value.clone()))?;
                Ok(value)
            }
        }
    }

    /// Resolves every placeholder within `subtree`. Returns how many were loaded.
    pub fn resolve_all(&self, tree: &mut Tree, subtree: &str) -> Result<usize> {
        let pending: Vec<(String, String)> = tree
            .subtree(subtree)
            .into_iter()
            .filter_map(|(path, node)| node.as_result().map(|result| (path, result)))
            .flat_map(|(path, result)| {
                result
                    .items()
                    .iter()
                    .filter(|(_, payload)| !payload.is_loaded())
                    .map(move |(name, _)| (path.to_string(), name.clone()))
            })
            .collect();

        for (path, item) in &pending {
            self.resolve(tree, path, item)?;
        }
        Ok(pending.len())
    }

    /// Explored lists and fingerprint as last written, if the store has an exploration.
    pub fn stored_exploration(&self) -> Result<Option<StoredExploration>> {
        let mut inner = self.lock()?;
        let Some(span) = inner.catalog.exploration else {
            return Ok(None);
        };
        let (parameters, run_count, fingerprint) = match inner.read_record(span)? {
            Record::Exploration {
                parameters,
                run_count,
                fingerprint,
            } => (parameters, run_count, fingerprint),
            other => return Err(unexpected(span, RecordKind::Exploration, &other)),
        };

        let mut axes = Vec::with_capacity(parameters.len());
        for path in parameters {
            let span = inner
                .catalog
                .parameters
                .get(&path)
                .copied()
                .ok_or_else(|| StorageError::Corrupt {
                    offset: span.offset,
                    reason: format!("explored parameter `{path}` has no record"),
                })?;
            match inner.read_record(span)? {
                Record::Parameter {
                    explored: Some(values),
                    ..
                } => axes.push((path, values)),
                Record::Parameter { explored: None, .. } => {
                    return Err(StorageError::Corrupt {
                        offset: span.offset,
                        reason: format!("explored parameter `{path}` has no values"),
                    })
                }
                other => return Err(unexpected(span, RecordKind::Parameter, &other)),
            }
        }
        Ok(Some(StoredExploration {
            axes,
            run_count,
            fingerprint,
        }))
    }
}

impl Inner {
    fn payloads(&mut self, entry: &ResultEntry, mode: LoadMode) -> Result<BTreeMap<String, Payload>> {
        match mode {
            LoadMode::Lazy => {
                let locator = self.locator(entry.span);
                Ok(entry
                    .items
                    .iter()
                    .map(|name| (name.clone(), Payload::Unresolved(locator)))
                    .collect())
            }
            LoadMode::Eager => match self.read_record(entry.span)? {
                Record::Result { items, .. } => Ok(items
                    .into_iter()
                    .map(|(name, value)| (name, Payload::Loaded(value)))
                    .collect()),
                other => Err(unexpected(entry.span, RecordKind::Result, &other)),
            },
        }
    }
}

/// A stored parameter may only replace one of an explored tree when both
/// agree on whether it is explored and on the run count.
fn check_explored(tree: &Tree, path: &str, stored: Option<&[Value]>) -> Result<()> {
    let explored_here = tree.explored_parameters().iter().any(|axis| axis == path);
    match stored {
        Some(values) if explored_here && values.len() == tree.run_count() => Ok(()),
        None if !explored_here => Ok(()),
        Some(values) => Err(StorageError::ExplorationMismatch(format!(
            "stored `{path}` has {} explored values, the tree has {} runs{}",
            values.len(),
            tree.run_count(),
            if explored_here { "" } else { " and does not explore it" }
        ))),
        None => Err(StorageError::ExplorationMismatch(format!(
            "`{path}` is explored in the tree but not in the store"
        ))),
    }
}
