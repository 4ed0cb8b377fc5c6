use std::collections::BTreeMap;

use log::debug;
use traj_core::naming::{is_within, run_scoped_path};
use traj_core::{Node, Payload, ResultNode, RunOutput, Tree, Value};

use super::{Inner, StorageService};
use crate::catalog::Catalog;
use crate::error::{Result, StorageError};
use crate::record::Record;

impl StorageService {
    /// Persists the whole tree.
    ///
    /// Structure, parameters, exploration and aggregate results are appended
    /// and supersede what the file held; stored nodes the tree no longer has
    /// are marked removed. Completed runs that are already committed here are
    /// skipped; the others are framed and committed.
    /// Everything is serialized before the first byte is written.
    pub fn store_full(&self, tree: &Tree) -> Result<()> {
        let mut inner = self.lock()?;

        let mut records = Vec::new();
        if inner.catalog.tree_name != tree.name() {
            records.push(Record::header(tree.name()));
        }
        records.extend(
            removed_paths(&inner.catalog, tree)
                .into_iter()
                .map(|path| Record::Removed { path }),
        );
        for (path, node) in tree.nodes() {
            if Tree::is_run_scoped(path) {
                continue;
            }
            match node {
                Node::Group(_) => records.push(Record::Group {
                    path: path.to_string(),
                }),
                Node::Parameter(parameter) => records.push(Record::Parameter {
                    path: path.to_string(),
                    default: parameter.default_value().clone(),
                    explored: parameter.explored().map(<[Value]>::to_vec),
                }),
                Node::Result(result) => records.push(Record::Result {
                    path: path.to_string(),
                    run: None,
                    items: inner.materialize(path, result)?,
                }),
            }
        }
        records.extend(exploration_record(tree));

        let mut runs = Vec::new();
        for &run in tree.completed_runs() {
            if inner.catalog.committed.contains_key(&run) {
                continue;
            }
            let mut body = vec![Record::begin(run)];
            for (path, result) in tree.run_results(run) {
                body.push(Record::Result {
                    path: path.to_string(),
                    run: Some(run),
                    items: inner.materialize(&run_scoped_path(run, path), result)?,
                });
            }
            runs.push((run, body));
        }

        inner.append(&records)?;
        for (run, body) in &runs {
            inner.commit_run(body, *run, 0)?;
        }
        inner.file.sync()?;
        debug!(
            "stored tree `{}`: {} records, {} runs committed",
            tree.name(),
            records.len(),
            runs.len()
        );
        Ok(())
    }

    /// Appends one run's results followed by its commit marker.
    ///
    /// Safe to call from many workers at once. On error the run stays out of
    /// the ledger.
    pub fn store_run(&self, output: &RunOutput) -> Result<()> {
        let mut body = Vec::with_capacity(output.results.len() + 1);
        body.push(Record::begin(output.run));
        for (path, items) in &output.results {
            body.push(Record::Result {
                path: path.clone(),
                run: Some(output.run),
                items: items.clone(),
            });
        }

        let mut inner = self.lock()?;
        if inner.catalog.committed.contains_key(&output.run) {
            return Err(StorageError::RunAlreadyCommitted(output.run));
        }
        inner.commit_run(&body, output.run, output.duration_ms)?;
        debug!(
            "committed run {} ({} results, {} ms)",
            output.run,
            output.results.len(),
            output.duration_ms
        );
        Ok(())
    }

    /// Re-persists parameters and the exploration, e.g. after the tree was expanded.
    pub fn store_parameters(&self, tree: &Tree) -> Result<()> {
        let mut records: Vec<Record> = tree
            .parameters()
            .into_iter()
            .map(|(path, parameter)| Record::Parameter {
                path: path.to_string(),
                default: parameter.default_value().clone(),
                explored: parameter.explored().map(<[Value]>::to_vec),
            })
            .collect();
        records.extend(exploration_record(tree));

        let mut inner = self.lock()?;
        inner.append(&records)?;
        inner.file.sync()?;
        Ok(())
    }

    /// Appends a diagnostic record; the ledger is unaffected.
    pub fn record_failure(&self, run: usize, error: &str) -> Result<()> {
        self.lock()?.append(&[Record::failure(run, error)])
    }
}

impl Inner {
    /// Loaded values of `result`, reading placeholders that point into this store.
    fn materialize(&mut self, path: &str, result: &ResultNode) -> Result<BTreeMap<String, Value>> {
        let mut items = BTreeMap::new();
        for (name, payload) in result.items() {
            let value = match payload {
                Payload::Loaded(value) => value.clone(),
                Payload::Unresolved(locator) => self.read_item(*locator, path, name)?,
            };
            items.insert(name.clone(), value);
        }
        Ok(items)
    }
}

/// Stored structure outside the run namespace that `tree` lacks, or holds
/// as a different node type. Descendants of a removed path are implied.
fn removed_paths(catalog: &Catalog, tree: &Tree) -> Vec<String> {
    let stale = |path: &str, expected: &str| {
        !Tree::is_run_scoped(path)
            && tree
                .node(path)
                .map_or(true, |node| node.type_name() != expected)
    };
    let mut removed: Vec<String> = catalog
        .groups
        .iter()
        .filter(|(path, _)| stale(*path, "group"))
        .chain(catalog.parameters.iter().filter(|(path, _)| stale(*path, "parameter")))
        .map(|(path, _)| path.to_string())
        .chain(
            catalog
                .aggregates
                .iter()
                .filter(|(path, _)| stale(*path, "result"))
                .map(|(path, _)| path.to_string()),
        )
        .collect();
    removed.sort();
    removed.dedup();
    let mut kept: Vec<String> = Vec::with_capacity(removed.len());
    for path in removed {
        if !kept.iter().any(|ancestor| is_within(&path, ancestor)) {
            kept.push(path);
        }
    }
    kept
}

fn exploration_record(tree: &Tree) -> Option<Record> {
    Some(Record::Exploration {
        parameters: tree.explored_parameters().to_vec(),
        run_count: tree.run_count(),
        fingerprint: tree.exploration_fingerprint()?,
    })
}
