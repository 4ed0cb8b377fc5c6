//! In-memory index of the live records in a store file.
//!
//! Built by scanning record headers once on open and then kept current on
//! every append, so the ledger and lazy placeholders never require payloads
//! to be parsed.

use std::collections::{BTreeMap, HashMap};

use traj_core::naming::is_within;

use crate::file::Span;
use crate::record::{Entry, RecordKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResultEntry {
    /// Relative to the run namespace for run-scoped results.
    pub path: String,
    pub span: Span,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommittedRun {
    pub begin: Span,
    pub results: Vec<ResultEntry>,
    pub commit: Span,
}

/// Path-keyed entries where a later record replaces an earlier one in place.
#[derive(Debug, Clone)]
pub(crate) struct Superseding<T> {
    order: Vec<String>,
    entries: HashMap<String, T>,
}

impl<T> Default for Superseding<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }
}

impl<T> Superseding<T> {
    fn put(&mut self, path: String, value: T) {
        if !self.entries.contains_key(&path) {
            self.order.push(path.clone());
        }
        self.entries.insert(path, value);
    }

    pub fn get(&self, path: &str) -> Option<&T> {
        self.entries.get(path)
    }

    /// Drops `path` and its descendants.
    fn remove_within(&mut self, path: &str) {
        self.order.retain(|candidate| !is_within(candidate, path));
        self.entries.retain(|candidate, _| !is_within(candidate, path));
    }

    /// Entries in order of first appearance.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.order
            .iter()
            .filter_map(|path| self.entries.get(path).map(|value| (path.as_str(), value)))
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Catalog {
    pub tree_name: String,
    pub header: Option<Span>,
    pub groups: Superseding<Span>,
    pub parameters: Superseding<Span>,
    pub exploration: Option<Span>,
    pub aggregates: Superseding<ResultEntry>,
    pending: HashMap<usize, (Span, Vec<ResultEntry>)>,
    pub committed: BTreeMap<usize, CommittedRun>,
    pub failures: BTreeMap<usize, Span>,
    pub orphans: usize,
}

impl Catalog {
    pub fn apply(&mut self, entry: Entry, span: Span) {
        match entry.kind {
            RecordKind::Header => {
                self.header = Some(span);
                if let Some(tree) = entry.tree {
                    self.tree_name = tree;
                }
            }
            RecordKind::Group => {
                if let Some(path) = entry.path {
                    self.groups.put(path, span);
                }
            }
            RecordKind::Parameter => {
                if let Some(path) = entry.path {
                    self.parameters.put(path, span);
                }
            }
            RecordKind::Exploration => self.exploration = Some(span),
            RecordKind::Result => {
                let Some(path) = entry.path else {
                    self.orphans += 1;
                    return;
                };
                let result = ResultEntry {
                    path,
                    span,
                    items: entry.items,
                };
                match entry.run {
                    None => self.aggregates.put(result.path.clone(), result),
                    Some(run) => match self.pending.get_mut(&run) {
                        Some((_, results)) => {
                            results.retain(|existing| existing.path != result.path);
                            results.push(result);
                        }
                        // No open attempt for this run.
                        None => self.orphans += 1,
                    },
                }
            }
            RecordKind::Begin => {
                if let Some(run) = entry.run {
                    if let Some((_, stale)) = self.pending.insert(run, (span, Vec::new())) {
                        self.orphans += stale.len();
                    }
                }
            }
            RecordKind::Commit => {
                let Some(run) = entry.run else {
                    return;
                };
                match self.pending.remove(&run) {
                    Some((begin, results)) => {
                        self.committed.insert(
                            run,
                            CommittedRun {
                                begin,
                                results,
                                commit: span,
                            },
                        );
                    }
                    None => self.orphans += 1,
                }
            }
            RecordKind::Failure => {
                if let Some(run) = entry.run {
                    self.failures.insert(run, span);
                }
            }
            RecordKind::Removed => {
                if let Some(path) = entry.path {
                    self.groups.remove_within(&path);
                    self.parameters.remove_within(&path);
                    self.aggregates.remove_within(&path);
                }
            }
        }
    }

    /// Runs with a `begin` but no matching `commit` yet.
    pub fn open_attempts(&self) -> Vec<usize> {
        let mut runs: Vec<usize> = self.pending.keys().copied().collect();
        runs.sort_unstable();
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: RecordKind, path: Option<&str>, run: Option<usize>) -> Entry {
        Entry {
            kind,
            path: path.map(str::to_string),
            run,
            tree: None,
            items: vec!["value".to_string()],
        }
    }

    fn span(offset: u64) -> Span {
        Span { offset, len: 1 }
    }

    #[test]
    fn test_results_need_begin_and_commit() {
        let mut catalog = Catalog::default();
        catalog.apply(entry(RecordKind::Begin, None, Some(0)), span(0));
        catalog.apply(entry(RecordKind::Result, Some("z"), Some(0)), span(1));
        catalog.apply(entry(RecordKind::Begin, None, Some(1)), span(2));
        catalog.apply(entry(RecordKind::Result, Some("z"), Some(1)), span(3));
        catalog.apply(entry(RecordKind::Commit, None, Some(1)), span(4));

        assert_eq!(catalog.committed.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(catalog.committed[&1].results[0].span, span(3));
        assert_eq!(catalog.open_attempts(), vec![0]);
    }

    #[test]
    fn test_new_begin_discards_stale_attempt() {
        let mut catalog = Catalog::default();
        catalog.apply(entry(RecordKind::Begin, None, Some(5)), span(0));
        catalog.apply(entry(RecordKind::Result, Some("z"), Some(5)), span(1));
        catalog.apply(entry(RecordKind::Begin, None, Some(5)), span(2));
        catalog.apply(entry(RecordKind::Result, Some("w"), Some(5)), span(3));
        catalog.apply(entry(RecordKind::Commit, None, Some(5)), span(4));

        let run = &catalog.committed[&5];
        assert_eq!(run.begin, span(2));
        assert_eq!(run.results.len(), 1);
        assert_eq!(run.results[0].path, "w");
        assert_eq!(catalog.orphans, 1);
    }

    #[test]
    fn test_later_records_supersede_in_place() {
        let mut catalog = Catalog::default();
        catalog.apply(entry(RecordKind::Parameter, Some("x"), None), span(0));
        catalog.apply(entry(RecordKind::Parameter, Some("y"), None), span(1));
        catalog.apply(entry(RecordKind::Parameter, Some("x"), None), span(2));

        let order: Vec<(&str, Span)> = catalog
            .parameters
            .iter()
            .map(|(path, span)| (path, *span))
            .collect();
        assert_eq!(order, vec![("x", span(2)), ("y", span(1))]);
    }

    #[test]
    fn test_removed_drops_path_and_descendants() {
        let mut catalog = Catalog::default();
        catalog.apply(entry(RecordKind::Group, Some("solver"), None), span(0));
        catalog.apply(entry(RecordKind::Parameter, Some("solver.tol"), None), span(1));
        catalog.apply(entry(RecordKind::Parameter, Some("solvers"), None), span(2));
        catalog.apply(entry(RecordKind::Result, Some("solver.log"), None), span(3));
        catalog.apply(entry(RecordKind::Removed, Some("solver"), None), span(4));

        assert!(catalog.groups.get("solver").is_none());
        assert!(catalog.parameters.get("solver.tol").is_none());
        assert!(catalog.aggregates.get("solver.log").is_none());
        assert_eq!(catalog.parameters.iter().count(), 1);
        assert!(catalog.parameters.get("solvers").is_some());

        catalog.apply(entry(RecordKind::Parameter, Some("solver.tol"), None), span(5));
        assert_eq!(catalog.parameters.get("solver.tol"), Some(&span(5)));
    }
}
