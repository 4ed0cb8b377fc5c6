//! Merging two trees that explored the same parameter space.
//!
//! Runs of the second tree are appended after those of the first, so run
//! `i` of `b` becomes run `a.run_count() + i` of the merged tree.

use std::collections::BTreeSet;
use std::io;
use std::path::Path;

use log::{info, warn};
use traj_core::naming::run_scoped_path;
use traj_core::{ExplorationPlan, Node, Tree, Value};

use crate::error::{Result, StorageError};
use crate::service::{LoadMode, StorageService};

pub fn merge(a: &Tree, b: &Tree) -> Result<Tree> {
    check_compatible(a, b)?;

    let mut merged = a.clone();
    let offset = a.run_count();
    if b.is_explored() {
        let axes = b.explored_parameters().iter().map(|path| {
            let values = b
                .node(path)
                .and_then(Node::as_parameter)
                .and_then(|parameter| parameter.explored())
                .map(<[Value]>::to_vec)
                .unwrap_or_default();
            (path.clone(), values)
        });
        merged.expand(&ExplorationPlan::parallel(axes)?)?;
    }

    for (path, node) in b.nodes() {
        if Tree::is_run_scoped(path) {
            continue;
        }
        match node {
            Node::Group(_) => merged.restore_group(path)?,
            Node::Parameter(_) => {}
            Node::Result(result) => match merged.node(path) {
                None => merged.restore_result(path, None, result.items().clone())?,
                Some(Node::Result(existing)) if existing == result => {}
                Some(_) => warn!("merge keeps `{path}` from `{}`", a.name()),
            },
        }
    }

    for &run in b.completed_runs() {
        let target = run + offset;
        for (path, result) in b.run_results(run) {
            merged.restore_result(
                &run_scoped_path(target, path),
                Some(target),
                result.items().clone(),
            )?;
        }
        merged.mark_completed(target)?;
    }

    info!(
        "merged `{}` ({} runs) and `{}` ({} runs)",
        a.name(),
        a.run_count(),
        b.name(),
        b.run_count()
    );
    Ok(merged)
}

/// Same explored paths, and every parameter present in both with equal default and kind.
fn check_compatible(a: &Tree, b: &Tree) -> Result<()> {
    let explored_a: BTreeSet<&String> = a.explored_parameters().iter().collect();
    let explored_b: BTreeSet<&String> = b.explored_parameters().iter().collect();
    if explored_a != explored_b {
        return Err(StorageError::IncompatibleSpace(format!(
            "explored parameters differ: [{}] vs [{}]",
            a.explored_parameters().join(", "),
            b.explored_parameters().join(", ")
        )));
    }

    let parameters_a = a.parameters();
    let parameters_b = b.parameters();
    if parameters_a.len() != parameters_b.len() {
        return Err(StorageError::IncompatibleSpace(format!(
            "{} parameters vs {}",
            parameters_a.len(),
            parameters_b.len()
        )));
    }
    for (path, parameter) in parameters_a {
        let Some(other) = b.node(path).and_then(Node::as_parameter) else {
            return Err(StorageError::IncompatibleSpace(format!(
                "`{path}` is missing from `{}`",
                b.name()
            )));
        };
        if parameter.kind() != other.kind() || parameter.default_value() != other.default_value() {
            return Err(StorageError::IncompatibleSpace(format!(
                "`{path}` differs: {} vs {}",
                parameter.default_value(),
                other.default_value()
            )));
        }
    }
    Ok(())
}

/// Merges the stores at `a` and `b` into a new store at `out`.
pub fn merge_files(
    a: impl AsRef<Path>,
    b: impl AsRef<Path>,
    out: impl AsRef<Path>,
) -> Result<StorageService> {
    let out = out.as_ref();
    if out.exists() && out.metadata()?.len() > 0 {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", out.display()),
        )
        .into());
    }

    let left = StorageService::open(a)?.open_tree(LoadMode::Eager)?;
    let right = StorageService::open(b)?.open_tree(LoadMode::Eager)?;
    let merged = merge(&left, &right)?;

    let store = StorageService::open(out)?;
    store.store_full(&merged)?;
    Ok(store)
}
