use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde_json::json;
use traj_core::{Node, Tree};
use traj_store::{StorageError, StoredExploration};

use super::Coordinator;
use crate::error::Result;
use crate::events::log_runner_info;

impl Coordinator<'_> {
    /// Aligns `tree` with the store and brings committed runs back.
    ///
    /// A stored exploration that extends the tree's lists (runs added by a
    /// hook during an earlier attempt) is adopted. A tree that extends the
    /// stored lists is written out. Anything else is a mismatch.
    pub(super) fn reconcile(&self, tree: &mut Tree) -> Result<()> {
        if let Some(stored) = self.store.stored_exploration()? {
            if tree.exploration_fingerprint().as_deref() != Some(stored.fingerprint.as_str()) {
                match compare(tree, &stored).map_err(StorageError::ExplorationMismatch)? {
                    Ordering::Less => {
                        let before = tree.run_count();
                        let tail = stored.tail(before).ok_or_else(|| {
                            StorageError::ExplorationMismatch(format!(
                                "stored exploration has no runs past {before}"
                            ))
                        })?;
                        tree.expand(&tail)?;
                        log_runner_info(
                            "exploration_adopted",
                            json!({ "from_runs": before, "to_runs": tree.run_count() }),
                        );
                    }
                    Ordering::Equal | Ordering::Greater => {}
                }
            }
        }

        self.store.store_full(tree)?;
        self.store.load_runs(tree, self.load_mode)?;
        Ok(())
    }
}

/// How the tree's explored lists relate to the stored ones.
///
/// `Less` when the store extends the tree, `Greater` when the tree extends
/// the store.
fn compare(tree: &Tree, stored: &StoredExploration) -> std::result::Result<Ordering, String> {
    let ours: BTreeSet<&str> = tree.explored_parameters().iter().map(String::as_str).collect();
    let theirs: BTreeSet<&str> = stored.parameters().collect();
    if ours != theirs {
        return Err(format!(
            "explored parameters differ: tree has [{}], store has [{}]",
            ours.into_iter().collect::<Vec<_>>().join(", "),
            theirs.into_iter().collect::<Vec<_>>().join(", ")
        ));
    }

    let ordering = tree.run_count().cmp(&stored.run_count);
    for path in ours {
        let tree_values = tree
            .node(path)
            .and_then(Node::as_parameter)
            .and_then(|parameter| parameter.explored())
            .unwrap_or_default();
        let stored_values = stored.values_of(path).unwrap_or_default();
        let shared = tree_values.len().min(stored_values.len());
        if tree_values[..shared] != stored_values[..shared] {
            return Err(format!("`{path}` takes different values in the store"));
        }
    }
    Ok(ordering)
}
