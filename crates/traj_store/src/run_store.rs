use std::collections::BTreeSet;

use traj_core::naming::RUNS_GROUP;
use traj_core::{RunOutput, Tree};

use crate::error::Result;
use crate::service::{LoadMode, StorageService, StoredExploration};

/// What a run coordinator needs from persistence.
///
/// [`StorageService`] is the production implementation; tests wrap it to
/// inject failures.
pub trait RunStore: Send + Sync {
    fn completed_runs(&self) -> Result<BTreeSet<usize>>;

    fn stored_exploration(&self) -> Result<Option<StoredExploration>>;

    /// Brings committed run results into `tree`, leaving its parameters untouched.
    fn load_runs(&self, tree: &mut Tree, mode: LoadMode) -> Result<()>;

    fn store_full(&self, tree: &Tree) -> Result<()>;

    fn store_parameters(&self, tree: &Tree) -> Result<()>;

    fn store_run(&self, output: &RunOutput) -> Result<()>;

    fn record_failure(&self, run: usize, error: &str) -> Result<()>;
}

impl RunStore for StorageService {
    fn completed_runs(&self) -> Result<BTreeSet<usize>> {
        self.list_completed_runs()
    }

    fn stored_exploration(&self) -> Result<Option<StoredExploration>> {
        StorageService::stored_exploration(self)
    }

    fn load_runs(&self, tree: &mut Tree, mode: LoadMode) -> Result<()> {
        self.load(tree, RUNS_GROUP, mode)
    }

    fn store_full(&self, tree: &Tree) -> Result<()> {
        StorageService::store_full(self, tree)
    }

    fn store_parameters(&self, tree: &Tree) -> Result<()> {
        StorageService::store_parameters(self, tree)
    }

    fn store_run(&self, output: &RunOutput) -> Result<()> {
        StorageService::store_run(self, output)
    }

    fn record_failure(&self, run: usize, error: &str) -> Result<()> {
        StorageService::record_failure(self, run, error)
    }
}
