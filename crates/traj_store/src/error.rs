use std::io;

pub type Result<T> = core::result::Result<T, StorageError>;

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("store i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt record at byte {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },
    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("incompatible parameter space: {0}")]
    IncompatibleSpace(String),
    #[error("item `{item}` of `{path}` is a placeholder from another store")]
    Unresolved { path: String, item: String },
    #[error("stored exploration does not match the tree: {0}")]
    ExplorationMismatch(String),
    #[error("run {0} is already committed")]
    RunAlreadyCommitted(usize),
    #[error("store lock poisoned by a panicking writer")]
    Poisoned,
    #[error(transparent)]
    Tree(#[from] traj_core::Error),
}

impl From<traj_core::StructuralError> for StorageError {
    fn from(error: traj_core::StructuralError) -> Self {
        Self::Tree(error.into())
    }
}

impl From<traj_core::ExplorationError> for StorageError {
    fn from(error: traj_core::ExplorationError) -> Self {
        Self::Tree(error.into())
    }
}
