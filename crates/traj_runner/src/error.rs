use std::fmt;

use thiserror::Error;
use traj_store::StorageError;

/// Error returned by a simulation callback or a post-run hook.
///
/// Any `std::error::Error` converts into it, so callbacks can use `?` on
/// tree lookups and their own fallible code alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    message: String,
}

impl RunFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl<E: std::error::Error> From<E> for RunFailure {
    fn from(error: E) -> Self {
        Self::new(error.to_string())
    }
}

/// Why a single run did not complete.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("run {run} failed: {message}")]
    Callback { run: usize, message: String },
    #[error("run {run} panicked: {message}")]
    Panicked { run: usize, message: String },
    #[error("run {run} message could not be encoded or decoded: {message}")]
    Codec { run: usize, message: String },
    #[error("run {run} could not be committed: {source}")]
    Store {
        run: usize,
        #[source]
        source: StorageError,
    },
}

impl RunError {
    pub fn run(&self) -> usize {
        match self {
            Self::Callback { run, .. }
            | Self::Panicked { run, .. }
            | Self::Codec { run, .. }
            | Self::Store { run, .. } => *run,
        }
    }
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("the tree has no exploration to run")]
    NotExplored,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Tree(#[from] traj_core::Error),
    #[error("cannot build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("run message codec failed: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("worker channel closed with {0} runs in flight")]
    WorkerChannel(usize),
    #[error("aborted after run {run} failed: {message}")]
    FailFast { run: usize, message: String },
    #[error("post-run hook failed after run {run}: {message}")]
    Hook { run: usize, message: String },
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
