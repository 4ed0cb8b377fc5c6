//! Error types.

pub type Result<T> = core::result::Result<T, Error>;

/// Crate-wide error type.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Exploration(#[from] ExplorationError),
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Problems with the shape of the tree or with path lookups.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("path `{0}` already exists")]
    DuplicatePath(String),
    #[error("invalid name `{name}` in path `{path}`")]
    InvalidName { path: String, name: String },
    #[error("`{0}` is reserved for run-scoped results")]
    ReservedName(String),
    #[error("no node matches `{0}`")]
    NotFound(String),
    #[error("`{shorthand}` is ambiguous, candidates: {}", candidates.join(", "))]
    Ambiguous {
        shorthand: String,
        candidates: Vec<String>,
    },
    #[error("`{0}` is not a group")]
    NotAGroup(String),
    #[error("`{path}` is a {actual}, expected a {expected}")]
    WrongNodeType {
        path: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("explored parameter `{0}` cannot be removed")]
    ExploredParameter(String),
    #[error("the root group cannot be removed")]
    RootRemoval,
    #[error("run {0} is already completed")]
    RunAlreadyCompleted(usize),
    #[error("run {run} is out of range (run count {run_count})")]
    RunOutOfRange { run: usize, run_count: usize },
}

/// Problems binding candidate values to parameters.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExplorationError {
    #[error("the tree is already explored")]
    AlreadyExplored,
    #[error("the tree is not explored yet")]
    NotExplored,
    #[error("exploration must contain at least one run")]
    Empty,
    #[error("`{path}` has {actual} values, expected {expected}")]
    LengthMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },
    #[error("parameter `{0}` is explored more than once")]
    DuplicateAxis(String),
    #[error("`{0}` is not a parameter of this tree")]
    UnknownParameter(String),
    #[error("value {index} of `{path}` is a {actual}, expected a {expected}")]
    TypeMismatch {
        path: String,
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("explored parameters differ: expected [{}], got [{}]", expected.join(", "), actual.join(", "))]
    ParameterSetMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },
}
