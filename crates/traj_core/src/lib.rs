//! Parameter/result trees with natural naming and an exploration engine.
//!
//! A [`Tree`] holds groups, parameters and results addressed by dotted paths.
//! Any unambiguous trailing run of path segments works as a shorthand. An
//! [`ExplorationPlan`] binds one value list per explored parameter; entry `i`
//! of every list belongs to run `i`. Runs execute against an owned
//! [`RunView`] and hand their results back as a [`RunOutput`].

pub mod error;
pub mod exploration;
pub mod naming;
pub mod node;
pub mod path_index;
pub mod tree;
pub mod value;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use error::{Error, ExplorationError, Result, StructuralError};
pub use exploration::{Combination, ExplorationPlan, ParameterSpace};
pub use node::{Group, Locator, Node, NodeHandle, Parameter, Payload, ResultNode};
pub use path_index::PathIndex;
pub use tree::{RunInput, RunOutput, RunView, Tree};
pub use value::{values, Frame, Matrix, Value, ValueKind};
