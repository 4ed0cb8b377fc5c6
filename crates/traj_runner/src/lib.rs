//! Execution of explored trees: sequential or on a bounded worker pool.
//!
//! [`Coordinator::run`] reconciles the tree with its store, skips runs
//! already in the ledger, dispatches the rest, commits each run through the
//! store and integrates it into the tree. Admission to the pool is gated by
//! a pluggable [`ResourceProbe`].

pub mod admission;
pub mod config;
pub mod coordinator;
pub mod error;
mod events;

pub use admission::{AdmissionGate, AlwaysAdmit, FnProbe, ResourceProbe};
#[cfg(feature = "sysinfo")]
pub use admission::SystemProbe;
pub use config::{AdmissionLimits, ConfigError, ExecutionMode, RunnerConfig};
pub use coordinator::{
    CancellationToken, Coordinator, HookAction, PostRunHook, RunReport, RunState,
};
pub use error::{CoordinatorError, RunError, RunFailure};
