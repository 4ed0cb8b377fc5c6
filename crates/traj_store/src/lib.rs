//! Single-file persistence for trajectory trees.
//!
//! The store is an append-only JSON-lines file. Records for the same path
//! supersede each other, run results only count once their run's `commit`
//! marker is written, and the set of committed runs is the resume ledger.

mod catalog;
pub mod error;
pub mod export;
mod file;
pub mod merge;
pub mod record;
mod run_store;
pub mod service;

pub use error::{Result, StorageError};
pub use export::{export, export_to_csv, export_to_json, export_to_parquet, ExportFormat, RunTable};
pub use merge::{merge, merge_files};
pub use record::{Record, RecordKind};
pub use run_store::RunStore;
pub use service::{CompactionStats, LoadMode, StorageService, StoredExploration};
