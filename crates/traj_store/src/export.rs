//! Tabular export of completed runs.
//!
//! One row per completed run: the run index, the explored bindings, then
//! every scalar result item. A result item is named after its result path,
//! with `.item` appended when the item name differs from the result's leaf.

use std::collections::HashMap;
use std::path::Path;

use traj_core::naming::{join, leaf_of};
use traj_core::{Tree, Value};

#[path = "export/csv.rs"]
mod csv;
#[path = "export/json.rs"]
mod json;
#[path = "export/parquet.rs"]
mod parquet;
#[path = "export/writer_utils.rs"]
mod writer_utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Parquet,
    Csv,
    Json,
}

impl ExportFormat {
    /// Picks a format from the file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "parquet" => Some(Self::Parquet),
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    pub run: usize,
    /// One cell per column; `None` where the run has no such item.
    pub cells: Vec<Option<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunTable {
    pub columns: Vec<String>,
    pub rows: Vec<RunRow>,
}

impl RunTable {
    /// Collects completed runs. Unresolved or non-scalar items are left out.
    pub fn from_tree(tree: &Tree) -> Self {
        let mut columns: Vec<String> = tree.explored_parameters().to_vec();
        let mut positions: HashMap<String, usize> = columns
            .iter()
            .enumerate()
            .map(|(position, column)| (column.clone(), position))
            .collect();

        let mut rows = Vec::with_capacity(tree.completed_runs().len());
        for &run in tree.completed_runs() {
            let mut cells: Vec<(usize, Value)> = Vec::new();
            if let Ok(binding) = tree.bindings(run) {
                for (path, value) in binding {
                    if let Some(&position) = positions.get(&path) {
                        cells.push((position, value));
                    }
                }
            }
            for (path, result) in tree.run_results(run) {
                for (item, value) in result.loaded_values() {
                    if !value.is_scalar() {
                        continue;
                    }
                    let column = if item == leaf_of(path) {
                        path.to_string()
                    } else {
                        join(path, &item)
                    };
                    let position = *positions.entry(column.clone()).or_insert_with(|| {
                        columns.push(column);
                        columns.len() - 1
                    });
                    cells.push((position, value));
                }
            }
            rows.push((run, cells));
        }

        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|(run, cells)| {
                let mut row = vec![None; width];
                for (position, value) in cells {
                    row[position] = Some(value);
                }
                RunRow { run, cells: row }
            })
            .collect();
        Self { columns, rows }
    }

    pub fn column(&self, name: &str) -> Option<Vec<Option<&Value>>> {
        let position = self.columns.iter().position(|column| column == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.cells[position].as_ref())
                .collect(),
        )
    }
}

/// Export completed runs to Parquet format.
///
/// Integer, float and boolean columns keep their type; a column mixing
/// integers and floats becomes float, anything else becomes text.
///
/// # Errors
///
/// Returns an error if there are no completed runs, or if file creation or
/// Parquet writing fails.
pub fn export_to_parquet(tree: &Tree, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
    let table = RunTable::from_tree(tree);
    writer_utils::require_rows(&table)?;
    let file = writer_utils::open_export_target(path.as_ref())?;
    parquet::export_to_parquet_impl(&table, file)
}

/// Export completed runs to CSV format.
///
/// # Errors
///
/// Returns an error if there are no completed runs, or if file creation or CSV writing fails.
pub fn export_to_csv(tree: &Tree, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
    let table = RunTable::from_tree(tree);
    writer_utils::require_rows(&table)?;
    let file = writer_utils::open_export_target(path.as_ref())?;
    csv::export_to_csv_impl(&table, file)
}

/// Export completed runs to JSON format: an array with one object per run.
///
/// # Errors
///
/// Returns an error if file creation or JSON serialization fails.
pub fn export_to_json(tree: &Tree, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
    let table = RunTable::from_tree(tree);
    let file = writer_utils::open_export_target(path.as_ref())?;
    json::export_to_json_impl(&table, file)
}

pub fn export(
    tree: &Tree,
    path: impl AsRef<Path>,
    format: ExportFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        ExportFormat::Parquet => export_to_parquet(tree, path),
        ExportFormat::Csv => export_to_csv(tree, path),
        ExportFormat::Json => export_to_json(tree, path),
    }
}
