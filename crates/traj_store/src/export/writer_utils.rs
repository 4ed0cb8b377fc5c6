use std::fs::{self, File};
use std::path::Path;

use super::RunTable;

/// Tables without completed runs have no schema worth writing.
pub(crate) fn require_rows(table: &RunTable) -> Result<(), Box<dyn std::error::Error>> {
    if table.rows.is_empty() {
        return Err("no completed runs to export".into());
    }
    Ok(())
}

/// Creates the export file, making missing parent directories first.
pub(crate) fn open_export_target(path: &Path) -> Result<File, Box<dyn std::error::Error>> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)?,
        _ => {}
    }
    File::create(path).map_err(|err| format!("cannot create {}: {err}", path.display()).into())
}
