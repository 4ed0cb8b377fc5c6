use serde_json::{Map, Number};
use traj_core::Value;

use super::RunTable;

pub(crate) fn export_to_json_impl(
    table: &RunTable,
    file: std::fs::File,
) -> Result<(), Box<dyn std::error::Error>> {
    let rows: Vec<serde_json::Value> = table
        .rows
        .iter()
        .map(|row| {
            let mut object = Map::new();
            object.insert("run".to_string(), row.run.into());
            for (column, cell) in table.columns.iter().zip(&row.cells) {
                let value = cell.as_ref().map_or(serde_json::Value::Null, plain_json);
                object.insert(column.clone(), value);
            }
            serde_json::Value::Object(object)
        })
        .collect();
    serde_json::to_writer_pretty(file, &rows)?;
    Ok(())
}

/// Scalars as bare JSON; composites keep their tagged encoding.
fn plain_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(flag) => (*flag).into(),
        Value::Int(number) => (*number).into(),
        Value::Float(number) => Number::from_f64(*number)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(text) => text.clone().into(),
        composite => serde_json::to_value(composite).unwrap_or(serde_json::Value::Null),
    }
}
