use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use traj_core::Value;

use super::RunTable;

pub(crate) fn export_to_parquet_impl(
    table: &RunTable,
    file: std::fs::File,
) -> Result<(), Box<dyn std::error::Error>> {
    let batch = build_record_batch(table)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Int,
    Float,
    Bool,
    Text,
}

impl ColumnType {
    fn data_type(self) -> DataType {
        match self {
            Self::Int => DataType::Int64,
            Self::Float => DataType::Float64,
            Self::Bool => DataType::Boolean,
            Self::Text => DataType::Utf8,
        }
    }
}

fn column_type<'a>(cells: impl Iterator<Item = &'a Value>) -> ColumnType {
    let mut current: Option<ColumnType> = None;
    for value in cells {
        let next = match value {
            Value::Int(_) => ColumnType::Int,
            Value::Float(_) => ColumnType::Float,
            Value::Bool(_) => ColumnType::Bool,
            _ => ColumnType::Text,
        };
        current = Some(match (current, next) {
            (None, next) => next,
            (Some(seen), next) if seen == next => seen,
            (Some(ColumnType::Int), ColumnType::Float) | (Some(ColumnType::Float), ColumnType::Int) => {
                ColumnType::Float
            }
            _ => ColumnType::Text,
        });
    }
    current.unwrap_or(ColumnType::Text)
}

fn build_record_batch(table: &RunTable) -> Result<RecordBatch, arrow::error::ArrowError> {
    let mut fields = vec![Field::new("run", DataType::UInt64, false)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(UInt64Array::from(
        table
            .rows
            .iter()
            .map(|row| row.run as u64)
            .collect::<Vec<_>>(),
    ))];

    for (position, column) in table.columns.iter().enumerate() {
        let cells: Vec<Option<&Value>> = table
            .rows
            .iter()
            .map(|row| row.cells[position].as_ref())
            .collect();
        let kind = column_type(cells.iter().flatten().copied());
        fields.push(Field::new(column, kind.data_type(), true));
        arrays.push(build_array(kind, &cells));
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
}

fn build_array(kind: ColumnType, cells: &[Option<&Value>]) -> ArrayRef {
    match kind {
        ColumnType::Int => Arc::new(Int64Array::from(
            cells
                .iter()
                .map(|cell| cell.and_then(Value::as_i64))
                .collect::<Vec<_>>(),
        )),
        ColumnType::Float => Arc::new(Float64Array::from(
            cells
                .iter()
                .map(|cell| cell.and_then(Value::as_f64))
                .collect::<Vec<_>>(),
        )),
        ColumnType::Bool => Arc::new(BooleanArray::from(
            cells
                .iter()
                .map(|cell| cell.and_then(Value::as_bool))
                .collect::<Vec<_>>(),
        )),
        ColumnType::Text => Arc::new(StringArray::from(
            cells
                .iter()
                .map(|cell| cell.map(ToString::to_string))
                .collect::<Vec<_>>(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_numeric_column_widens_to_float() {
        let cells = [Value::from(1), Value::from(2.5)];
        assert_eq!(column_type(cells.iter()), ColumnType::Float);
        let cells = [Value::from(1), Value::from("a")];
        assert_eq!(column_type(cells.iter()), ColumnType::Text);
        assert_eq!(column_type(std::iter::empty()), ColumnType::Text);
    }
}
