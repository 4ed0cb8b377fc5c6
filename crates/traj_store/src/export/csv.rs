use super::RunTable;

pub(crate) fn export_to_csv_impl(
    table: &RunTable,
    file: std::fs::File,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = csv::Writer::from_writer(file);

    let mut header = Vec::with_capacity(table.columns.len() + 1);
    header.push("run");
    header.extend(table.columns.iter().map(String::as_str));
    wtr.write_record(&header)?;

    for row in &table.rows {
        let mut record = Vec::with_capacity(row.cells.len() + 1);
        record.push(row.run.to_string());
        record.extend(
            row.cells
                .iter()
                .map(|cell| cell.as_ref().map(ToString::to_string).unwrap_or_default()),
        );
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}
