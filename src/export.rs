//! Table listing and CSV export from a stored document.

use std::{fs::File, io, path::Path};

use anyhow::{Context, Result, anyhow, bail};
use log::info;

use crate::{
    cli::TablesArgs,
    document::NormalizedDocument,
    io_utils,
    table::{TableDefinition, cell_text, render_table},
};

pub fn execute(args: &TablesArgs) -> Result<()> {
    let doc: NormalizedDocument = io_utils::read_json(&args.input)
        .with_context(|| format!("Reading document from {:?}", args.input))?;
    let selected = select_tables(&doc, args.field.as_deref())?;

    if let Some(path) = &args.csv {
        let [(field_id, table)] = selected.as_slice() else {
            bail!(
                "CSV export needs exactly one table; use --field to pick one of {} table(s)",
                selected.len()
            );
        };
        export_table(table, path)?;
        info!(
            "Exported table '{field_id}' ({} row(s)) to {:?}",
            table.metadata.row_count, path
        );
        return Ok(());
    }

    if selected.is_empty() {
        info!("Document {:?} does not contain any tables", args.input);
        return Ok(());
    }
    for (position, (field_id, table)) in selected.iter().enumerate() {
        if position > 0 {
            println!();
        }
        println!(
            "{field_id} ({} row(s), detected by {})",
            table.metadata.row_count, table.metadata.detector
        );
        print!("{}", render_table(table));
    }
    Ok(())
}

/// The table stored under `field`, or every table when no field is named.
fn select_tables<'d>(
    doc: &'d NormalizedDocument,
    field: Option<&str>,
) -> Result<Vec<(&'d str, &'d TableDefinition)>> {
    match field {
        Some(field_id) => {
            let (field_id, table) = doc
                .tables
                .get_key_value(field_id)
                .ok_or_else(|| anyhow!("Document has no table named '{field_id}'"))?;
            Ok(vec![(field_id.as_str(), table)])
        }
        None => Ok(doc
            .tables
            .iter()
            .map(|(field_id, table)| (field_id.as_str(), table))
            .collect()),
    }
}

/// Writes one table as CSV to `path`, or to stdout for `-`.
pub fn export_table(table: &TableDefinition, path: &Path) -> Result<()> {
    if io_utils::is_dash(path) {
        return write_table_csv(table, io::stdout().lock());
    }
    let file = File::create(path).with_context(|| format!("Creating {path:?}"))?;
    write_table_csv(table, file)
}

/// Writes a table as CSV, header row taken from column ids.
pub fn write_table_csv<W: io::Write>(table: &TableDefinition, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer
        .write_record(table.columns().iter().map(|column| column.id.as_str()))
        .context("Writing CSV header")?;
    for (row_idx, row) in table.rows.iter().enumerate() {
        let record = table
            .columns()
            .iter()
            .map(|column| row.get(&column.id).map(cell_text).unwrap_or_default());
        csv_writer
            .write_record(record)
            .with_context(|| format!("Writing CSV row {}", row_idx + 1))?;
    }
    csv_writer.flush().context("Flushing CSV output")?;
    Ok(())
}
