//! Delimited-file hand-off between stages
//!
//! Every artifact is comma-separated with a header row and no synthetic
//! index column. Writes go to a temporary file next to the destination and
//! are renamed into place only once complete, so a failed stage never
//! leaves a truncated artifact behind.

use fdp_common::checksum::compute_file_checksum;
use fdp_common::types::is_missing;
use fdp_common::{PipelineError, Result, Table};
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Read a CSV artifact into a table, inferring column types
pub fn read_table(path: &Path) -> Result<Table> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(file);

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| (!is_missing(field)).then(|| field.to_string()))
                .collect(),
        );
    }

    debug!(path = %path.display(), columns = columns.len(), rows = rows.len(), "Read artifact");

    Ok(Table::from_text_rows(columns, rows))
}

/// Atomically write a table as a CSV artifact
///
/// Returns the SHA-256 of the written file.
pub fn write_table(table: &Table, path: &Path) -> Result<String> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let staged = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(staged.as_file());

        writer.write_record(&table.columns)?;
        for row in &table.rows {
            writer.write_record(row.iter().map(|value| value.to_string()))?;
        }
        writer.flush()?;
    }
    staged.as_file().sync_all()?;

    staged
        .persist(path)
        .map_err(|e| PipelineError::Io(e.error))?;

    let checksum = compute_file_checksum(path)?;
    debug!(path = %path.display(), rows = table.len(), %checksum, "Wrote artifact");

    Ok(checksum)
}
