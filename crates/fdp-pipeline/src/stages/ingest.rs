//! Load the raw CSV into the relational store

use fdp_common::Result;
use std::path::Path;
use tracing::info;

use crate::artifact::read_table;
use crate::store::RelationalStore;

/// Outcome of an Ingest run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub table: String,
    pub columns: usize,
    pub rows: u64,
}

/// Replace `table_name` with the contents of `source`
///
/// The file is read fully before the store is touched, so an unreadable
/// file leaves the existing table alone.
pub async fn run(store: &dyn RelationalStore, source: &Path, table_name: &str) -> Result<IngestReport> {
    let table = read_table(source)?;

    info!(
        path = %source.display(),
        columns = table.columns.len(),
        rows = table.len(),
        "Loaded raw file"
    );

    let rows = store.replace_table(table_name, &table).await?;

    Ok(IngestReport {
        table: table_name.to_string(),
        columns: table.columns.len(),
        rows,
    })
}
