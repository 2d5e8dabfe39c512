//! Dump the relational table to CSV

use fdp_common::Result;
use std::path::Path;
use tracing::info;

use crate::artifact::write_table;
use crate::store::RelationalStore;

/// Outcome of an Extract run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    pub columns: usize,
    pub rows: usize,
    /// SHA-256 of the written file
    pub checksum: String,
}

/// Write every row of `table_name` to `dest`
pub async fn run(store: &dyn RelationalStore, table_name: &str, dest: &Path) -> Result<ExtractReport> {
    let table = store.select_all(table_name).await?;
    let checksum = write_table(&table, dest)?;

    info!(
        path = %dest.display(),
        rows = table.len(),
        %checksum,
        "Extracted table"
    );

    Ok(ExtractReport {
        columns: table.columns.len(),
        rows: table.len(),
        checksum,
    })
}
