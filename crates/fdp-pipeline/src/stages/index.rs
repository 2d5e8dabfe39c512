//! Send the cleaned CSV to the search index

use fdp_common::{PipelineError, Result, Table};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::{debug, error, info};

use crate::artifact::read_table;
use crate::search::{Document, SearchIndex};

/// Failed ids listed in the stage error before truncating
const MAX_REPORTED_IDS: usize = 20;

/// Outcome of an Index run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: usize,
    pub failed: Vec<u64>,
}

/// One document per row, keyed by 1-based row position
pub fn to_documents(table: &Table) -> Vec<(u64, Document)> {
    table
        .rows
        .iter()
        .zip(1u64..)
        .map(|(row, id)| {
            let doc: Document = table
                .columns
                .iter()
                .zip(row)
                .map(|(column, value)| (column.clone(), value.to_json()))
                .collect();
            (id, doc)
        })
        .collect()
}

/// Upsert every row of `source` into `index`
///
/// A rejected document is logged and indexing carries on. Once every row
/// has been attempted, any failures turn into an `Indexing` error listing
/// the failed ids.
pub async fn run(
    search: &dyn SearchIndex,
    source: &Path,
    index: &str,
    bulk_size: usize,
) -> Result<IndexReport> {
    let table = read_table(source)?;
    let docs = to_documents(&table);
    let total = docs.len();

    info!(path = %source.display(), index, documents = total, bulk_size, "Indexing documents");

    let pb = progress_bar(total as u64);
    let mut report = IndexReport::default();

    if bulk_size <= 1 {
        for (id, doc) in &docs {
            match search.upsert(index, *id, doc).await {
                Ok(response) => {
                    debug!(doc_id = id, response = %response, "Indexed document");
                    report.indexed += 1;
                },
                Err(e) => {
                    error!(doc_id = id, response = %e, "Failed to index document");
                    report.failed.push(*id);
                },
            }
            pb.inc(1);
        }
    } else {
        for chunk in docs.chunks(bulk_size) {
            match search.bulk_upsert(index, chunk).await {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        if outcome.is_success() {
                            report.indexed += 1;
                        } else {
                            let response = outcome
                                .error
                                .map(|e| e.to_string())
                                .unwrap_or_default();
                            error!(
                                doc_id = outcome.id,
                                status = outcome.status,
                                %response,
                                "Failed to index document"
                            );
                            report.failed.push(outcome.id);
                        }
                    }
                },
                Err(e) => {
                    for (id, _) in chunk {
                        error!(doc_id = id, response = %e, "Failed to index document");
                        report.failed.push(*id);
                    }
                },
            }
            pb.inc(chunk.len() as u64);
        }
    }

    pb.finish_and_clear();

    info!(
        index,
        indexed = report.indexed,
        failed = report.failed.len(),
        "Indexing finished"
    );

    if !report.failed.is_empty() {
        return Err(PipelineError::indexing(failure_summary(&report.failed, total)));
    }

    Ok(report)
}

fn failure_summary(failed: &[u64], total: usize) -> String {
    let mut ids: Vec<String> = failed
        .iter()
        .take(MAX_REPORTED_IDS)
        .map(|id| id.to_string())
        .collect();
    if failed.len() > MAX_REPORTED_IDS {
        ids.push("...".to_string());
    }

    format!(
        "{} of {} documents failed: ids {}",
        failed.len(),
        total,
        ids.join(", ")
    )
}

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message("Indexing documents");
    pb
}
