//! Document-search boundary
//!
//! Index sends one JSON document per cleaned row, keyed by its 1-based row
//! position. Writes are upserts: an existing id is overwritten.

use async_trait::async_trait;
use fdp_common::Result;

pub mod elasticsearch;

pub use elasticsearch::ElasticsearchClient;

/// A JSON object indexed as one document
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Result of one document within a bulk request
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemOutcome {
    pub id: u64,
    /// HTTP-style status reported for the item
    pub status: u16,
    /// Service error body when the item was rejected
    pub error: Option<serde_json::Value>,
}

impl BulkItemOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

/// A document index that supports upserts by id
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create or overwrite document `id` in `index`, returning the service response
    async fn upsert(&self, index: &str, id: u64, doc: &Document) -> Result<serde_json::Value>;

    /// Upsert several documents, reporting an outcome per document
    ///
    /// Only transport failures return `Err`. The default sends one upsert
    /// per document.
    async fn bulk_upsert(&self, index: &str, docs: &[(u64, Document)]) -> Result<Vec<BulkItemOutcome>> {
        let mut outcomes = Vec::with_capacity(docs.len());
        for (id, doc) in docs {
            let outcome = match self.upsert(index, *id, doc).await {
                Ok(_) => BulkItemOutcome {
                    id: *id,
                    status: 200,
                    error: None,
                },
                Err(e) => BulkItemOutcome {
                    id: *id,
                    status: 0,
                    error: Some(serde_json::Value::String(e.to_string())),
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
