//! The four pipeline stages
//!
//! Each stage reads one persisted artifact and writes the next:
//!
//! - [`ingest`]: raw CSV to relational table
//! - [`extract`]: relational table to CSV
//! - [`normalize`]: extracted CSV to cleaned CSV
//! - [`index`]: cleaned CSV to search documents

pub mod extract;
pub mod index;
pub mod ingest;
pub mod normalize;

pub use extract::ExtractReport;
pub use index::IndexReport;
pub use ingest::IngestReport;
pub use normalize::{NormalizeReport, NormalizeStats};
