//! FDP Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the fraud data pipeline.
//!
//! # Overview
//!
//! - **Error Handling**: `PipelineError` and the `Result` alias
//! - **Logging**: tracing subscriber setup driven by `LogConfig`
//! - **Checksums**: artifact fingerprints for run-to-run comparison
//! - **Types**: the in-memory table model shared by every stage
//!
//! # Example
//!
//! ```no_run
//! use fdp_common::checksum::compute_file_checksum;
//! use fdp_common::Result;
//!
//! fn fingerprint(path: &str) -> Result<()> {
//!     let checksum = compute_file_checksum(path)?;
//!     tracing::info!(%checksum, path, "artifact written");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use types::{ColumnType, Table, Value};
