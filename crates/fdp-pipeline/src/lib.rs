//! FDP Pipeline Library
//!
//! Daily batch job for the fraud-transaction dataset.
//!
//! # Stages
//!
//! - **Ingest**: raw CSV into a PostgreSQL table (drop and recreate)
//! - **Extract**: the table back out to CSV
//! - **Normalize**: clean the extracted CSV
//! - **Index**: upsert one Elasticsearch document per cleaned row
//!
//! # Example
//!
//! ```no_run
//! use fdp_pipeline::config::PipelineConfig;
//! use fdp_pipeline::pipeline::{Pipeline, Stage};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::load(None)?;
//!     let pipeline = Pipeline::new(config);
//!
//!     // Re-run cleaning only
//!     pipeline.run_stage(Stage::Normalize).await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod artifact;
pub mod config;
pub mod pipeline;
pub mod scheduler;
pub mod search;
pub mod stages;
pub mod store;

pub use config::PipelineConfig;
pub use pipeline::{Pipeline, Stage, StageReport};
