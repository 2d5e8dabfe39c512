//! Stage runner
//!
//! Each stage opens the connections it needs and releases them before
//! returning; nothing is shared between stages except the files and the
//! table they leave behind.

use fdp_common::Result;
use std::fmt;
use std::time::Instant;
use tracing::{error, info, info_span, Instrument};

use crate::config::PipelineConfig;
use crate::search::ElasticsearchClient;
use crate::stages::{self, ExtractReport, IndexReport, IngestReport, NormalizeReport};
use crate::store::PostgresStore;

/// One step of the daily run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Ingest,
    Extract,
    Normalize,
    Index,
}

impl Stage {
    /// Every stage in execution order
    pub const ALL: [Stage; 4] = [Stage::Ingest, Stage::Extract, Stage::Normalize, Stage::Index];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Extract => "extract",
            Stage::Normalize => "normalize",
            Stage::Index => "index",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a stage produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageReport {
    Ingest(IngestReport),
    Extract(ExtractReport),
    Normalize(NormalizeReport),
    Index(IndexReport),
}

impl StageReport {
    pub fn stage(&self) -> Stage {
        match self {
            StageReport::Ingest(_) => Stage::Ingest,
            StageReport::Extract(_) => Stage::Extract,
            StageReport::Normalize(_) => Stage::Normalize,
            StageReport::Index(_) => Stage::Index,
        }
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageReport::Ingest(r) => {
                write!(f, "ingest: {} rows x {} columns into {}", r.rows, r.columns, r.table)
            },
            StageReport::Extract(r) => {
                write!(f, "extract: {} rows (sha256 {})", r.rows, r.checksum)
            },
            StageReport::Normalize(r) => write!(
                f,
                "normalize: {} rows read, {} duplicates, {} incomplete, {} rejected, {} written (sha256 {})",
                r.stats.rows_read,
                r.stats.duplicates_removed,
                r.stats.incomplete_removed,
                r.stats.rejected,
                r.stats.rows_written,
                r.checksum
            ),
            StageReport::Index(r) => write!(f, "index: {} documents", r.indexed),
        }
    }
}

/// Runs stages against the configured store, files and index
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run a single stage with inputs taken from configuration
    pub async fn run_stage(&self, stage: Stage) -> Result<StageReport> {
        let span = info_span!("stage", stage = %stage);

        async move {
            info!("Stage started");
            let started = Instant::now();

            let result = match stage {
                Stage::Ingest => self.ingest().await.map(StageReport::Ingest),
                Stage::Extract => self.extract().await.map(StageReport::Extract),
                Stage::Normalize => self.normalize().map(StageReport::Normalize),
                Stage::Index => self.index().await.map(StageReport::Index),
            };

            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(report) => info!(elapsed_ms, "Stage completed: {}", report),
                Err(e) => error!(elapsed_ms, error = %e, "Stage failed"),
            }

            result
        }
        .instrument(span)
        .await
    }

    /// Run Ingest, Extract, Normalize and Index in order, stopping at the
    /// first failure
    pub async fn run_all(&self) -> Result<Vec<StageReport>> {
        let mut reports = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            reports.push(self.run_stage(stage).await?);
        }
        Ok(reports)
    }

    async fn ingest(&self) -> Result<IngestReport> {
        let store = PostgresStore::connect(&self.config.database).await?;
        let result = stages::ingest::run(&store, &self.config.paths.raw, &self.config.database.table).await;
        store.close().await;
        result
    }

    async fn extract(&self) -> Result<ExtractReport> {
        let store = PostgresStore::connect(&self.config.database).await?;
        let result =
            stages::extract::run(&store, &self.config.database.table, &self.config.paths.extracted).await;
        store.close().await;
        result
    }

    fn normalize(&self) -> Result<NormalizeReport> {
        stages::normalize::run(
            &self.config.paths.extracted,
            &self.config.paths.cleaned,
            &self.config.normalize,
        )
    }

    async fn index(&self) -> Result<IndexReport> {
        let client = ElasticsearchClient::new(&self.config.search)?;
        stages::index::run(
            &client,
            &self.config.paths.cleaned,
            &self.config.search.index,
            self.config.search.bulk_size,
        )
        .await
    }
}
