//! FDP Pipeline - fraud data batch job

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fdp_common::logging::{init_logging, LogConfig, LogLevel};
use fdp_pipeline::{scheduler, Pipeline, PipelineConfig, Stage};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "fdp-pipeline")]
#[command(author, version, about = "Fraud data pipeline: PostgreSQL to Elasticsearch")]
struct Cli {
    /// What to run
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file
    #[arg(short, long, env = "FDP_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the raw CSV into the relational table
    Ingest,

    /// Dump the relational table to CSV
    Extract,

    /// Clean the extracted CSV
    Normalize,

    /// Index the cleaned CSV into the search service
    Index,

    /// Run all four stages in order
    Run,

    /// Run all four stages on the configured cron schedule
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("fdp-pipeline")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let config = PipelineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let pipeline = Pipeline::new(config);

    match cli.command {
        Command::Ingest => run_stage(&pipeline, Stage::Ingest).await?,
        Command::Extract => run_stage(&pipeline, Stage::Extract).await?,
        Command::Normalize => run_stage(&pipeline, Stage::Normalize).await?,
        Command::Index => run_stage(&pipeline, Stage::Index).await?,
        Command::Run => {
            info!("Running all stages");
            let reports = pipeline.run_all().await.context("Pipeline run failed")?;
            for report in &reports {
                println!("{}", report);
            }
        },
        Command::Schedule => {
            scheduler::run_schedule(&pipeline).await?;
        },
    }

    Ok(())
}

async fn run_stage(pipeline: &Pipeline, stage: Stage) -> Result<()> {
    let report = pipeline
        .run_stage(stage)
        .await
        .with_context(|| format!("Stage {} failed", stage))?;
    println!("{}", report);
    Ok(())
}
