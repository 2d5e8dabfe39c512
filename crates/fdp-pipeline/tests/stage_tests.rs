//! Stage integration tests
//!
//! Ingest and Extract run against an in-memory store; Index runs against a
//! wiremock stand-in for the Elasticsearch REST API.

use anyhow::Result;
use async_trait::async_trait;
use fdp_common::{PipelineError, Table};
use fdp_pipeline::config::{NormalizeConfig, PipelineConfig};
use fdp_pipeline::search::ElasticsearchClient;
use fdp_pipeline::stages::{extract, index, ingest, normalize};
use fdp_pipeline::store::RelationalStore;
use fdp_pipeline::{Pipeline, Stage, StageReport};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RAW_CSV: &str = "\
Date,Amount,Gender,Age,Bank,Fraud
01-Jan-20,£50.00,F,29.9,Barlcays,0
18-Jun-24,£123.45,M,41,HSBC,1
18-Jun-24,£123.45,M,41,HSBC,1
19-Jun-24,,F,30,Monzo,0
";

/// Initialize tracing for tests
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,fdp_pipeline=debug")),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct MemoryStore {
    tables: Mutex<HashMap<String, Table>>,
}

#[async_trait]
impl RelationalStore for MemoryStore {
    async fn replace_table(&self, name: &str, table: &Table) -> fdp_common::Result<u64> {
        self.tables
            .lock()
            .unwrap()
            .insert(name.to_string(), table.clone());
        Ok(table.len() as u64)
    }

    async fn select_all(&self, name: &str) -> fdp_common::Result<Table> {
        self.tables
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::query(format!("table {} does not exist", name)))
    }
}

fn write_raw(dir: &Path) -> std::path::PathBuf {
    let raw = dir.join("fraud_data.csv");
    std::fs::write(&raw, RAW_CSV).unwrap();
    raw
}

async fn mount_doc(server: &MockServer, id: u64, status: u16) {
    Mock::given(method("PUT"))
        .and(path(format!("/fraud_data/_doc/{}", id)))
        .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({"result": "created"})))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_ingest_then_extract_round_trips_raw_file() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let raw = write_raw(dir.path());
    let extracted = dir.path().join("fraud_data_raw.csv");
    let store = MemoryStore::default();

    let ingested = ingest::run(&store, &raw, "fraud_data_table").await?;
    assert_eq!(ingested.rows, 4);
    assert_eq!(ingested.columns, 6);

    let report = extract::run(&store, "fraud_data_table", &extracted).await?;
    assert_eq!(report.rows, 4);

    let written = std::fs::read_to_string(&extracted)?;
    assert_eq!(
        written,
        "Date,Amount,Gender,Age,Bank,Fraud\n\
         01-Jan-20,£50.00,F,29.9,Barlcays,0\n\
         18-Jun-24,£123.45,M,41.0,HSBC,1\n\
         18-Jun-24,£123.45,M,41.0,HSBC,1\n\
         19-Jun-24,,F,30.0,Monzo,0\n"
    );
    Ok(())
}

#[tokio::test]
async fn test_ingest_missing_file_leaves_table_untouched() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = MemoryStore::default();
    ingest::run(&store, &write_raw(dir.path()), "fraud_data_table").await?;

    let err = ingest::run(&store, &dir.path().join("missing.csv"), "fraud_data_table")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Io(_)));
    assert_eq!(store.select_all("fraud_data_table").await?.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_extract_unknown_table_is_query_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let dest = dir.path().join("out.csv");

    let err = extract::run(&MemoryStore::default(), "fraud_data_table", &dest)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Query(_)));
    assert!(!dest.exists());
    Ok(())
}

#[tokio::test]
async fn test_index_assigns_sequential_ids() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let raw = write_raw(dir.path());
    let cleaned = dir.path().join("fraud_data_clean.csv");
    let report = normalize::run(&raw, &cleaned, &NormalizeConfig::default())?;
    assert_eq!(report.stats.rows_written, 2);

    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/fraud_data/_doc/1"))
        .and(wiremock::matchers::body_json(serde_json::json!({
            "date": "2020-01-01",
            "amount": 50.0,
            "gender": "Female",
            "age": 29,
            "bank": "Barclays",
            "fraud": "Legitimate"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"result": "created"})))
        .expect(1)
        .mount(&server)
        .await;
    mount_doc(&server, 2, 201).await;

    let config = PipelineConfig::default();
    let client = ElasticsearchClient::new(&fdp_pipeline::config::SearchConfig {
        endpoint: server.uri(),
        ..config.search
    })?;

    let report = index::run(&client, &cleaned, "fraud_data", 1).await?;
    assert_eq!(report.indexed, 2);
    assert!(report.failed.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_index_continues_past_rejected_document() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let cleaned = dir.path().join("fraud_data_clean.csv");
    std::fs::write(
        &cleaned,
        "date,amount,bank\n2024-06-18,1.0,HSBC\n2024-06-19,2.0,HSBC\n2024-06-20,3.0,HSBC\n",
    )?;

    let server = MockServer::start().await;
    mount_doc(&server, 1, 201).await;
    mount_doc(&server, 2, 400).await;
    mount_doc(&server, 3, 201).await;

    let client = ElasticsearchClient::new(&fdp_pipeline::config::SearchConfig {
        endpoint: server.uri(),
        ..Default::default()
    })?;

    let err = index::run(&client, &cleaned, "fraud_data", 1).await.unwrap_err();
    match err {
        PipelineError::Indexing(msg) => assert_eq!(msg, "1 of 3 documents failed: ids 2"),
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_index_bulk_batches() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let cleaned = dir.path().join("fraud_data_clean.csv");
    std::fs::write(
        &cleaned,
        "date,amount\n2024-06-18,1.0\n2024-06-19,2.0\n2024-06-20,3.0\n",
    )?;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(wiremock::matchers::body_string_contains("\"_id\":\"3\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errors": false,
            "items": [{"index": {"_id": "3", "status": 201}}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(wiremock::matchers::body_string_contains("\"_id\":\"1\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "errors": false,
            "items": [
                {"index": {"_id": "1", "status": 201}},
                {"index": {"_id": "2", "status": 200}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ElasticsearchClient::new(&fdp_pipeline::config::SearchConfig {
        endpoint: server.uri(),
        bulk_size: 2,
        ..Default::default()
    })?;

    let report = index::run(&client, &cleaned, "fraud_data", 2).await?;
    assert_eq!(report.indexed, 3);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_runs_normalize_and_index_stages() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let extracted = dir.path().join("fraud_data_raw.csv");
    std::fs::write(&extracted, RAW_CSV)?;

    let server = MockServer::start().await;
    mount_doc(&server, 1, 201).await;
    mount_doc(&server, 2, 201).await;

    let mut config = PipelineConfig::default();
    config.paths.extracted = extracted;
    config.paths.cleaned = dir.path().join("out").join("fraud_data_clean.csv");
    config.search.endpoint = server.uri();
    let pipeline = Pipeline::new(config);

    let report = pipeline.run_stage(Stage::Normalize).await?;
    assert_eq!(report.stage(), Stage::Normalize);
    assert!(pipeline.config().paths.cleaned.exists());

    match pipeline.run_stage(Stage::Index).await? {
        StageReport::Index(report) => assert_eq!(report.indexed, 2),
        other => panic!("unexpected report: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_run_all_stops_at_first_failure() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;

    let mut config = PipelineConfig::default();
    config.paths.raw = write_raw(dir.path());
    config.paths.extracted = dir.path().join("fraud_data_raw.csv");
    config.paths.cleaned = dir.path().join("fraud_data_clean.csv");
    config.database.url = "postgresql://postgres@127.0.0.1:1/fdp".to_string();
    config.database.connect_timeout_secs = 1;

    let err = Pipeline::new(config.clone()).run_all().await.unwrap_err();
    assert!(matches!(err, PipelineError::Connection(_)));
    assert!(!config.paths.extracted.exists());
    assert!(!config.paths.cleaned.exists());
    Ok(())
}
