//! Pipeline configuration
//!
//! Every path, connection parameter and cleaning rule comes from here.
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults (the constants below)
//! 2. An optional TOML file passed with `--config`
//! 3. `FDP_*` environment variables (also read from `.env`), with `__`
//!    separating nested keys, e.g. `FDP_DATABASE__URL`, `FDP_SEARCH__BULK_SIZE`

use fdp_common::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::parse_cron;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "FDP";

/// Default raw input file.
pub const DEFAULT_RAW_PATH: &str = "./data/fraud_data.csv";

/// Default file written by Extract.
pub const DEFAULT_EXTRACTED_PATH: &str = "./data/fraud_data_raw.csv";

/// Default file written by Normalize.
pub const DEFAULT_CLEANED_PATH: &str = "./data/fraud_data_clean.csv";

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/fdp";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default relational table name.
pub const DEFAULT_TABLE_NAME: &str = "fraud_data_table";

/// Default number of rows per INSERT statement.
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 1000;

/// Default search service endpoint.
pub const DEFAULT_SEARCH_ENDPOINT: &str = "http://localhost:9200/";

/// Default search index name.
pub const DEFAULT_INDEX_NAME: &str = "fraud_data";

/// Default documents per request (1 = one upsert per row).
pub const DEFAULT_BULK_SIZE: usize = 1;

/// Default search request timeout in seconds.
pub const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 30;

/// Default date format of the raw `date` column (e.g. `18-Jun-24`).
pub const DEFAULT_DATE_FORMAT: &str = "%d-%b-%y";

/// Default currency glyph stripped from `amount`.
pub const DEFAULT_CURRENCY_SYMBOL: &str = "£";

/// Default daily schedule (06:30).
pub const DEFAULT_SCHEDULE: &str = "30 6 * * *";

/// Full pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub database: DatabaseConfig,
    pub search: SearchConfig,
    pub normalize: NormalizeConfig,
    pub schedule: ScheduleConfig,
}

/// Artifact locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Raw input read by Ingest
    pub raw: PathBuf,
    /// Written by Extract, read by Normalize
    pub extracted: PathBuf,
    /// Written by Normalize, read by Index
    pub cleaned: PathBuf,
}

/// Relational store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub table: String,
    pub insert_batch_size: usize,
}

/// Search index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub index: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Documents per request; values above 1 switch to the bulk API
    pub bulk_size: usize,
    pub timeout_secs: u64,
}

/// What Normalize does with a cell that fails to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Fail the whole stage and write nothing
    #[default]
    Abort,
    /// Drop the offending row, log it, and continue
    Skip,
}

/// One exact-match replacement applied to the `bank` column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankCorrection {
    pub from: String,
    pub to: String,
}

/// Cleaning rules for the Normalize stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub date_format: String,
    pub currency_symbol: String,
    pub bank_corrections: Vec<BankCorrection>,
    pub on_error: ErrorPolicy,
}

/// Cron schedule for the `schedule` command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// 5-field (`min hour dom mon dow`) or 6-field cron expression, UTC
    pub cron: String,
    /// Run the pipeline once immediately before waiting for the first tick
    pub run_on_start: bool,
}

impl PipelineConfig {
    /// Load configuration from defaults, an optional file, and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(PipelineError::config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: PipelineConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PipelineError::config(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("paths.raw", &self.paths.raw),
            ("paths.extracted", &self.paths.extracted),
            ("paths.cleaned", &self.paths.cleaned),
        ] {
            if path.as_os_str().is_empty() {
                return Err(PipelineError::config(format!("{} cannot be empty", name)));
            }
        }

        self.database.validate()?;
        self.search.validate()?;

        if self.normalize.date_format.is_empty() {
            return Err(PipelineError::config("normalize.date_format cannot be empty"));
        }

        parse_cron(&self.schedule.cron).map_err(|e| {
            PipelineError::config(format!(
                "schedule.cron '{}' is not a valid cron expression: {}",
                self.schedule.cron, e
            ))
        })?;

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(PipelineError::config("database.url cannot be empty"));
        }
        if self.table.is_empty() {
            return Err(PipelineError::config("database.table cannot be empty"));
        }
        if self.max_connections == 0 {
            return Err(PipelineError::config(
                "database.max_connections must be greater than 0",
            ));
        }
        if self.insert_batch_size == 0 {
            return Err(PipelineError::config(
                "database.insert_batch_size must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Get connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.endpoint).map_err(|e| {
            PipelineError::config(format!("search.endpoint '{}' is invalid: {}", self.endpoint, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PipelineError::config(format!(
                "search.endpoint must be http or https, got: {}",
                url.scheme()
            )));
        }
        if self.index.is_empty() {
            return Err(PipelineError::config("search.index cannot be empty"));
        }
        if self.index != self.index.to_lowercase() {
            return Err(PipelineError::config(format!(
                "search.index must be lowercase, got: {}",
                self.index
            )));
        }
        if self.bulk_size == 0 {
            return Err(PipelineError::config("search.bulk_size must be greater than 0"));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(PipelineError::config(
                "search.password is set but search.username is not",
            ));
        }
        Ok(())
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw: PathBuf::from(DEFAULT_RAW_PATH),
            extracted: PathBuf::from(DEFAULT_EXTRACTED_PATH),
            cleaned: PathBuf::from(DEFAULT_CLEANED_PATH),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            table: DEFAULT_TABLE_NAME.to_string(),
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            index: DEFAULT_INDEX_NAME.to_string(),
            username: None,
            password: None,
            bulk_size: DEFAULT_BULK_SIZE,
            timeout_secs: DEFAULT_SEARCH_TIMEOUT_SECS,
        }
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            currency_symbol: DEFAULT_CURRENCY_SYMBOL.to_string(),
            bank_corrections: vec![BankCorrection {
                from: "Barlcays".to_string(),
                to: "Barclays".to_string(),
            }],
            on_error: ErrorPolicy::Abort,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: DEFAULT_SCHEDULE.to_string(),
            run_on_start: false,
        }
    }
}
