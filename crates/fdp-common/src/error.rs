//! Error types for the fraud data pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the pipeline
///
/// Variants follow the failure taxonomy of the stages: file boundary
/// (`Io`, `Csv`), relational store (`Connection`, `Schema`, `Query`), cleaning
/// (`Parse`, `MissingColumn`) and search index (`Indexing`, `Http`).
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The relational store could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// The store rejected a DDL or insert statement during table replacement
    #[error("Schema error: {0}")]
    Schema(String),

    /// The store rejected a read (missing table, failed select)
    #[error("Query error: {0}")]
    Query(String),

    /// A cell could not be converted during normalization
    #[error("Parse error in column '{column}' at row {row}: {message}")]
    Parse {
        column: String,
        row: usize,
        message: String,
    },

    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// One or more documents were not accepted by the search index
    #[error("Indexing error: {0}")]
    Indexing(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create a query error
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Create a parse error for a cell
    pub fn parse(column: impl Into<String>, row: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            column: column.into(),
            row,
            message: message.into(),
        }
    }

    /// Create an indexing error
    pub fn indexing(msg: impl Into<String>) -> Self {
        Self::Indexing(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
