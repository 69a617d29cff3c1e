//! Error types for the mailbench pipeline
//!
//! This module provides comprehensive error handling using thiserror for
//! structured error definitions and anyhow for error propagation.

use thiserror::Error;

/// Main error type for mailbench operations
#[derive(Error, Debug)]
pub enum MailbenchError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Classification call failed (network, non-conforming JSON, or validation)
    #[error("Classification failed: {0}")]
    Classification(String),

    /// Email file could not be parsed
    #[error("Email parse error: {0}")]
    EmailParse(String),

    /// Benchmark not found
    #[error("Benchmark not found: {0}")]
    BenchmarkNotFound(String),

    /// Email not found
    #[error("Email not found: {0}")]
    EmailNotFound(String),

    /// Invalid identifier format
    #[error("Invalid id: {0}")]
    InvalidId(#[from] uuid::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Archive creation error
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for mailbench operations
pub type Result<T> = std::result::Result<T, MailbenchError>;

/// Convert anyhow::Error to MailbenchError
impl From<anyhow::Error> for MailbenchError {
    fn from(err: anyhow::Error) -> Self {
        MailbenchError::Other(err.to_string())
    }
}
