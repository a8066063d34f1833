//! Error types for percolator-rs
//!
//! Structural failures (storage I/O, startup cache load, misuse) surface as
//! [`PercolatorError`]. Per-item failures such as a query that does not parse
//! or an evaluator that fails on one candidate are collected as values
//! instead, see [`crate::api::QueryError`] and [`crate::matchers::MatchError`].

use thiserror::Error;

/// Main error type for percolator operations
#[derive(Error, Debug)]
pub enum PercolatorError {
    /// Database/storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// One or more stored queries could not be rebuilt while warming the cache
    #[error("Error populating cache - {} queries couldn't be parsed: {}", failures.len(), failures.join("; "))]
    CacheLoad { failures: Vec<String> },

    /// Operation not permitted in the current state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Stored query encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic errors
    #[error("Generic error: {0}")]
    Generic(String),
}

/// Result type alias for percolator operations
pub type Result<T> = std::result::Result<T, PercolatorError>;

impl From<anyhow::Error> for PercolatorError {
    fn from(err: anyhow::Error) -> Self {
        PercolatorError::Generic(format!("{:#}", err))
    }
}

impl From<bincode::Error> for PercolatorError {
    fn from(err: bincode::Error) -> Self {
        PercolatorError::Serialization(err.to_string())
    }
}
