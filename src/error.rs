//! Custom error types for corpusmerge.
//!
//! This module defines all error types used throughout the merge pipeline.
//! All functions return `Result<T, MergeError>` instead of using `unwrap()`.
//!
//! Field disagreements between sources are never errors; they are counted in
//! the [`ConflictReport`](crate::report::ConflictReport). The variants below
//! are either I/O failures or faults that signal inconsistent precomputed
//! inputs and must abort the run.

use thiserror::Error;

/// Main error type for corpusmerge operations.
#[derive(Debug, Error)]
pub enum MergeError {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Parquet shard could not be opened or decoded
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow record batch error while scanning a shard
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Parse error for inputs that are not line records (tables, predicates)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Primary entry has no entry in the match index
    #[error("No match index entry for primary id {primary_id}")]
    MissingMatch { primary_id: String },

    /// Match index references a graph record that was never loaded
    #[error("Graph record {graph_id} (matched to primary id {primary_id}) not in graph store")]
    MissingGraphRecord {
        graph_id: String,
        primary_id: String,
    },

    /// Requested DOI was not found in any remaining full-text window.
    /// The DOI order list is out of sync with the merge scan.
    #[error("DOI {doi} not found in full-text windows (stopped at window {window} of {windows}); ordered DOI list is stale")]
    WindowExhausted {
        doi: String,
        window: usize,
        windows: usize,
    },
}

/// Result type alias using `MergeError`
pub type Result<T> = std::result::Result<T, MergeError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| MergeError::Parse(msg.to_string()))
    }
}
