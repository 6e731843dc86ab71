//! Error types for the merge pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while scanning, loading, merging or writing.
///
/// Per-file errors (`Csv`, `Spreadsheet`, `Schema`, `UnsupportedFormat` and
/// `Io` raised while reading a source) are caught at the pipeline boundary and
/// turned into a logged skip. Everything else aborts the run.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Source file unreadable or output location unwritable.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV content in a source file.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed or unreadable spreadsheet content in a source file.
    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    /// Required subject key column missing or invalid after normalization.
    #[error("{context}: {message}")]
    Schema { context: String, message: String },

    /// File extension not recognized by any reader.
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// No component survived to finalization; there is nothing to write.
    #[error("no data merged: every component failed to load")]
    EmptyMerge,

    /// The input directory contained no matching component files.
    #[error("no '*_clean.(csv|xlsx|xls)' files found in {0}")]
    NoMatchingFiles(PathBuf),

    /// Required configuration value missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Error from Arrow compute or schema operations.
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from Parquet serialization.
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl MergeError {
    /// Builds a [`MergeError::Schema`] with a source-file context.
    pub fn schema(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            context: context.into(),
            message: message.into(),
        }
    }
}

/// Result type for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;
