use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the analytics pipeline.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be created or written to disk.
    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The CSV layer rejected the file for a non-I/O reason.
    #[error("Malformed CSV in {path}: {message}")]
    Csv { path: PathBuf, message: String },

    /// A data row carries fewer fields than the header declares.
    #[error("Row at line {line} of {path} has {found} fields, header declares {expected}")]
    MalformedRow {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },

    /// A non-empty cell in a numeric column failed to parse.
    #[error("Invalid numeric value '{value}' in column '{column}' at line {line} of {path}")]
    InvalidNumber {
        path: PathBuf,
        line: u64,
        column: String,
        value: String,
    },

    /// The header is missing a column the pipeline requires.
    #[error("Missing required column '{column}' in {path}")]
    MissingColumn { path: PathBuf, column: String },

    /// A timestamp cell did not match any recognised format.
    #[error("Invalid timestamp '{value}' at line {line} of {path}")]
    Timestamp {
        path: PathBuf,
        line: u64,
        value: String,
    },

    /// The same entity id was loaded twice under the `error` merge policy.
    #[error("Entity '{0}' was already loaded and the merge policy forbids duplicates")]
    DuplicateEntity(String),

    /// No telemetry files were found under the given directory.
    #[error("No CSV telemetry files found in {0}")]
    NoDataFiles(PathBuf),

    /// A report or manifest could not be serialised.
    #[error("Failed to encode JSON: {0}")]
    JsonEncode(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the analytics crates.
pub type Result<T> = std::result::Result<T, AnalyticsError>;
