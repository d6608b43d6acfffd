//! Error types for backup operations

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type for backup operations
pub type BackupResult<T> = Result<T, BackupError>;

/// Errors that can occur while reading the catalog or persisting the artifact
#[derive(Error, Debug)]
pub enum BackupError {
    /// Invalid configuration, detected before any I/O
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Connecting to the database failed
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A catalog or row query failed
    #[error("Catalog query failed: {0}")]
    Catalog(String),

    /// A fetched value could not be decoded into a SQL literal
    #[error("Failed to decode column '{column}' of table '{table}': {reason}")]
    Decode {
        table: String,
        column: String,
        reason: String,
    },

    /// Writing to the output sink failed
    #[error("Sink write failed: {0}")]
    Sink(String),

    /// The streaming upload failed
    #[error("Upload failed: {0}")]
    Upload(String),

    /// An operation exceeded its time budget
    #[error("Operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },
}

impl BackupError {
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        BackupError::Timeout {
            operation: operation.into(),
            timeout,
        }
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        BackupError::Sink(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for BackupError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db) => BackupError::Catalog(format!("{} ({})", db.message(), db.code().code())),
            None if err.is_closed() => BackupError::Connection("connection closed".to_string()),
            None => BackupError::Catalog(err.to_string()),
        }
    }
}

#[cfg(feature = "s3")]
impl From<object_store::Error> for BackupError {
    fn from(err: object_store::Error) -> Self {
        BackupError::Upload(err.to_string())
    }
}

/// Pipeline stages, in the order a run moves through them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupPhase {
    Connecting,
    ListingTables,
    ProcessingTable,
    Finalizing,
    Done,
    Failed,
}

impl fmt::Display for BackupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackupPhase::Connecting => "connecting",
            BackupPhase::ListingTables => "listing_tables",
            BackupPhase::ProcessingTable => "processing_table",
            BackupPhase::Finalizing => "finalizing",
            BackupPhase::Done => "done",
            BackupPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A failed run: the first error plus how far the run got
#[derive(Error, Debug)]
#[error("Backup failed during {phase} after {tables_completed} of {tables_total} tables: {source}")]
pub struct BackupFailure {
    pub phase: BackupPhase,
    pub tables_completed: usize,
    pub tables_total: usize,
    #[source]
    pub source: BackupError,
}

impl BackupFailure {
    /// Failure before any table was listed
    pub fn at(phase: BackupPhase, source: BackupError) -> Self {
        Self {
            phase,
            tables_completed: 0,
            tables_total: 0,
            source,
        }
    }
}
