//! Error and Result types for Tally datastore and query operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for Tally operations.
pub type Result<T> = std::result::Result<T, TallyError>;

/// The error type for datastore, storage and query operations.
#[derive(Debug, Error)]
pub enum TallyError {
    /// The query document, a transform or a filter is malformed, names an
    /// unknown filter, or references a bucket that does not exist.
    #[error("Invalid query: {0}")]
    QueryValidation(String),

    /// The requested bucket does not exist.
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// A bucket with the same id already exists.
    #[error("Bucket already exists: {0}")]
    BucketAlreadyExists(String),

    /// The bucket id cannot be used as a storage key.
    #[error("Invalid bucket id: {0:?}")]
    InvalidBucketId(String),

    /// The storage backend could not be initialized.
    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A persisted record could not be decoded.
    #[error("Corrupt record in {path}: {reason}")]
    CorruptRecord {
        /// File or table holding the record.
        path: PathBuf,
        /// Why decoding failed.
        reason: String,
    },

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Embedded database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl TallyError {
    /// Creates a query validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::QueryValidation(message.into())
    }

    /// Returns true if this error was raised while validating a query.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::QueryValidation(_))
    }
}
