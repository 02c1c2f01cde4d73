//! Error types for stash_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using stash_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during store operations.
///
/// `DuplicateFile` and `FileNotFound` are expected per-item outcomes of
/// batch operations; callers branch on them instead of treating them as
/// failures. Everything else is an unexpected storage-layer error.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Catalog (SQLite) error.
    #[error("Catalog error: {source}")]
    Sqlx {
        #[from]
        source: sqlx::Error,
    },

    /// Catalog storage is missing or its schema is unrecognized.
    #[error("Invalid metadata at {path}: {reason}")]
    InvalidMetadata { path: PathBuf, reason: String },

    /// The name is already cataloged (expected condition on add).
    #[error("File already in the repository: {name}")]
    DuplicateFile { name: String },

    /// The name is not cataloged (expected condition on get/remove).
    #[error("File not found in the repository: {name}")]
    FileNotFound { name: String },

    /// No blob exists for the digest.
    #[error("Blob not found: {digest}")]
    BlobNotFound { digest: String },

    /// Invalid digest format or encoding.
    #[error("Invalid digest: {reason}")]
    InvalidDigest { reason: String },
}

impl Error {
    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidMetadata {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a DuplicateFile error.
    pub fn duplicate_file(name: impl Into<String>) -> Self {
        Error::DuplicateFile { name: name.into() }
    }

    /// Create a FileNotFound error.
    pub fn file_not_found(name: impl Into<String>) -> Self {
        Error::FileNotFound { name: name.into() }
    }

    /// Create a BlobNotFound error.
    pub fn blob_not_found(digest: impl Into<String>) -> Self {
        Error::BlobNotFound {
            digest: digest.into(),
        }
    }

    /// Create an InvalidDigest error.
    pub fn invalid_digest(reason: impl Into<String>) -> Self {
        Error::InvalidDigest {
            reason: reason.into(),
        }
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}
