//! Error types for the Zarr storage boundary.

use chunked_array::ArrayError;
use thiserror::Error;

/// Errors that can occur while reading or writing datasets.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open a store, group or array.
    #[error("failed to open {path}: {message}")]
    OpenFailed { path: String, message: String },

    /// Failed to read data from an array.
    #[error("failed to read {path}: {message}")]
    ReadFailed { path: String, message: String },

    /// Failed to write data or metadata.
    #[error("failed to write {path}: {message}")]
    WriteFailed { path: String, message: String },

    /// Array metadata is missing required attributes or is inconsistent.
    #[error("invalid metadata for {path}: {message}")]
    InvalidMetadata { path: String, message: String },

    /// Append target already holds a coordinate with different values.
    #[error("coordinate '{axis}' in {path} differs from the data being appended")]
    CoordinateMismatch { path: String, axis: String },

    /// The requested store or variable does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid storage configuration.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Error from the array layer.
    #[error(transparent)]
    Array(#[from] ArrayError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Create an OpenFailed error.
    pub fn open_failed(path: impl Into<String>, message: impl ToString) -> Self {
        Self::OpenFailed {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a ReadFailed error.
    pub fn read_failed(path: impl Into<String>, message: impl ToString) -> Self {
        Self::ReadFailed {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a WriteFailed error.
    pub fn write_failed(path: impl Into<String>, message: impl ToString) -> Self {
        Self::WriteFailed {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(path: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidMetadata {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
