//! Error types for chunked array operations.

use thiserror::Error;

/// Errors that can occur while building or evaluating a chunked array.
///
/// Errors are `Clone` because a failed block may be handed to every task
/// that reads it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArrayError {
    /// The named axis does not exist on the array.
    #[error("axis not found: {0}")]
    AxisNotFound(String),

    /// Two arrays that must share coordinates do not.
    #[error("axis mismatch: {left} vs {right}")]
    AxisMismatch { left: String, right: String },

    /// Data length does not match the axis shape.
    #[error("shape mismatch: expected {expected} elements, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Invalid chunk specification.
    #[error("invalid chunking: {0}")]
    InvalidChunking(String),

    /// A core dimension of a ufunc spans more than one chunk.
    #[error("core dimension '{axis}' spans {chunks} chunks; rechunk it into a single chunk first")]
    CoreDimensionChunked { axis: String, chunks: usize },

    /// A kernel produced output with an unexpected length.
    #[error("kernel output {index} has {actual} values, expected {expected}")]
    KernelOutput {
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// Coordinate values are not usable for the requested operation.
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// A selection produced no elements.
    #[error("empty selection: {0}")]
    EmptySelection(String),

    /// A chunk index is outside the array's chunk grid.
    #[error("chunk {index} does not exist (array has {count} chunks)")]
    MissingChunk { index: usize, count: usize },

    /// A dataset has no variable with this name.
    #[error("variable not found: {0}")]
    VariableNotFound(String),

    /// A lazily loaded chunk could not be read from its source.
    #[error("failed to load chunk {chunk} of {path}: {message}")]
    LoadFailed {
        path: String,
        chunk: usize,
        message: String,
    },

    /// A cached block did not have the element type of its task.
    #[error("evaluation error: {0}")]
    Evaluation(String),
}

impl ArrayError {
    /// Create an AxisNotFound error.
    pub fn axis_not_found(name: impl Into<String>) -> Self {
        Self::AxisNotFound(name.into())
    }

    /// Create an AxisMismatch error.
    pub fn axis_mismatch(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::AxisMismatch {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Create an InvalidChunking error.
    pub fn invalid_chunking(msg: impl Into<String>) -> Self {
        Self::InvalidChunking(msg.into())
    }

    /// Create an InvalidCoordinate error.
    pub fn invalid_coordinate(msg: impl Into<String>) -> Self {
        Self::InvalidCoordinate(msg.into())
    }

    /// Create a VariableNotFound error.
    pub fn variable_not_found(name: impl Into<String>) -> Self {
        Self::VariableNotFound(name.into())
    }

    /// Create a LoadFailed error.
    pub fn load_failed(path: impl Into<String>, chunk: usize, message: impl ToString) -> Self {
        Self::LoadFailed {
            path: path.into(),
            chunk,
            message: message.to_string(),
        }
    }
}

/// Result type for chunked array operations.
pub type Result<T> = std::result::Result<T, ArrayError>;
