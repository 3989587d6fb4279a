//! Error types for index and trend computation.

use chrono::NaiveDate;
use chunked_array::ArrayError;
use thiserror::Error;

/// Errors that can occur while deriving indices or trends.
///
/// These are structural: they fail the whole computation. Per-cell trend
/// problems are reported through [`TrendError`] and never escape the kernel.
#[derive(Error, Debug)]
pub enum IndicesError {
    /// Error from the array layer (axis mismatch, chunking, ...).
    #[error(transparent)]
    Array(#[from] ArrayError),

    /// A field's units tag contradicts the units the operation expects.
    #[error("unit mismatch for '{variable}': expected {expected}, found {found}")]
    UnitMismatch {
        variable: String,
        expected: String,
        found: String,
    },

    /// The baseline period selects no time steps.
    #[error("baseline period {start}..={end} selects no data")]
    EmptyBaseline { start: NaiveDate, end: NaiveDate },

    /// A required axis is absent.
    #[error("'{variable}' has no {axis} axis")]
    MissingAxis { variable: String, axis: String },

    /// Configuration error.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl IndicesError {
    /// Create a UnitMismatch error.
    pub fn unit_mismatch(
        variable: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::UnitMismatch {
            variable: variable.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a MissingAxis error.
    pub fn missing_axis(variable: impl Into<String>, axis: impl Into<String>) -> Self {
        Self::MissingAxis {
            variable: variable.into(),
            axis: axis.into(),
        }
    }
}

/// Result type for index and trend computation.
pub type Result<T> = std::result::Result<T, IndicesError>;

/// Why a single series produced no trend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrendError {
    /// Too few valid years after dropping missing values.
    #[error("only {valid} valid years, need at least {required}")]
    InsufficientHistory { valid: usize, required: usize },

    /// The statistic could not be computed (non-finite intermediate).
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
}
