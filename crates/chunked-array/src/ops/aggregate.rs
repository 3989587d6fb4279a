//! Missing-aware reductions used by resampling and group reductions.

use serde::{Deserialize, Serialize};

use crate::array::Value;

/// Reduction applied to the members of a group.
///
/// Missing values are skipped. A group with no valid members reduces to
/// missing, for every method (including `Sum`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Sum of valid values
    Sum,
    /// Average of valid values
    #[default]
    Mean,
    /// Smallest valid value
    Min,
    /// Largest valid value
    Max,
}

impl Aggregation {
    /// Reduce a group of values.
    pub fn apply(&self, values: &[Value]) -> Value {
        let mut valid = values.iter().filter_map(|v| v.filter(|x| !x.is_nan()));
        let first = valid.next()?;
        match self {
            Aggregation::Sum => Some(valid.fold(first, |acc, v| acc + v)),
            Aggregation::Mean => {
                let (sum, count) = valid.fold((first, 1usize), |(s, n), v| (s + v, n + 1));
                Some(sum / count as f64)
            }
            Aggregation::Min => Some(valid.fold(first, f64::min)),
            Aggregation::Max => Some(valid.fold(first, f64::max)),
        }
    }

    /// Operation label used in task graphs.
    pub fn label(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
        }
    }
}
