//! Named axes and their coordinate labels.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{ArrayError, Result};

/// Coordinate values along one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum Coord {
    /// Calendar dates (daily fields).
    Time(Vec<NaiveDate>),
    /// Calendar years (annual fields).
    Year(Vec<i32>),
    /// Day-of-year labels, 1..=366.
    DayOfYear(Vec<u32>),
    /// Integer labels without calendar meaning (e.g. window offsets).
    Index(Vec<i64>),
    /// Floating point coordinates (latitude, longitude, levels).
    Values(Vec<f64>),
}

impl Coord {
    /// Number of labels.
    pub fn len(&self) -> usize {
        match self {
            Self::Time(v) => v.len(),
            Self::Year(v) => v.len(),
            Self::DayOfYear(v) => v.len(),
            Self::Index(v) => v.len(),
            Self::Values(v) => v.len(),
        }
    }

    /// Check if there are no labels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name of the coordinate kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Time(_) => "time",
            Self::Year(_) => "year",
            Self::DayOfYear(_) => "dayofyear",
            Self::Index(_) => "index",
            Self::Values(_) => "values",
        }
    }

    /// Labels in `range`, keeping the coordinate kind.
    pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
        match self {
            Self::Time(v) => Self::Time(v[range].to_vec()),
            Self::Year(v) => Self::Year(v[range].to_vec()),
            Self::DayOfYear(v) => Self::DayOfYear(v[range].to_vec()),
            Self::Index(v) => Self::Index(v[range].to_vec()),
            Self::Values(v) => Self::Values(v[range].to_vec()),
        }
    }

    /// Calendar year of the label at `i`, for time and year coordinates.
    pub fn year_at(&self, i: usize) -> Option<i32> {
        match self {
            Self::Time(v) => v.get(i).map(|d| d.year()),
            Self::Year(v) => v.get(i).copied(),
            _ => None,
        }
    }

    /// Day-of-year of the label at `i`, for time and day-of-year coordinates.
    pub fn day_of_year_at(&self, i: usize) -> Option<u32> {
        match self {
            Self::Time(v) => v.get(i).map(|d| d.ordinal()),
            Self::DayOfYear(v) => v.get(i).copied(),
            _ => None,
        }
    }
}

/// A named axis with its coordinate labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    name: String,
    coord: Coord,
}

impl Axis {
    /// Create a new axis.
    pub fn new(name: impl Into<String>, coord: Coord) -> Self {
        Self {
            name: name.into(),
            coord,
        }
    }

    /// Daily time axis.
    pub fn time(name: impl Into<String>, dates: Vec<NaiveDate>) -> Self {
        Self::new(name, Coord::Time(dates))
    }

    /// Annual axis.
    pub fn years(name: impl Into<String>, years: Vec<i32>) -> Self {
        Self::new(name, Coord::Year(years))
    }

    /// Floating point axis (latitude, longitude).
    pub fn values(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, Coord::Values(values))
    }

    /// Axis name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Coordinate labels.
    pub fn coord(&self) -> &Coord {
        &self.coord
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.coord.len()
    }

    /// Check if the axis has no labels.
    pub fn is_empty(&self) -> bool {
        self.coord.is_empty()
    }

    /// The same coordinates under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.coord.clone())
    }

    /// Index range of dates in `[start, end]` (inclusive).
    ///
    /// Requires a time coordinate sorted in ascending order.
    pub fn date_range(&self, start: NaiveDate, end: NaiveDate) -> Result<std::ops::Range<usize>> {
        let Coord::Time(dates) = &self.coord else {
            return Err(ArrayError::invalid_coordinate(format!(
                "axis '{}' is a {} axis, not time",
                self.name,
                self.coord.kind()
            )));
        };
        let lo = dates.partition_point(|d| *d < start);
        let hi = dates.partition_point(|d| *d <= end);
        Ok(lo..hi.max(lo))
    }
}

/// Check that two axis lists are identical in names, order and coordinates.
pub fn ensure_same_axes(left: &[Axis], right: &[Axis]) -> Result<()> {
    if left.len() != right.len() {
        return Err(ArrayError::axis_mismatch(
            describe_axes(left),
            describe_axes(right),
        ));
    }
    for (a, b) in left.iter().zip(right) {
        if a != b {
            return Err(ArrayError::axis_mismatch(
                format!("{}[{}]", a.name(), a.len()),
                format!("{}[{}]", b.name(), b.len()),
            ));
        }
    }
    Ok(())
}

/// Compact description of axes, e.g. `(time[365], latitude[4])`.
pub fn describe_axes(axes: &[Axis]) -> String {
    let parts: Vec<String> = axes
        .iter()
        .map(|a| format!("{}[{}]", a.name(), a.len()))
        .collect();
    format!("({})", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_range_inclusive() {
        let dates: Vec<NaiveDate> = (1..=10).map(|d| date(2000, 1, d)).collect();
        let axis = Axis::time("time", dates);

        assert_eq!(axis.date_range(date(2000, 1, 3), date(2000, 1, 5)).unwrap(), 2..5);
        assert_eq!(axis.date_range(date(1999, 1, 1), date(2000, 1, 1)).unwrap(), 0..1);
        assert!(axis
            .date_range(date(2001, 1, 1), date(2001, 2, 1))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_date_range_requires_time() {
        let axis = Axis::values("latitude", vec![1.0, 2.0]);
        assert!(axis.date_range(date(2000, 1, 1), date(2000, 1, 2)).is_err());
    }

    #[test]
    fn test_calendar_labels() {
        let coord = Coord::Time(vec![date(2000, 12, 31), date(2001, 1, 1)]);
        assert_eq!(coord.day_of_year_at(0), Some(366));
        assert_eq!(coord.year_at(1), Some(2001));
        assert_eq!(Coord::Values(vec![1.0]).year_at(0), None);
    }

    #[test]
    fn test_ensure_same_axes() {
        let a = vec![Axis::values("latitude", vec![0.0, 1.0])];
        let b = vec![Axis::values("latitude", vec![0.0, 1.5])];
        assert!(ensure_same_axes(&a, &a).is_ok());
        assert!(matches!(
            ensure_same_axes(&a, &b),
            Err(ArrayError::AxisMismatch { .. })
        ));
    }
}
