//! Day-of-year percentile climatology.

use chrono::NaiveDate;
use chunked_array::{ArrayError, ChunkedArray, GroupKey, Value};
use tracing::{debug, info};

use crate::config::IndicesConfig;
use crate::error::{IndicesError, Result};
use crate::names;

/// Percentile threshold per day-of-year (1..=366) and spatial cell.
///
/// The wrapped array has the time axis of the source field replaced by a
/// `dayofyear` axis at the same position.
#[derive(Debug, Clone)]
pub struct DayOfYearClimatology {
    thresholds: ChunkedArray<Value>,
    percentile: f64,
}

impl DayOfYearClimatology {
    /// Threshold field.
    pub fn thresholds(&self) -> &ChunkedArray<Value> {
        &self.thresholds
    }

    /// Percentile the thresholds were built with.
    pub fn percentile(&self) -> f64 {
        self.percentile
    }

    /// Unwrap the threshold field.
    pub fn into_inner(self) -> ChunkedArray<Value> {
        self.thresholds
    }
}

/// Linear-interpolation percentile of the valid values, `p` in 0-100.
///
/// Missing and NaN samples are ignored; no valid samples gives `None`.
pub fn percentile(samples: &[Value], p: f64) -> Value {
    let mut valid: Vec<f64> = samples
        .iter()
        .filter_map(|v| v.filter(|x| !x.is_nan()))
        .collect();
    if valid.is_empty() {
        return None;
    }
    valid.sort_by(f64::total_cmp);

    let rank = (p / 100.0).clamp(0.0, 1.0) * (valid.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(valid[lo] + (valid[hi] - valid[lo]) * frac)
}

/// Builds a [`DayOfYearClimatology`] from the baseline period of a daily field.
#[derive(Debug, Clone)]
pub struct ClimatologyBuilder {
    baseline_start: NaiveDate,
    baseline_end: NaiveDate,
    window: usize,
    percentile: f64,
    time_axis: String,
}

impl ClimatologyBuilder {
    /// Builder for the given inclusive baseline, with a 5-day window and the
    /// 90th percentile.
    pub fn new(baseline_start: NaiveDate, baseline_end: NaiveDate) -> Self {
        Self {
            baseline_start,
            baseline_end,
            window: 5,
            percentile: 90.0,
            time_axis: names::TIME.to_string(),
        }
    }

    /// Builder configured from [`IndicesConfig`].
    pub fn from_config(config: &IndicesConfig) -> Self {
        Self::new(config.baseline_start, config.baseline_end)
            .window(config.rolling_window)
            .percentile(config.climatology_percentile)
    }

    /// Rolling window width in days.
    pub fn window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Percentile (0-100).
    pub fn percentile(mut self, percentile: f64) -> Self {
        self.percentile = percentile;
        self
    }

    /// Name of the time axis to group on.
    pub fn time_axis(mut self, name: impl Into<String>) -> Self {
        self.time_axis = name.into();
        self
    }

    /// Build the climatology.
    ///
    /// The baseline is sliced first; the rolling window never reaches outside
    /// it. Samples are pooled by the day-of-year of the window center, read
    /// straight from the gathered time axis.
    pub fn build(&self, field: &ChunkedArray<Value>) -> Result<DayOfYearClimatology> {
        if !field.has_axis(&self.time_axis) {
            return Err(IndicesError::missing_axis(field.name(), &self.time_axis));
        }

        let baseline = field
            .sel_dates(&self.time_axis, self.baseline_start, self.baseline_end)
            .map_err(|e| match e {
                ArrayError::EmptySelection(_) => IndicesError::EmptyBaseline {
                    start: self.baseline_start,
                    end: self.baseline_end,
                },
                other => other.into(),
            })?;
        debug!(
            variable = %field.name(),
            days = baseline.axis(&self.time_axis)?.len(),
            "Selected climatology baseline"
        );

        let p = self.percentile;
        let thresholds = baseline
            .groupby(&self.time_axis, GroupKey::DayOfYear)?
            .window(self.window)?
            .reduce(&[], "doy-percentile", move |samples| percentile(samples, p))?;

        info!(
            variable = %field.name(),
            window = self.window,
            percentile = self.percentile,
            start = %self.baseline_start,
            end = %self.baseline_end,
            "Built day-of-year climatology"
        );

        Ok(DayOfYearClimatology {
            thresholds,
            percentile: self.percentile,
        })
    }
}
