//! Per-cell trend fields over a chunked annual series.

use chunked_array::{Aggregation, ArrayError, ChunkedArray, Dataset, ResampleRule, UfuncOutput, Value};
use tracing::{debug, info, trace};

use crate::config::IndicesConfig;
use crate::error::Result;
use crate::index::calendar_axis;
use crate::names;
use crate::trend::mann_kendall::mann_kendall;

/// Slope and p-value fields for one variable.
#[derive(Debug, Clone)]
pub struct TrendFields {
    /// Source variable name.
    pub variable: String,
    /// Sen's slope per year, named `{var}_slope`.
    pub slope: ChunkedArray<Value>,
    /// Two-sided p-value, named `{var}_pval`.
    pub pvalue: ChunkedArray<Value>,
}

impl TrendFields {
    /// Number of cells whose p-value is below `alpha`.
    pub fn significant_cells(&self, alpha: f64) -> Result<usize> {
        let p = self.pvalue.compute()?;
        Ok(p.iter().filter(|v| matches!(v, Some(p) if *p < alpha)).count())
    }

    /// Both fields as a dataset ready to be written.
    pub fn into_dataset(self) -> Result<Dataset> {
        Ok(Dataset::merge([self.slope, self.pvalue])?)
    }
}

/// Applies the Mann-Kendall test to every cell of an annual field.
#[derive(Debug, Clone)]
pub struct TrendEngine {
    alpha: f64,
    min_valid_years: usize,
}

impl Default for TrendEngine {
    fn default() -> Self {
        Self::from_config(&IndicesConfig::default())
    }
}

impl TrendEngine {
    pub fn new(alpha: f64, min_valid_years: usize) -> Self {
        Self {
            alpha,
            min_valid_years,
        }
    }

    pub fn from_config(config: &IndicesConfig) -> Self {
        Self::new(config.trend_alpha, config.trend_min_years)
    }

    /// Significance level.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Annual mean series with the `year` axis in a single chunk.
    ///
    /// Daily fields are resampled; fields already indexed by year pass
    /// through the same resample unchanged.
    pub fn annual_series(&self, field: &ChunkedArray<Value>) -> Result<ChunkedArray<Value>> {
        let axis = calendar_axis(field)?;
        let annual = field
            .resample(&axis, ResampleRule::Annual)?
            .reduce(Aggregation::Mean)?
            .gather_axis(names::YEAR)?;
        debug!(
            variable = %field.name(),
            years = annual.axis(names::YEAR)?.len(),
            chunks = annual.num_chunks(),
            "Prepared annual series"
        );
        Ok(annual)
    }

    /// Slope and p-value per cell.
    ///
    /// Cells with too little history or a failed statistic are missing in
    /// both outputs; they never fail the computation.
    pub fn compute(&self, field: &ChunkedArray<Value>) -> Result<TrendFields> {
        let variable = field.name().to_string();
        let annual = self.annual_series(field)?;

        let alpha = self.alpha;
        let min_valid = self.min_valid_years;
        let outputs = annual.apply_ufunc(
            "mann-kendall",
            &[names::YEAR],
            vec![
                UfuncOutput::scalar(names::slope_name(&variable)),
                UfuncOutput::scalar(names::pval_name(&variable)),
            ],
            move |series: &[Value]| match mann_kendall(series, alpha, min_valid) {
                Ok(test) => vec![vec![Some(test.slope)], vec![Some(test.p)]],
                Err(e) => {
                    trace!(error = %e, "No trend for cell");
                    vec![vec![None], vec![None]]
                }
            },
        )?;

        let [slope, pvalue]: [ChunkedArray<Value>; 2] =
            outputs.try_into().map_err(|v: Vec<_>| ArrayError::KernelOutput {
                index: 0,
                expected: 2,
                actual: v.len(),
            })?;
        let slope = match field.units() {
            Some(units) => slope.with_units(format!("{}/year", units)),
            None => slope,
        };

        info!(
            variable = %variable,
            alpha = self.alpha,
            min_valid_years = self.min_valid_years,
            "Built trend fields"
        );

        Ok(TrendFields {
            variable,
            slope,
            pvalue,
        })
    }
}
