//! Exceedance masks and annual indices.

use chunked_array::{Aggregation, ChunkedArray, Coord, GroupKey, ResampleRule, Value};
use tracing::info;

use crate::climatology::DayOfYearClimatology;
use crate::config::IndicesConfig;
use crate::error::{IndicesError, Result};
use crate::names;
use crate::units::{ensure_units, DAYS, DEG_C, PERCENT};

/// A field indexed by year and spatial coordinates.
#[derive(Debug, Clone)]
pub struct AnnualIndex(ChunkedArray<Value>);

impl AnnualIndex {
    /// Index name.
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Underlying array.
    pub fn array(&self) -> &ChunkedArray<Value> {
        &self.0
    }

    /// Unwrap the underlying array.
    pub fn into_inner(self) -> ChunkedArray<Value> {
        self.0
    }

    fn renamed(self, name: &str, units: &str) -> Self {
        Self(self.0.with_name(name).with_units(units))
    }
}

/// Name of the first calendar (time or year) axis of a field.
pub(crate) fn calendar_axis(field: &ChunkedArray<Value>) -> Result<String> {
    field
        .axes()
        .iter()
        .find(|a| matches!(a.coord(), Coord::Time(_) | Coord::Year(_)))
        .map(|a| a.name().to_string())
        .ok_or_else(|| IndicesError::missing_axis(field.name(), names::TIME))
}

fn as_value(flag: bool) -> Value {
    Some(if flag { 1.0 } else { 0.0 })
}

/// Derives masks and annual indices from daily fields.
#[derive(Debug, Clone)]
pub struct IndexEngine {
    temperature_threshold: f64,
    humidity_threshold: f64,
}

impl Default for IndexEngine {
    fn default() -> Self {
        Self::from_config(&IndicesConfig::default())
    }
}

impl IndexEngine {
    /// Engine with the warm-humid thresholds from the configuration.
    pub fn from_config(config: &IndicesConfig) -> Self {
        Self {
            temperature_threshold: config.temperature_threshold,
            humidity_threshold: config.humidity_threshold,
        }
    }

    /// True where `value > threshold(day-of-year)`.
    ///
    /// Missing values and missing thresholds compare as not exceeded.
    pub fn exceedance_mask(
        &self,
        value: &ChunkedArray<Value>,
        climatology: &DayOfYearClimatology,
    ) -> Result<ChunkedArray<bool>> {
        let thresholds = climatology.thresholds();
        if let Some(units) = thresholds.units() {
            ensure_units(value, units)?;
        }
        let axis = calendar_axis(value)?;
        let mask = value.zip_grouped(
            &axis,
            GroupKey::DayOfYear,
            thresholds,
            "exceedance",
            |v: Value, t: Option<Value>| match (v, t.flatten()) {
                (Some(v), Some(t)) => v > t,
                _ => false,
            },
        )?;
        Ok(mask)
    }

    /// True where `a >= ta` and `b >= tb`. Missing operands give false.
    pub fn compound_exceedance(
        &self,
        a: &ChunkedArray<Value>,
        ta: f64,
        b: &ChunkedArray<Value>,
        tb: f64,
    ) -> Result<ChunkedArray<bool>> {
        let mask = a.zip_with(b, "compound_exceedance", move |x: Value, y: Value| {
            match (x, y) {
                (Some(x), Some(y)) => x >= ta && y >= tb,
                _ => false,
            }
        })?;
        Ok(mask)
    }

    /// Annual resample with the given aggregation, keeping name and units.
    pub fn annual_aggregate(
        &self,
        field: &ChunkedArray<Value>,
        aggregation: Aggregation,
    ) -> Result<AnnualIndex> {
        let axis = calendar_axis(field)?;
        let annual = field
            .resample(&axis, ResampleRule::Annual)?
            .reduce(aggregation)?;
        Ok(AnnualIndex(annual))
    }

    /// Annual percentage of days on which `mask` is true.
    pub fn percent_exceedance_per_year(&self, mask: &ChunkedArray<bool>) -> Result<AnnualIndex> {
        let fraction = mask.map("mask_to_value", as_value);
        let annual = self.annual_aggregate(&fraction, Aggregation::Mean)?;
        let percent = annual
            .into_inner()
            .map("to_percent", |v: Value| v.map(|f| f * 100.0))
            .with_name(mask.name())
            .with_units(PERCENT);
        Ok(AnnualIndex(percent))
    }

    /// Annual number of days on which `mask` is true.
    pub fn days_per_year(&self, mask: &ChunkedArray<bool>) -> Result<AnnualIndex> {
        let ones = mask.map("mask_to_value", as_value);
        Ok(self
            .annual_aggregate(&ones, Aggregation::Sum)?
            .renamed(mask.name(), DAYS))
    }

    /// RH90p: annual % of days whose humidity exceeds the day-of-year
    /// percentile threshold.
    pub fn rh90p(
        &self,
        rh: &ChunkedArray<Value>,
        climatology: &DayOfYearClimatology,
    ) -> Result<AnnualIndex> {
        let mask = self.exceedance_mask(rh, climatology)?;
        let index = self
            .percent_exceedance_per_year(&mask)?
            .renamed(names::RH90P, PERCENT);
        info!(index = names::RH90P, "Derived humidity exceedance index");
        Ok(index)
    }

    /// WHD: annual count of days with `t2m >= T` and `rh >= H`.
    pub fn warm_humid_days(
        &self,
        t2m: &ChunkedArray<Value>,
        rh: &ChunkedArray<Value>,
    ) -> Result<AnnualIndex> {
        ensure_units(t2m, DEG_C)?;
        ensure_units(rh, PERCENT)?;
        let mask = self.compound_exceedance(
            t2m,
            self.temperature_threshold,
            rh,
            self.humidity_threshold,
        )?;
        let index = self.days_per_year(&mask)?.renamed(names::WHD, DAYS);
        info!(
            index = names::WHD,
            temperature_threshold = self.temperature_threshold,
            humidity_threshold = self.humidity_threshold,
            "Derived warm-humid days"
        );
        Ok(index)
    }

    /// Annual mean, minimum and maximum humidity (RHmean, RHmin, RHmax).
    pub fn humidity_statistics(&self, rh: &ChunkedArray<Value>) -> Result<Vec<AnnualIndex>> {
        ensure_units(rh, PERCENT)?;
        [
            (names::RH_MEAN, Aggregation::Mean),
            (names::RH_MIN, Aggregation::Min),
            (names::RH_MAX, Aggregation::Max),
        ]
        .into_iter()
        .map(|(name, aggregation)| -> Result<AnnualIndex> {
            Ok(self
                .annual_aggregate(rh, aggregation)?
                .renamed(name, PERCENT))
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use chunked_array::{Axis, Chunking};

    use super::*;
    use crate::climatology::ClimatologyBuilder;

    fn cells(name: &str, values: Vec<Value>) -> ChunkedArray<Value> {
        let n = values.len();
        ChunkedArray::from_vec(
            name,
            vec![Axis::values("latitude", (0..n).map(|i| i as f64).collect())],
            values,
            &[],
        )
        .unwrap()
    }

    #[test]
    fn test_compound_exceedance() {
        let engine = IndexEngine::default();
        let t = cells("t2m", vec![Some(31.0), Some(29.0)]);
        let rh = cells("rh", vec![Some(80.0), Some(60.0)]);
        let mask = engine.compound_exceedance(&t, 30.0, &rh, 70.0).unwrap();
        assert_eq!(mask.compute().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_compound_exceedance_is_inclusive_and_missing_is_false() {
        let engine = IndexEngine::default();
        let t = cells("t2m", vec![Some(30.0), None]);
        let rh = cells("rh", vec![Some(70.0), Some(90.0)]);
        let mask = engine.compound_exceedance(&t, 30.0, &rh, 70.0).unwrap();
        assert_eq!(mask.compute().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_warm_humid_days_rejects_kelvin() {
        let engine = IndexEngine::default();
        let t = cells("t2m", vec![Some(305.0)]).with_units("K");
        let rh = cells("rh", vec![Some(80.0)]).with_units("%");
        assert!(matches!(
            engine.warm_humid_days(&t, &rh),
            Err(IndicesError::UnitMismatch { .. })
        ));
    }

    fn two_years(values: impl Fn(usize) -> Value) -> ChunkedArray<Value> {
        let start = NaiveDate::from_ymd_opt(2001, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..730)
            .map(|d| start + chrono::Duration::days(d))
            .collect();
        ChunkedArray::from_vec(
            "rh",
            vec![Axis::time("time", dates), Axis::values("latitude", vec![0.0])],
            (0..730).map(values).collect(),
            &[("time", Chunking::Size(100))],
        )
        .unwrap()
        .with_units("%")
    }

    #[test]
    fn test_exceedance_strictly_greater() {
        let engine = IndexEngine::default();
        // constant field: threshold equals every value, nothing exceeds
        let rh = two_years(|_| Some(50.0));
        let clim = ClimatologyBuilder::new(
            NaiveDate::from_ymd_opt(2001, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2002, 12, 31).unwrap(),
        )
        .build(&rh)
        .unwrap();
        let mask = engine.exceedance_mask(&rh, &clim).unwrap();
        assert!(mask.compute().unwrap().iter().all(|&m| !m));
    }

    #[test]
    fn test_percent_and_count_per_year() {
        let engine = IndexEngine::default();
        let field = two_years(|d| Some(if d % 5 == 0 { 1.0 } else { 0.0 }));
        let mask = field.map("is_one", |v: Value| v == Some(1.0));
        let percent = engine.percent_exceedance_per_year(&mask).unwrap();
        let counts = engine.days_per_year(&mask).unwrap();

        assert_eq!(percent.array().axis_names(), vec!["year", "latitude"]);
        assert_eq!(percent.array().units(), Some("%"));
        let p = percent.array().compute().unwrap();
        // 2001: days 0,5,..,360 -> 73 of 365
        assert!((p[0].unwrap() - 20.0).abs() < 1e-9);
        assert_eq!(counts.array().compute().unwrap()[0], Some(73.0));
    }

    #[test]
    fn test_humidity_statistics() {
        let engine = IndexEngine::default();
        let rh = two_years(|d| if d == 3 { None } else { Some((d % 365) as f64 / 4.0) });
        let stats = engine.humidity_statistics(&rh).unwrap();
        let names: Vec<&str> = stats.iter().map(AnnualIndex::name).collect();
        assert_eq!(names, vec!["RHmean", "RHmin", "RHmax"]);
        assert_eq!(stats[1].array().compute().unwrap(), vec![Some(0.0), Some(0.0)]);
        assert_eq!(stats[2].array().compute().unwrap(), vec![Some(91.0), Some(91.0)]);
    }
}
