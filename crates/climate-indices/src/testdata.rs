//! Synthetic gridded fields with predictable values.
//!
//! Used by the test suites of this crate and of the pipeline service.
//! Every generator is deterministic, so expected results can be derived by
//! hand from the formulas documented on each function.

use chrono::{Datelike, NaiveDate};
use chunked_array::{Axis, ChunkedArray, Chunking, Result, Value};

use crate::names;
use crate::units::KELVIN;

/// Every day from Jan 1 of `start_year` to Dec 31 of the last year.
pub fn daily_dates(start_year: i32, years: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let Some(mut day) = NaiveDate::from_ymd_opt(start_year, 1, 1) else {
        return dates;
    };
    let end = start_year + years as i32;
    while day.year() < end {
        dates.push(day);
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    dates
}

/// A small daily grid over `years` years starting at `start_year`.
#[derive(Debug, Clone)]
pub struct SyntheticGrid {
    pub start_year: i32,
    pub years: usize,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    /// Time chunk length used for generated arrays.
    pub time_chunk: usize,
}

impl SyntheticGrid {
    /// Grid of `nlat` x `nlon` cells at 0.25 degree spacing.
    pub fn new(start_year: i32, years: usize, nlat: usize, nlon: usize) -> Self {
        Self {
            start_year,
            years,
            latitudes: (0..nlat).map(|i| 10.0 + 0.25 * i as f64).collect(),
            longitudes: (0..nlon).map(|i| 70.0 + 0.25 * i as f64).collect(),
            time_chunk: 365,
        }
    }

    /// Axes `(time_axis, latitude, longitude)`.
    pub fn axes(&self, time_axis: &str) -> Vec<Axis> {
        vec![
            Axis::time(time_axis, daily_dates(self.start_year, self.years)),
            Axis::values("latitude", self.latitudes.clone()),
            Axis::values("longitude", self.longitudes.clone()),
        ]
    }

    /// Build a field from `f(date, year_index, lat_index, lon_index)`.
    pub fn field(
        &self,
        name: &str,
        time_axis: &str,
        f: impl Fn(NaiveDate, usize, usize, usize) -> Value,
    ) -> Result<ChunkedArray<Value>> {
        let dates = daily_dates(self.start_year, self.years);
        let (nlat, nlon) = (self.latitudes.len(), self.longitudes.len());
        let mut data = Vec::with_capacity(dates.len() * nlat * nlon);
        for date in &dates {
            let year = (date.year() - self.start_year) as usize;
            for lat in 0..nlat {
                for lon in 0..nlon {
                    data.push(f(*date, year, lat, lon));
                }
            }
        }
        ChunkedArray::from_vec(
            name,
            self.axes(time_axis),
            data,
            &[(time_axis, Chunking::Size(self.time_chunk))],
        )
    }

    /// Daily 2-m temperature in Kelvin.
    ///
    /// `T(degC) = 24 + 8 * sin(2*pi*(doy - 105) / 365) + lat_index + warming * year_index`
    pub fn temperature_kelvin(&self, time_axis: &str, warming_per_year: f64) -> Result<ChunkedArray<Value>> {
        let field = self.field(names::T2M, time_axis, |date, year, lat, _| {
            Some(273.15 + celsius(date, year, lat, warming_per_year))
        })?;
        Ok(field.with_units(KELVIN))
    }

    /// Daily 2-m dewpoint in Kelvin, always below the temperature.
    ///
    /// `Td = T - max(0, 6 - 4 * sin(...) + drying * year_index + 0.5 * lon_index)`
    pub fn dewpoint_kelvin(
        &self,
        time_axis: &str,
        warming_per_year: f64,
        drying_per_year: f64,
    ) -> Result<ChunkedArray<Value>> {
        let field = self.field(names::D2M, time_axis, |date, year, lat, lon| {
            let t = celsius(date, year, lat, warming_per_year);
            let depression = 6.0 - 4.0 * season(date) + drying_per_year * year as f64 + 0.5 * lon as f64;
            Some(273.15 + t - depression.max(0.0))
        })?;
        Ok(field.with_units(KELVIN))
    }
}

fn season(date: NaiveDate) -> f64 {
    let doy = date.ordinal() as f64;
    (2.0 * std::f64::consts::PI * (doy - 105.0) / 365.0).sin()
}

fn celsius(date: NaiveDate, year: usize, lat: usize, warming_per_year: f64) -> f64 {
    24.0 + 8.0 * season(date) + lat as f64 + warming_per_year * year as f64
}

/// An annual field `(year, latitude)` with `values[year * cells + cell]`.
pub fn annual_field(name: &str, first_year: i32, cells: usize, values: Vec<Value>) -> Result<ChunkedArray<Value>> {
    let years = values.len() / cells.max(1);
    ChunkedArray::from_vec(
        name,
        vec![
            Axis::years(names::YEAR, (first_year..first_year + years as i32).collect()),
            Axis::values("latitude", (0..cells).map(|c| c as f64).collect()),
        ],
        values,
        &[],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_dates_include_leap_days() {
        let dates = daily_dates(2000, 2);
        assert_eq!(dates.len(), 366 + 365);
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        assert_eq!(dates[dates.len() - 1], NaiveDate::from_ymd_opt(2001, 12, 31).unwrap());
    }

    #[test]
    fn test_dewpoint_below_temperature() {
        let grid = SyntheticGrid::new(2001, 1, 2, 2);
        let t = grid.temperature_kelvin("time", 0.0).unwrap().compute().unwrap();
        let td = grid.dewpoint_kelvin("time", 0.0, 0.1).unwrap().compute().unwrap();
        assert_eq!(t.len(), 365 * 4);
        assert!(t.iter().zip(&td).all(|(t, td)| td.unwrap() <= t.unwrap()));
    }
}
