//! Properties of the index and trend engines on synthetic grids.

use chrono::{Datelike, NaiveDate};
use chunked_array::{Aggregation, Axis, ChunkedArray, Chunking, Value};
use climate_indices::testdata::{annual_field, daily_dates, SyntheticGrid};
use climate_indices::{
    kelvin_to_celsius, relative_humidity, ClimatologyBuilder, IndexEngine, IndicesConfig,
    TrendEngine,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Scrambled but deterministic daily values for a single cell.
fn scrambled(doy: u32, year: usize) -> f64 {
    ((doy as usize * 37 + year * 101) % 97) as f64
}

fn single_cell(values: Vec<Value>, dates: Vec<NaiveDate>, time_chunk: usize) -> ChunkedArray<Value> {
    ChunkedArray::from_vec(
        "rh",
        vec![Axis::time("time", dates), Axis::values("latitude", vec![0.0])],
        values,
        &[("time", Chunking::Size(time_chunk))],
    )
    .unwrap()
    .with_units("%")
}

fn thresholds(field: &ChunkedArray<Value>, window: usize) -> Vec<Value> {
    ClimatologyBuilder::new(date(2001, 1, 1), date(2003, 12, 31))
        .window(window)
        .build(field)
        .unwrap()
        .into_inner()
        .compute()
        .unwrap()
}

#[test]
fn test_climatology_invariant_to_year_permutation() {
    let dates = daily_dates(2001, 3);
    let values = |order: [usize; 3]| -> Vec<Value> {
        dates
            .iter()
            .map(|d| {
                let year = (d.year() - 2001) as usize;
                Some(scrambled(d.ordinal(), order[year]))
            })
            .collect()
    };
    let original = single_cell(values([0, 1, 2]), dates.clone(), 365);
    let permuted = single_cell(values([2, 0, 1]), dates.clone(), 365);

    // single-day window: every day-of-year pools the same values in any year order
    assert_eq!(thresholds(&original, 1), thresholds(&permuted, 1));

    // 5-day window: away from year boundaries the pooled sets are unchanged
    let a = thresholds(&original, 5);
    let b = thresholds(&permuted, 5);
    for doy in 3..=363 {
        let i = doy - 1;
        assert!(
            (a[i].unwrap() - b[i].unwrap()).abs() < 1e-12,
            "doy {} differs",
            doy
        );
    }
}

#[test]
fn test_climatology_independent_of_chunking() {
    let dates = daily_dates(2001, 3);
    let values: Vec<Value> = dates
        .iter()
        .map(|d| Some(scrambled(d.ordinal(), (d.year() - 2001) as usize)))
        .collect();
    let coarse = single_cell(values.clone(), dates.clone(), 365);
    let fine = single_cell(values, dates, 30);
    assert_eq!(thresholds(&coarse, 5), thresholds(&fine, 5));
}

#[test]
fn test_climatology_outside_baseline_is_error() {
    let dates = daily_dates(2001, 1);
    let field = single_cell(vec![Some(1.0); dates.len()], dates, 365);
    let result = ClimatologyBuilder::new(date(1961, 1, 1), date(1990, 12, 31)).build(&field);
    assert!(matches!(
        result,
        Err(climate_indices::IndicesError::EmptyBaseline { .. })
    ));
}

#[test]
fn test_rh90p_over_baseline_is_near_ten_percent() {
    let dates = daily_dates(2001, 3);
    let values: Vec<Value> = dates
        .iter()
        .map(|d| Some(scrambled(d.ordinal(), (d.year() - 2001) as usize)))
        .collect();
    let rh = single_cell(values, dates, 100);
    let clim = ClimatologyBuilder::new(date(2001, 1, 1), date(2003, 12, 31))
        .build(&rh)
        .unwrap();
    let index = IndexEngine::default().rh90p(&rh, &clim).unwrap();
    assert_eq!(index.name(), "RH90p");
    assert_eq!(index.array().axis_names(), vec!["year", "latitude"]);

    let per_year = index.array().compute().unwrap();
    assert_eq!(per_year.len(), 3);
    let mean = per_year.iter().map(|v| v.unwrap()).sum::<f64>() / 3.0;
    assert!(mean > 3.0 && mean < 25.0, "mean RH90p = {}", mean);
}

#[test]
fn test_leap_day_outside_non_leap_baseline() {
    // 2001-2003 baseline has no day 366; 2004 is a leap analysis year
    let dates = daily_dates(2001, 4);
    let values: Vec<Value> = dates
        .iter()
        .map(|d| Some(if d.year() == 2004 { 80.0 } else { 50.0 }))
        .collect();
    let rh = single_cell(values, dates.clone(), 120);
    let clim = ClimatologyBuilder::new(date(2001, 1, 1), date(2003, 12, 31))
        .build(&rh)
        .unwrap();

    let thresholds = clim.thresholds().compute().unwrap();
    assert_eq!(thresholds.len(), 366);
    assert_eq!(thresholds[364], Some(50.0));
    assert_eq!(thresholds[365], None);

    let engine = IndexEngine::default();
    let mask = engine.exceedance_mask(&rh, &clim).unwrap().compute().unwrap();
    assert_eq!(dates.last(), Some(&date(2004, 12, 31)));
    assert!(!mask[mask.len() - 1]);
    assert!(mask[mask.len() - 2]);

    let per_year = engine.rh90p(&rh, &clim).unwrap().array().compute().unwrap();
    assert_eq!(&per_year[..3], &[Some(0.0), Some(0.0), Some(0.0)]);
    let expected = 365.0 / 366.0 * 100.0;
    assert!(
        (per_year[3].unwrap() - expected).abs() < 1e-9,
        "RH90p 2004 = {:?}",
        per_year[3]
    );
}

#[test]
fn test_compound_exceedance_example() {
    let axes = vec![Axis::values("latitude", vec![0.0, 1.0])];
    let t = ChunkedArray::from_vec("t2m", axes.clone(), vec![Some(31.0), Some(29.0)], &[]).unwrap();
    let rh = ChunkedArray::from_vec("rh", axes, vec![Some(80.0), Some(60.0)], &[]).unwrap();
    let mask = IndexEngine::default()
        .compound_exceedance(&t, 30.0, &rh, 70.0)
        .unwrap();
    assert_eq!(mask.compute().unwrap(), vec![true, false]);
}

#[test]
fn test_annual_aggregate_of_annual_series_is_identity() {
    let values: Vec<Value> = vec![Some(1.0), None, Some(3.5), Some(2.0), Some(-1.0), Some(7.0)];
    let field = annual_field("WHD", 2000, 2, values.clone()).unwrap();
    let engine = IndexEngine::default();
    for aggregation in [Aggregation::Mean, Aggregation::Sum, Aggregation::Min, Aggregation::Max] {
        let annual = engine.annual_aggregate(&field, aggregation).unwrap();
        assert_eq!(annual.array().compute().unwrap(), values);
        assert_eq!(annual.array().axis_names(), vec!["year", "latitude"]);
    }
}

#[test]
fn test_trend_examples() {
    // three cells: increasing, constant, mostly missing
    let series: [[Value; 5]; 3] = [
        [Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)],
        [Some(5.0); 5],
        [Some(2.0), None, None, Some(3.0), None],
    ];
    let mut values = Vec::new();
    for year in 0..5 {
        for cell in &series {
            values.push(cell[year]);
        }
    }
    let field = annual_field("RHmean", 1990, 3, values).unwrap();
    let trend = TrendEngine::default().compute(&field).unwrap();
    let slope = trend.slope.compute().unwrap();
    let p = trend.pvalue.compute().unwrap();

    assert!((slope[0].unwrap() - 1.0).abs() < 1e-12);
    assert!(p[0].unwrap() < 0.05);
    assert_eq!(slope[1], Some(0.0));
    assert_eq!(p[1], Some(1.0));
    assert_eq!((slope[2], p[2]), (None, None));
}

#[test]
fn test_synthetic_pipeline_detects_warming() {
    let grid = SyntheticGrid::new(2001, 6, 2, 2);
    let config = IndicesConfig {
        baseline_start: date(2001, 1, 1),
        baseline_end: date(2003, 12, 31),
        ..IndicesConfig::default()
    };

    let t2m = kelvin_to_celsius(&grid.temperature_kelvin("time", 0.5).unwrap()).unwrap();
    let d2m = kelvin_to_celsius(&grid.dewpoint_kelvin("time", 0.5, 0.3).unwrap()).unwrap();
    let rh = relative_humidity(&t2m, &d2m).unwrap();

    let engine = IndexEngine::from_config(&config);
    let stats = engine.humidity_statistics(&rh).unwrap();
    let rh_mean = stats[0].array().compute().unwrap();
    assert!(rh_mean.iter().all(|v| matches!(v, Some(x) if (0.0..=100.0).contains(x))));

    let trends = TrendEngine::from_config(&config);
    let t_trend = trends.compute(&t2m).unwrap();
    assert_eq!(t_trend.slope.units(), Some("degC/year"));
    for slope in t_trend.slope.compute().unwrap() {
        assert!((slope.unwrap() - 0.5).abs() < 1e-6);
    }
    assert_eq!(t_trend.significant_cells(config.trend_alpha).unwrap(), 4);

    // growing dewpoint depression dries every cell
    let rh_trend = trends.compute(stats[0].array()).unwrap();
    assert!(rh_trend
        .slope
        .compute()
        .unwrap()
        .iter()
        .all(|s| s.unwrap() < 0.0));
}
