//! On-disk encoding of coordinate axes.
//!
//! Each axis is stored as a 1-D array next to the variables that use it,
//! named after the axis. Calendar dates are stored as `Int64` days since
//! 1970-01-01; every other integer label is stored as `Int64`, and floating
//! point coordinates as `Float64`. The `coord_kind` attribute records which
//! [`Coord`] variant to rebuild.

use chrono::{Datelike, NaiveDate};
use chunked_array::{Axis, Coord};
use serde_json::{json, Map, Value as Json};

use crate::error::{Result, StoreError};

/// Attribute holding the coordinate kind; its presence marks a coordinate array.
pub const COORD_KIND_ATTR: &str = "coord_kind";

/// xarray-compatible dimension names attribute.
pub const DIMENSIONS_ATTR: &str = "_ARRAY_DIMENSIONS";

/// Units attribute written for time coordinates.
pub const TIME_UNITS: &str = "days since 1970-01-01";

/// 1970-01-01 counted from 0001-01-01 (day 1).
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Coordinate values ready to be stored.
pub(crate) enum Encoded {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

pub(crate) fn encode(axis: &Axis) -> (Encoded, Map<String, Json>) {
    let coord = axis.coord();
    let mut attrs = Map::new();
    attrs.insert(DIMENSIONS_ATTR.to_string(), json!([axis.name()]));
    attrs.insert(COORD_KIND_ATTR.to_string(), json!(coord.kind()));

    let encoded = match coord {
        Coord::Time(dates) => {
            attrs.insert("units".to_string(), json!(TIME_UNITS));
            attrs.insert("calendar".to_string(), json!("proleptic_gregorian"));
            Encoded::Int(
                dates
                    .iter()
                    .map(|d| (d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE) as i64)
                    .collect(),
            )
        }
        Coord::Year(years) => Encoded::Int(years.iter().map(|&y| y as i64).collect()),
        Coord::DayOfYear(days) => Encoded::Int(days.iter().map(|&d| d as i64).collect()),
        Coord::Index(labels) => Encoded::Int(labels.clone()),
        Coord::Values(values) => Encoded::Float(values.clone()),
    };
    (encoded, attrs)
}

pub(crate) fn decode(path: &str, kind: &str, encoded: Encoded) -> Result<Coord> {
    let invalid = |message: String| StoreError::invalid_metadata(path, message);
    match (kind, encoded) {
        ("time", Encoded::Int(days)) => days
            .into_iter()
            .map(|d| {
                i32::try_from(d)
                    .ok()
                    .and_then(|d| d.checked_add(UNIX_EPOCH_DAYS_FROM_CE))
                    .and_then(NaiveDate::from_num_days_from_ce_opt)
                    .ok_or_else(|| invalid(format!("day offset {} out of range", d)))
            })
            .collect::<Result<Vec<_>>>()
            .map(Coord::Time),
        ("year", Encoded::Int(years)) => years
            .into_iter()
            .map(|y| i32::try_from(y).map_err(|_| invalid(format!("year {} out of range", y))))
            .collect::<Result<Vec<_>>>()
            .map(Coord::Year),
        ("dayofyear", Encoded::Int(days)) => days
            .into_iter()
            .map(|d| {
                u32::try_from(d)
                    .ok()
                    .filter(|d| (1..=366).contains(d))
                    .ok_or_else(|| invalid(format!("day of year {} out of range", d)))
            })
            .collect::<Result<Vec<_>>>()
            .map(Coord::DayOfYear),
        ("index", Encoded::Int(labels)) => Ok(Coord::Index(labels)),
        ("values", Encoded::Float(values)) => Ok(Coord::Values(values)),
        (kind, _) => Err(invalid(format!("unsupported coordinate kind '{}'", kind))),
    }
}

/// Whether a coordinate kind is stored as integers.
pub(crate) fn is_integer_kind(kind: &str) -> bool {
    kind != "values"
}
