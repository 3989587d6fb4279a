//! Units tags and the explicit conversions the pipeline performs.

use chunked_array::{ChunkedArray, Value};

use crate::error::{IndicesError, Result};

/// Kelvin.
pub const KELVIN: &str = "K";
/// Degrees Celsius.
pub const DEG_C: &str = "degC";
/// Percent.
pub const PERCENT: &str = "%";
/// Day counts.
pub const DAYS: &str = "days";

const ZERO_CELSIUS_IN_KELVIN: f64 = 273.15;

/// Canonical spelling of a units tag.
fn canonical(units: &str) -> &str {
    match units.trim() {
        "K" | "kelvin" | "Kelvin" => KELVIN,
        "degC" | "°C" | "C" | "deg_C" | "celsius" | "Celsius" => DEG_C,
        "%" | "percent" | "pct" => PERCENT,
        other => other,
    }
}

/// Check that a field is tagged with `expected` units.
///
/// Untagged fields are accepted as-is; no conversion is ever implied.
pub fn ensure_units(field: &ChunkedArray<Value>, expected: &str) -> Result<()> {
    match field.units() {
        Some(found) if canonical(found) != canonical(expected) => Err(
            IndicesError::unit_mismatch(field.name(), expected, found),
        ),
        _ => Ok(()),
    }
}

/// Convert a Kelvin field to degrees Celsius and tag it `degC`.
pub fn kelvin_to_celsius(field: &ChunkedArray<Value>) -> Result<ChunkedArray<Value>> {
    ensure_units(field, KELVIN)?;
    Ok(field
        .map("kelvin_to_celsius", |v: Value| v.map(|k| k - ZERO_CELSIUS_IN_KELVIN))
        .with_units(DEG_C))
}
