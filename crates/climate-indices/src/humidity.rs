//! Relative humidity from temperature and dewpoint.
//!
//! Saturation vapour pressure over water follows Sonntag (1990). Relative
//! humidity is the ratio of the saturation pressure at the dewpoint to that
//! at the air temperature, clipped to 0-100 %.

use chunked_array::{ChunkedArray, Value};

use crate::error::Result;
use crate::names;
use crate::units::{ensure_units, DEG_C, PERCENT};

/// Saturation vapour pressure over water in Pa, for a temperature in degC.
pub fn saturation_vapour_pressure(t_celsius: f64) -> f64 {
    let t = t_celsius + 273.15;
    100.0
        * (-6096.9385 / t + 16.635794 - 2.711193e-2 * t + 1.673952e-5 * t * t
            + 2.433502 * t.ln())
        .exp()
}

/// Relative humidity in % from temperature and dewpoint (both degC).
pub fn relative_humidity_from_dewpoint(t_celsius: f64, td_celsius: f64) -> f64 {
    let rh = 100.0 * saturation_vapour_pressure(td_celsius) / saturation_vapour_pressure(t_celsius);
    rh.clamp(0.0, 100.0)
}

/// Daily relative humidity field from temperature and dewpoint fields.
///
/// Both inputs must be in degC (or untagged) and share axes. The result is
/// named `rh` and tagged `%`.
pub fn relative_humidity(
    tas: &ChunkedArray<Value>,
    tdps: &ChunkedArray<Value>,
) -> Result<ChunkedArray<Value>> {
    ensure_units(tas, DEG_C)?;
    ensure_units(tdps, DEG_C)?;
    let rh = tas.zip_with(tdps, "relative_humidity", |t: Value, td: Value| {
        match (t, td) {
            (Some(t), Some(td)) => {
                let rh = relative_humidity_from_dewpoint(t, td);
                rh.is_finite().then_some(rh)
            }
            _ => None,
        }
    })?;
    Ok(rh.with_name(names::RH).with_units(PERCENT))
}
