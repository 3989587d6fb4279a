//! Humidity indices and per-cell trends for gridded daily climate fields
//!
//! Everything here builds lazy [`chunked_array`] graphs; nothing is computed
//! until a caller asks for values or writes the result.
//!
//! - **Humidity**: relative humidity from temperature and dewpoint (Sonntag)
//! - **Climatology**: day-of-year percentile thresholds over a baseline
//! - **Indices**: exceedance masks and annual indices (RH90p, WHD, RH stats)
//! - **Trends**: Mann-Kendall significance and Sen's slope per grid cell
//!
//! # Pipeline
//!
//! ```text
//! t2m, d2m (K) ──► kelvin_to_celsius ──► relative_humidity ──► rh (%)
//!                                                               │
//!          ClimatologyBuilder (baseline, 5-day window, p90) ◄───┤
//!                       │                                       │
//!                       ▼                                       ▼
//!          IndexEngine::rh90p            IndexEngine::warm_humid_days
//!                       │                 IndexEngine::humidity_statistics
//!                       └──────────► annual indices ◄──────────┘
//!                                          │
//!                                          ▼
//!                           TrendEngine::compute ──► {var}_slope, {var}_pval
//! ```
//!
//! # Example
//!
//! ```ignore
//! use climate_indices::{ClimatologyBuilder, IndexEngine, IndicesConfig, TrendEngine};
//!
//! let config = IndicesConfig::from_env();
//! let clim = ClimatologyBuilder::from_config(&config).build(&rh)?;
//! let rh90p = IndexEngine::from_config(&config).rh90p(&rh, &clim)?;
//! let trend = TrendEngine::from_config(&config).compute(rh90p.array())?;
//! ```

pub mod climatology;
pub mod config;
pub mod error;
pub mod humidity;
pub mod index;
pub mod names;
pub mod testdata;
pub mod trend;
pub mod units;

// Re-export commonly used types at crate root
pub use climatology::{percentile, ClimatologyBuilder, DayOfYearClimatology};
pub use config::IndicesConfig;
pub use error::{IndicesError, Result, TrendError};
pub use humidity::relative_humidity;
pub use index::{AnnualIndex, IndexEngine};
pub use trend::{mann_kendall, TrendDirection, TrendEngine, TrendFields, TrendTest};
pub use units::{ensure_units, kelvin_to_celsius};
