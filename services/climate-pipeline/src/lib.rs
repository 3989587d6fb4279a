//! Humidity index and trend pipeline.
//!
//! Stages, each readable and writable on its own:
//!
//! 1. `compute-indices`: inputs (K) → `t2m` (degC), `rh`, `RH90p` in the store root
//! 2. `add-indices`: `WHD`, `RHmean`, `RHmin`, `RHmax` in `yearly_stats`
//! 3. `trend-analysis`: `<trends_dir>/{var}.zarr` with `{var}_slope`, `{var}_pval`

pub mod config;
pub mod stages;

pub use config::PipelineConfig;
pub use stages::{trend_store_path, GroupListing, Pipeline, StoreListing, TrendSummary};
