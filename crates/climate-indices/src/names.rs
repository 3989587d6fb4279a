//! Variable, axis and group names shared by every pipeline stage.

/// Daily 2-m temperature.
pub const T2M: &str = "t2m";
/// Daily 2-m dewpoint temperature.
pub const D2M: &str = "d2m";
/// Daily relative humidity.
pub const RH: &str = "rh";
/// Annual percentage of days above the day-of-year humidity percentile.
pub const RH90P: &str = "RH90p";
/// Annual count of warm-humid days.
pub const WHD: &str = "WHD";
/// Annual mean relative humidity.
pub const RH_MEAN: &str = "RHmean";
/// Annual minimum relative humidity.
pub const RH_MIN: &str = "RHmin";
/// Annual maximum relative humidity.
pub const RH_MAX: &str = "RHmax";

/// Daily time axis.
pub const TIME: &str = "time";
/// Time axis name used by some reanalysis exports.
pub const VALID_TIME: &str = "valid_time";
/// Annual axis.
pub const YEAR: &str = "year";

/// Group holding the annual humidity statistics.
pub const YEARLY_STATS_GROUP: &str = "yearly_stats";

/// Name of the Sen's slope output for a variable.
pub fn slope_name(var: &str) -> String {
    format!("{}_slope", var)
}

/// Name of the p-value output for a variable.
pub fn pval_name(var: &str) -> String {
    format!("{}_pval", var)
}
