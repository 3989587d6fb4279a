//! Configuration for index and trend computation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::names;

/// All tunable parameters of the index and trend engines, with their
/// defaults in one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicesConfig {
    /// First day of the climatology baseline (inclusive).
    pub baseline_start: NaiveDate,

    /// Last day of the climatology baseline (inclusive).
    pub baseline_end: NaiveDate,

    /// Width of the centered rolling window, in days.
    pub rolling_window: usize,

    /// Percentile of the day-of-year climatology (0-100).
    pub climatology_percentile: f64,

    /// Warm-humid day temperature threshold in degC.
    pub temperature_threshold: f64,

    /// Warm-humid day relative humidity threshold in %.
    pub humidity_threshold: f64,

    /// Significance level of the trend test.
    pub trend_alpha: f64,

    /// Minimum number of valid years for a trend.
    pub trend_min_years: usize,

    /// Variables the trend stage processes, in order.
    pub trend_variables: Vec<String>,
}

impl Default for IndicesConfig {
    fn default() -> Self {
        Self {
            baseline_start: NaiveDate::from_ymd_opt(1961, 1, 1).unwrap_or_default(),
            baseline_end: NaiveDate::from_ymd_opt(1990, 12, 31).unwrap_or_default(),
            rolling_window: 5,
            climatology_percentile: 90.0,
            temperature_threshold: 30.0,
            humidity_threshold: 70.0,
            trend_alpha: 0.05,
            trend_min_years: 5,
            trend_variables: [
                names::RH90P,
                names::WHD,
                names::RH_MEAN,
                names::RH_MIN,
                names::RH_MAX,
                names::T2M,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl IndicesConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment variable overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("BASELINE_START") {
            if let Ok(date) = val.parse() {
                self.baseline_start = date;
            }
        }

        if let Ok(val) = std::env::var("BASELINE_END") {
            if let Ok(date) = val.parse() {
                self.baseline_end = date;
            }
        }

        if let Ok(val) = std::env::var("ROLLING_WINDOW") {
            if let Ok(width) = val.parse() {
                self.rolling_window = width;
            }
        }

        if let Ok(val) = std::env::var("CLIMATOLOGY_PERCENTILE") {
            if let Ok(p) = val.parse() {
                self.climatology_percentile = p;
            }
        }

        if let Ok(val) = std::env::var("TEMPERATURE_THRESHOLD") {
            if let Ok(t) = val.parse() {
                self.temperature_threshold = t;
            }
        }

        if let Ok(val) = std::env::var("HUMIDITY_THRESHOLD") {
            if let Ok(h) = val.parse() {
                self.humidity_threshold = h;
            }
        }

        if let Ok(val) = std::env::var("TREND_ALPHA") {
            if let Ok(alpha) = val.parse() {
                self.trend_alpha = alpha;
            }
        }

        if let Ok(val) = std::env::var("TREND_MIN_YEARS") {
            if let Ok(years) = val.parse() {
                self.trend_min_years = years;
            }
        }

        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.baseline_start > self.baseline_end {
            return Err(format!(
                "baseline_start {} is after baseline_end {}",
                self.baseline_start, self.baseline_end
            ));
        }

        if self.rolling_window == 0 {
            return Err("rolling_window must be > 0".to_string());
        }

        if !(0.0..=100.0).contains(&self.climatology_percentile) {
            return Err("climatology_percentile must be within 0-100".to_string());
        }

        if !(self.trend_alpha > 0.0 && self.trend_alpha < 1.0) {
            return Err("trend_alpha must be within (0, 1)".to_string());
        }

        if self.trend_min_years < 3 {
            return Err("trend_min_years must be >= 3".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IndicesConfig::default();
        assert_eq!(config.baseline_start, NaiveDate::from_ymd_opt(1961, 1, 1).unwrap());
        assert_eq!(config.baseline_end, NaiveDate::from_ymd_opt(1990, 12, 31).unwrap());
        assert_eq!(config.rolling_window, 5);
        assert_eq!(config.climatology_percentile, 90.0);
        assert_eq!(config.temperature_threshold, 30.0);
        assert_eq!(config.humidity_threshold, 70.0);
        assert_eq!(config.trend_alpha, 0.05);
        assert_eq!(config.trend_min_years, 5);
        assert_eq!(
            config.trend_variables,
            vec!["RH90p", "WHD", "RHmean", "RHmin", "RHmax", "t2m"]
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = IndicesConfig::default();
        assert!(config.validate().is_ok());

        config.baseline_start = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        assert!(config.validate().is_err());

        config = IndicesConfig::default();
        config.rolling_window = 0;
        assert!(config.validate().is_err());

        config = IndicesConfig::default();
        config.climatology_percentile = 101.0;
        assert!(config.validate().is_err());

        config = IndicesConfig::default();
        config.trend_alpha = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: IndicesConfig =
            serde_yaml::from_str("rolling_window: 7\nbaseline_start: 1971-01-01\n").unwrap();
        assert_eq!(config.rolling_window, 7);
        assert_eq!(config.baseline_start, NaiveDate::from_ymd_opt(1971, 1, 1).unwrap());
        assert_eq!(config.climatology_percentile, 90.0);
    }
}
