//! Mann-Kendall trend test and Sen's slope for a single series.

use std::collections::HashMap;

use chunked_array::Value;
use serde::{Deserialize, Serialize};

use crate::error::TrendError;

/// Direction reported by the test at the chosen significance level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    #[serde(rename = "no trend")]
    NoTrend,
}

/// Full result of the original Mann-Kendall test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendTest {
    /// Trend direction at significance `alpha`.
    pub trend: TrendDirection,
    /// Whether the trend is significant (`p < alpha`).
    pub h: bool,
    /// Two-sided p-value.
    pub p: f64,
    /// Normalized test statistic.
    pub z: f64,
    /// Kendall's tau.
    pub tau: f64,
    /// Mann-Kendall score.
    pub s: f64,
    /// Tie-corrected variance of `s`.
    pub var_s: f64,
    /// Sen's slope (per step).
    pub slope: f64,
    /// Sen's intercept.
    pub intercept: f64,
}

/// Mann-Kendall score: sum of sign(x[j] - x[i]) over all i < j.
pub fn mk_score(x: &[f64]) -> f64 {
    let mut s = 0i64;
    for i in 0..x.len() {
        for j in i + 1..x.len() {
            s += match x[j].partial_cmp(&x[i]) {
                Some(std::cmp::Ordering::Greater) => 1,
                Some(std::cmp::Ordering::Less) => -1,
                _ => 0,
            };
        }
    }
    s as f64
}

/// Variance of the score, corrected for tied groups.
pub fn variance_s(x: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mut ties: HashMap<u64, usize> = HashMap::new();
    for v in x {
        // -0.0 and 0.0 are the same value
        let key = if *v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() };
        *ties.entry(key).or_default() += 1;
    }
    let tie_term: f64 = ties
        .values()
        .filter(|&&t| t > 1)
        .map(|&t| {
            let t = t as f64;
            t * (t - 1.0) * (2.0 * t + 5.0)
        })
        .sum();
    (n * (n - 1.0) * (2.0 * n + 5.0) - tie_term) / 18.0
}

/// Normalized statistic with continuity correction.
pub fn z_score(s: f64, var_s: f64) -> f64 {
    if s > 0.0 {
        (s - 1.0) / var_s.sqrt()
    } else if s < 0.0 {
        (s + 1.0) / var_s.sqrt()
    } else {
        0.0
    }
}

/// Two-sided p-value of a standard normal statistic.
pub fn two_sided_p(z: f64) -> f64 {
    libm::erfc(z.abs() / std::f64::consts::SQRT_2)
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Sen's slope (median pairwise slope) and intercept.
///
/// Positions are the indices of `x`, so the slope is per step.
pub fn sens_slope(x: &[f64]) -> (f64, f64) {
    let n = x.len();
    if n < 2 {
        return (f64::NAN, f64::NAN);
    }
    let mut slopes = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in i + 1..n {
            slopes.push((x[j] - x[i]) / (j - i) as f64);
        }
    }
    let slope = median(&mut slopes);
    let mut values = x.to_vec();
    let intercept = median(&mut values) - (n - 1) as f64 / 2.0 * slope;
    (slope, intercept)
}

/// Original (non-modified) Mann-Kendall test on a series without gaps.
pub fn original_test(x: &[f64], alpha: f64) -> Result<TrendTest, TrendError> {
    let n = x.len();
    if n < 2 {
        return Err(TrendError::InsufficientHistory {
            valid: n,
            required: 2,
        });
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(TrendError::NumericalFailure(
            "series contains non-finite values".to_string(),
        ));
    }

    let s = mk_score(x);
    let var_s = variance_s(x);
    if var_s < 0.0 || (var_s == 0.0 && s != 0.0) {
        return Err(TrendError::NumericalFailure(format!(
            "invalid variance {} for score {}",
            var_s, s
        )));
    }
    let z = z_score(s, var_s);
    let p = two_sided_p(z);
    let tau = s / (0.5 * n as f64 * (n as f64 - 1.0));
    let (slope, intercept) = sens_slope(x);

    if !(z.is_finite() && p.is_finite() && slope.is_finite() && intercept.is_finite()) {
        return Err(TrendError::NumericalFailure(format!(
            "non-finite statistic (z={}, p={}, slope={})",
            z, p, slope
        )));
    }

    let h = p < alpha;
    let trend = match (h, z > 0.0) {
        (true, true) => TrendDirection::Increasing,
        (true, false) => TrendDirection::Decreasing,
        (false, _) => TrendDirection::NoTrend,
    };

    Ok(TrendTest {
        trend,
        h,
        p,
        z,
        tau,
        s,
        var_s,
        slope,
        intercept,
    })
}

/// Run the test on a series with gaps.
///
/// Missing years are dropped and the remaining values are treated as
/// consecutive. Fewer than `min_valid` remaining values is
/// [`TrendError::InsufficientHistory`].
pub fn mann_kendall(series: &[Value], alpha: f64, min_valid: usize) -> Result<TrendTest, TrendError> {
    let valid: Vec<f64> = series
        .iter()
        .filter_map(|v| v.filter(|x| !x.is_nan()))
        .collect();
    if valid.len() < min_valid {
        return Err(TrendError::InsufficientHistory {
            valid: valid.len(),
            required: min_valid,
        });
    }
    original_test(&valid, alpha)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> Vec<Value> {
        values.iter().map(|&v| Some(v)).collect()
    }

    #[test]
    fn test_increasing_series() {
        let result = mann_kendall(&series(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]), 0.05, 5).unwrap();
        assert!((result.slope - 1.0).abs() < 1e-12);
        assert_eq!(result.s, 15.0);
        assert!((result.var_s - 28.333333333333332).abs() < 1e-9);
        assert!((result.tau - 1.0).abs() < 1e-12);
        assert!(result.p < 0.05);
        assert!((result.p - 0.008535).abs() < 1e-4);
        assert!(result.h);
        assert_eq!(result.trend, TrendDirection::Increasing);
        assert!((result.intercept - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_series() {
        let result = mann_kendall(&series(&[5.0, 5.0, 5.0, 5.0, 5.0]), 0.05, 5).unwrap();
        assert_eq!(result.slope, 0.0);
        assert_eq!(result.p, 1.0);
        assert_eq!(result.s, 0.0);
        assert_eq!(result.var_s, 0.0);
        assert_eq!(result.trend, TrendDirection::NoTrend);
    }

    #[test]
    fn test_decreasing_with_ties() {
        let x = [9.0, 7.0, 7.0, 5.0, 4.0, 4.0, 1.0];
        let result = original_test(&x, 0.05).unwrap();
        assert!(result.s < 0.0);
        // two tied pairs reduce the variance
        let n = 7.0;
        let untied = n * (n - 1.0) * (2.0 * n + 5.0) / 18.0;
        assert!((result.var_s - (untied - 2.0 * 2.0 * 1.0 * 9.0 / 18.0)).abs() < 1e-9);
        assert_eq!(result.trend, TrendDirection::Decreasing);
        assert!(result.slope < 0.0);
    }

    #[test]
    fn test_insufficient_history() {
        let x = [Some(2.0), None, None, Some(3.0), None];
        assert_eq!(
            mann_kendall(&x, 0.05, 5),
            Err(TrendError::InsufficientHistory {
                valid: 2,
                required: 5
            })
        );
    }

    #[test]
    fn test_gaps_are_compressed() {
        let x = [Some(1.0), None, Some(2.0), Some(3.0), None, Some(4.0), Some(5.0)];
        let result = mann_kendall(&x, 0.05, 5).unwrap();
        // positions after dropping gaps are 0..5, so the slope is 1 per step
        assert!((result.slope - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_is_numerical_failure() {
        let x = [1.0, 2.0, f64::INFINITY, 4.0, 5.0];
        assert!(matches!(
            original_test(&x, 0.05),
            Err(TrendError::NumericalFailure(_))
        ));
    }

    #[test]
    fn test_two_sided_p() {
        assert_eq!(two_sided_p(0.0), 1.0);
        assert!((two_sided_p(1.959964) - 0.05).abs() < 1e-6);
        assert!((two_sided_p(-1.959964) - 0.05).abs() < 1e-6);
    }
}
