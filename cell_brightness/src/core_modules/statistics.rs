// THEORY:
// Order statistics shared by the brightness reducer and the result aggregator.
// Percentiles use linear interpolation between the two nearest ranks: for `n`
// sorted values the p-th percentile sits at fractional rank `p / 100 * (n - 1)`.
// The median is the 50th percentile under the same rule, so an even-length input
// yields the midpoint of its two central values.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core_modules::record::ResultRecord;
use crate::error::{AnalysisError, Result};

/// Sorts a copy of the values in ascending order.
pub fn sorted(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.into_iter().collect();
    values.sort_by(f64::total_cmp);
    values
}

/// The `p`-th percentile (0..=100) of already sorted values. Returns NaN for an empty slice.
pub fn percentile_of_sorted(sorted: &[f64], p: f64) -> f64 {
    let Some(&last) = sorted.last() else {
        return f64::NAN;
    };
    if sorted.len() == 1 {
        return last;
    }

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Summary of the brightness values of a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    /// 25th percentile.
    pub q1: f64,
    /// 75th percentile.
    pub q3: f64,
}

impl SummaryStatistics {
    pub fn from_values(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(AnalysisError::invalid_state(
                "no results available; run an analysis pass first",
            ));
        }

        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        let ordered = sorted(values.iter().copied());

        Ok(Self {
            count,
            mean,
            std: variance.sqrt(),
            min: ordered[0],
            max: ordered[count - 1],
            median: percentile_of_sorted(&ordered, 50.0),
            q1: percentile_of_sorted(&ordered, 25.0),
            q3: percentile_of_sorted(&ordered, 75.0),
        })
    }

    pub fn from_records(records: &[ResultRecord]) -> Result<Self> {
        let values: Vec<f64> = records.iter().map(|r| r.brightness).collect();
        Self::from_values(&values)
    }
}

impl fmt::Display for SummaryStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "count:  {}", self.count)?;
        writeln!(f, "mean:   {:.3}", self.mean)?;
        writeln!(f, "std:    {:.3}", self.std)?;
        writeln!(f, "min:    {:.3}", self.min)?;
        writeln!(f, "q1:     {:.3}", self.q1)?;
        writeln!(f, "median: {:.3}", self.median)?;
        writeln!(f, "q3:     {:.3}", self.q3)?;
        write!(f, "max:    {:.3}", self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn four_value_summary_uses_linear_interpolation() {
        let stats = SummaryStatistics::from_values(&[10.0, 20.0, 30.0, 40.0]).unwrap();
        assert_eq!(stats.count, 4);
        assert_close(stats.mean, 25.0);
        assert_close(stats.median, 25.0);
        assert_close(stats.min, 10.0);
        assert_close(stats.max, 40.0);
        assert_close(stats.q1, 17.5);
        assert_close(stats.q3, 32.5);
        assert_close(stats.std, 125.0f64.sqrt());
    }

    #[test]
    fn input_order_does_not_matter() {
        let a = SummaryStatistics::from_values(&[40.0, 10.0, 30.0, 20.0]).unwrap();
        let b = SummaryStatistics::from_values(&[10.0, 20.0, 30.0, 40.0]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_value_has_zero_spread() {
        let stats = SummaryStatistics::from_values(&[7.5]).unwrap();
        assert_close(stats.std, 0.0);
        assert_close(stats.q1, 7.5);
        assert_close(stats.q3, 7.5);
    }

    #[test]
    fn empty_input_is_invalid_state() {
        assert!(matches!(
            SummaryStatistics::from_values(&[]),
            Err(AnalysisError::InvalidState(_))
        ));
    }

    #[test]
    fn ninety_fifth_percentile_interpolates() {
        let values: Vec<f64> = (0..=10).map(f64::from).collect();
        assert_close(percentile_of_sorted(&values, 95.0), 9.5);
        assert_close(percentile_of_sorted(&values, 0.0), 0.0);
        assert_close(percentile_of_sorted(&values, 100.0), 10.0);
    }
}
