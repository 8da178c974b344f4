// THEORY:
// The brightness reducer turns the samples under one region into one number. It is
// the only place where pixel data is summarized, and it is deliberately small: slice
// the region out of the grid, then apply one of four reductions.
//
// Key architectural principles:
// 1.  **Closed Set of Methods**: The reduction is chosen from `BrightnessMethod`.
//     Textual tokens are parsed once at the boundary; an unknown token is an
//     `InvalidArgument`, not a silent default.
// 2.  **Checked Slicing**: Extraction goes through `IntensityGrid::region_samples`,
//     which refuses regions that reach past the image edge.
// 3.  **In-place Result**: `reduce` writes the value into the region it measured and
//     returns the same value, so a region always carries its latest measurement.

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core_modules::intensity_grid::IntensityGrid;
use crate::core_modules::region::Region;
use crate::core_modules::statistics::{percentile_of_sorted, sorted};
use crate::error::{AnalysisError, Result};

/// The fixed rank used by [`BrightnessMethod::Percentile`].
pub const BRIGHTNESS_PERCENTILE: f64 = 95.0;

/// How the samples of a region are reduced to a single brightness value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrightnessMethod {
    /// Arithmetic mean of all samples.
    #[default]
    Mean,
    /// 50th percentile, interpolated between the two central samples for even counts.
    Median,
    /// The brightest sample.
    Max,
    /// 95th percentile, interpolated like the median.
    Percentile,
}

impl BrightnessMethod {
    pub const ALL: [BrightnessMethod; 4] = [Self::Mean, Self::Median, Self::Max, Self::Percentile];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Max => "max",
            Self::Percentile => "percentile",
        }
    }

    /// Applies the reduction to a non-empty set of samples.
    pub fn apply(&self, samples: &[u8]) -> f64 {
        match self {
            Self::Mean => mean(samples),
            Self::Median => percentile(samples, 50.0),
            Self::Max => samples.iter().copied().max().map_or(f64::NAN, f64::from),
            Self::Percentile => percentile(samples, BRIGHTNESS_PERCENTILE),
        }
    }
}

impl fmt::Display for BrightnessMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrightnessMethod {
    type Err = AnalysisError;

    fn from_str(token: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == token)
            .ok_or_else(|| {
                AnalysisError::invalid_argument(
                    "brightness method",
                    format!("unknown method `{token}` (expected mean, median, max or percentile)"),
                )
            })
    }
}

/// Measures a region without touching it.
pub fn measure(grid: &IntensityGrid, region: &Region, method: BrightnessMethod) -> Result<f64> {
    let samples = grid.region_samples(region)?;
    let brightness = method.apply(&samples);
    debug!("{} {} brightness = {:.3}", region.id, method, brightness);
    Ok(brightness)
}

/// Measures a region and stores the value in `region.brightness`.
pub fn reduce(grid: &IntensityGrid, region: &mut Region, method: BrightnessMethod) -> Result<f64> {
    let brightness = measure(grid, region, method)?;
    region.brightness = Some(brightness);
    Ok(brightness)
}

fn mean(samples: &[u8]) -> f64 {
    if samples.is_empty() {
        return f64::NAN;
    }

    // Chunked accumulation keeps the inner loop vectorizable.
    const CHUNK_SIZE: usize = 64;
    let mut total = 0u64;
    for chunk in samples.chunks(CHUNK_SIZE) {
        total += chunk.iter().map(|&s| s as u64).sum::<u64>();
    }
    total as f64 / samples.len() as f64
}

fn percentile(samples: &[u8], p: f64) -> f64 {
    let ordered = sorted(samples.iter().map(|&s| f64::from(s)));
    percentile_of_sorted(&ordered, p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_from_rows(rows: &[&[u8]]) -> IntensityGrid {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let samples = rows.iter().flat_map(|r| r.iter().copied()).collect();
        IntensityGrid::from_raw(width, height, samples).unwrap()
    }

    #[test]
    fn methods_on_a_known_region() {
        let grid = grid_from_rows(&[&[10, 20, 30, 40], &[50, 60, 70, 80]]);
        let region = Region::new("all", 0, 0, 4, 2).unwrap();

        assert_eq!(measure(&grid, &region, BrightnessMethod::Mean).unwrap(), 45.0);
        assert_eq!(measure(&grid, &region, BrightnessMethod::Median).unwrap(), 45.0);
        assert_eq!(measure(&grid, &region, BrightnessMethod::Max).unwrap(), 80.0);
        // rank 0.95 * 7 = 6.65 -> 70 + 0.65 * 10
        let p95 = measure(&grid, &region, BrightnessMethod::Percentile).unwrap();
        assert!((p95 - 76.5).abs() < 1e-9);
    }

    #[test]
    fn reduce_writes_brightness_into_region() {
        let grid = grid_from_rows(&[&[0, 0, 0], &[0, 90, 0], &[0, 0, 0]]);
        let mut region = Region::new("center", 1, 1, 1, 1).unwrap();
        let value = reduce(&grid, &mut region, BrightnessMethod::Mean).unwrap();
        assert_eq!(value, 90.0);
        assert_eq!(region.brightness, Some(90.0));
    }

    #[test]
    fn out_of_bounds_region_fails_and_keeps_old_value() {
        let grid = grid_from_rows(&[&[1, 2], &[3, 4]]);
        let mut region = Region::new("big", 1, 1, 2, 2).unwrap();
        region.brightness = Some(12.0);
        let err = reduce(&grid, &mut region, BrightnessMethod::Max).unwrap_err();
        assert!(matches!(err, AnalysisError::OutOfBounds { .. }));
        assert_eq!(region.brightness, Some(12.0));
    }

    #[test]
    fn order_of_reductions_on_skewed_samples() {
        // Baseline with a few bright outliers, the typical shape of a lit cell.
        let grid = grid_from_rows(&[&[20, 21, 22, 23], &[24, 25, 200, 255]]);
        let region = Region::new("skewed", 0, 0, 4, 2).unwrap();
        let max = measure(&grid, &region, BrightnessMethod::Max).unwrap();
        let mean = measure(&grid, &region, BrightnessMethod::Mean).unwrap();
        let median = measure(&grid, &region, BrightnessMethod::Median).unwrap();
        assert!(max >= mean && mean >= median);
    }

    #[test]
    fn uniform_region_reduces_to_its_level() {
        let grid = IntensityGrid::from_raw(6, 6, vec![133; 36]).unwrap();
        let region = Region::new("flat", 1, 1, 4, 3).unwrap();
        for method in BrightnessMethod::ALL {
            assert_eq!(measure(&grid, &region, method).unwrap(), 133.0, "{method}");
        }
    }

    #[test]
    fn method_tokens_parse_strictly() {
        assert_eq!("median".parse::<BrightnessMethod>().unwrap(), BrightnessMethod::Median);
        assert_eq!("percentile".parse::<BrightnessMethod>().unwrap(), BrightnessMethod::Percentile);
        let err = "average".parse::<BrightnessMethod>().unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidArgument { .. }));
    }
}
