// THEORY:
// Synthetic photoluminescence plates for demos and tests. A plate is a dark
// background carrying a rows x cols array of square cells. Every cell gets its own
// base intensity, some intra-cell variation, and the whole plate gets sensor noise,
// so the result looks like a real micrograph while the true layout and intensities
// stay known.
//
// Generation is seeded, so the same `SampleSpec` always yields the same plate.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::core_modules::intensity_grid::IntensityGrid;
use crate::error::{AnalysisError, Result};

/// Layout and noise parameters of a synthetic plate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleSpec {
    pub rows: u32,
    pub cols: u32,
    /// Side of every square cell, in pixels.
    pub cell_size: u32,
    /// Gap between cells and between the outer cells and the image edge.
    pub spacing: u32,
    /// Intensity of the background.
    pub background: f64,
    /// Standard deviation of the sensor noise added to the whole plate.
    pub noise_std: f64,
    /// Intra-cell variation, as a fraction of the cell's base intensity.
    pub cell_variation: f64,
    pub seed: u64,
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self {
            rows: 3,
            cols: 4,
            cell_size: 100,
            spacing: 20,
            background: 30.0,
            noise_std: 0.1 * 255.0,
            cell_variation: 0.1,
            seed: 7,
        }
    }
}

/// Where a synthetic cell was painted and how bright it was meant to be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleCell {
    pub row: u32,
    pub col: u32,
    pub x: u32,
    pub y: u32,
    pub true_brightness: f64,
}

impl SampleSpec {
    pub fn image_width(&self) -> u32 {
        self.cols * self.cell_size + (self.cols + 1) * self.spacing
    }

    pub fn image_height(&self) -> u32 {
        self.rows * self.cell_size + (self.rows + 1) * self.spacing
    }
}

fn normal(mean: f64, std: f64) -> Result<Normal<f64>> {
    Normal::new(mean, std).map_err(|e| AnalysisError::invalid_argument("noise", e.to_string()))
}

/// Renders a plate and returns it with the ground truth of every cell, row-major.
pub fn sample_image(spec: &SampleSpec) -> Result<(IntensityGrid, Vec<SampleCell>)> {
    if spec.rows == 0 || spec.cols == 0 || spec.cell_size == 0 {
        return Err(AnalysisError::invalid_argument(
            "sample",
            "rows, cols and cell_size must be positive",
        ));
    }

    let width = spec.image_width();
    let height = spec.image_height();
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let mut canvas = vec![spec.background; width as usize * height as usize];
    let mut cells = Vec::with_capacity((spec.rows * spec.cols) as usize);

    for row in 0..spec.rows {
        for col in 0..spec.cols {
            let x = spec.spacing + col * (spec.cell_size + spec.spacing);
            let y = spec.spacing + row * (spec.cell_size + spec.spacing);
            let base = rng.random_range(100.0..250.0);
            let variation = normal(0.0, base * spec.cell_variation)?;

            for py in y..y + spec.cell_size {
                for px in x..x + spec.cell_size {
                    canvas[(py * width + px) as usize] = base + variation.sample(&mut rng);
                }
            }
            cells.push(SampleCell {
                row,
                col,
                x,
                y,
                true_brightness: base,
            });
        }
    }

    let sensor = normal(0.0, spec.noise_std)?;
    let samples = canvas
        .into_iter()
        .map(|value| (value + sensor.sample(&mut rng)).clamp(0.0, 255.0) as u8)
        .collect();
    Ok((IntensityGrid::from_raw(width, height, samples)?, cells))
}
