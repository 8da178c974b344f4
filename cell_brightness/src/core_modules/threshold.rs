// THEORY:
// Binarization is the first stage of automatic cell detection. It splits the grid
// into foreground (255) and background (0) so that bright cells become connected
// foreground components. A sample is foreground when it is strictly brighter than
// its threshold.
//
// Three strategies are supported:
// - Otsu: one global level chosen from the histogram to best separate two classes.
// - Adaptive: every sample is compared with a Gaussian-weighted mean of its 11x11
//   neighbourhood, lowered by a small constant, which tolerates uneven illumination.
// - Manual: a fixed cutoff at mid-scale.

use std::fmt;
use std::str::FromStr;

use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::filter::gaussian_blur_f32;
use serde::{Deserialize, Serialize};

use crate::core_modules::intensity_grid::IntensityGrid;
use crate::error::{AnalysisError, Result};

/// Fixed cutoff of the manual strategy.
pub const MANUAL_THRESHOLD: u8 = 127;
/// Side of the adaptive neighbourhood, in pixels.
pub const ADAPTIVE_BLOCK_SIZE: u32 = 11;
/// Amount subtracted from the local mean before comparing.
pub const ADAPTIVE_OFFSET: i16 = 2;

const FOREGROUND: Luma<u8> = Luma([255]);
const BACKGROUND: Luma<u8> = Luma([0]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMethod {
    #[default]
    Otsu,
    Adaptive,
    Manual,
}

impl ThresholdMethod {
    pub const ALL: [ThresholdMethod; 3] = [Self::Otsu, Self::Adaptive, Self::Manual];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Otsu => "otsu",
            Self::Adaptive => "adaptive",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ThresholdMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThresholdMethod {
    type Err = AnalysisError;

    fn from_str(token: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == token)
            .ok_or_else(|| {
                AnalysisError::invalid_argument(
                    "threshold method",
                    format!("unknown method `{token}` (expected otsu, adaptive or manual)"),
                )
            })
    }
}

/// Produces a binary mask of the grid: 255 for foreground, 0 for background.
pub fn binarize(grid: &IntensityGrid, method: ThresholdMethod) -> GrayImage {
    let image = grid.as_gray_image();
    match method {
        ThresholdMethod::Otsu => global_threshold(image, otsu_level(image)),
        ThresholdMethod::Manual => global_threshold(image, MANUAL_THRESHOLD),
        ThresholdMethod::Adaptive => adaptive_threshold(image),
    }
}

fn global_threshold(image: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y).0[0] > level {
            FOREGROUND
        } else {
            BACKGROUND
        }
    })
}

/// Sigma matching an 11-tap Gaussian kernel: 0.3 * ((size - 1) / 2 - 1) + 0.8.
fn adaptive_sigma() -> f32 {
    0.3 * ((ADAPTIVE_BLOCK_SIZE as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

fn adaptive_threshold(image: &GrayImage) -> GrayImage {
    let local_mean = gaussian_blur_f32(image, adaptive_sigma());
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let sample = image.get_pixel(x, y).0[0] as i16;
        let mean = local_mean.get_pixel(x, y).0[0] as i16;
        if sample > mean - ADAPTIVE_OFFSET {
            FOREGROUND
        } else {
            BACKGROUND
        }
    })
}
