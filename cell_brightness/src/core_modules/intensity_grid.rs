// THEORY:
// The `IntensityGrid` is the most fundamental data container of the analyzer: one
// grayscale image, held as 8-bit samples in row-major order with the origin at the
// top-left corner. Everything downstream (thresholding, contour extraction, grid
// partitioning, brightness reduction) reads from it; nothing ever writes to it.
//
// Key architectural principles:
// 1.  **Immutable Once Loaded**: A grid is built once, either decoded from disk or
//     wrapped around an in-memory buffer, and is then only read. A session that
//     wants a different image replaces its grid wholesale.
// 2.  **Grayscale at the Boundary**: Color sources are converted to 8-bit luma by
//     the `image` crate while loading. The core never re-derives grayscale itself.
// 3.  **Checked Extraction**: Slicing a region out of the grid is the bridge between
//     a rectangle and its samples. A rectangle that reaches past the image edge is
//     an error, never a silently truncated slice.

use std::path::Path;

use image::GrayImage;
use log::debug;

use crate::core_modules::region::Region;
use crate::error::{AnalysisError, Result};

/// A single grayscale image, read-only for its whole lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityGrid {
    pixels: GrayImage,
}

impl IntensityGrid {
    /// Decodes an image file and converts it to 8-bit grayscale.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AnalysisError::not_found(path));
        }

        let decoded = image::open(path).map_err(|source| AnalysisError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        let pixels = decoded.into_luma8();
        debug!(
            "loaded '{}' as {}x{} grayscale",
            path.display(),
            pixels.width(),
            pixels.height()
        );
        Ok(Self { pixels })
    }

    pub fn from_gray_image(pixels: GrayImage) -> Self {
        Self { pixels }
    }

    /// Wraps a row-major sample buffer. The buffer must hold exactly `width * height` samples.
    pub fn from_raw(width: u32, height: u32, samples: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        let actual = samples.len();
        GrayImage::from_raw(width, height, samples)
            .filter(|_| actual == expected)
            .map(Self::from_gray_image)
            .ok_or_else(|| {
                AnalysisError::invalid_argument(
                    "samples",
                    format!("expected {expected} samples for {width}x{height}, got {actual}"),
                )
            })
    }

    /// Writes the grid as an 8-bit grayscale image; the format follows the file extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.pixels.save(path).map_err(|source| AnalysisError::Image {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Number of columns (image width in pixels).
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Number of rows (image height in pixels).
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn sample(&self, x: u32, y: u32) -> u8 {
        self.pixels.get_pixel(x, y).0[0]
    }

    pub fn as_gray_image(&self) -> &GrayImage {
        &self.pixels
    }

    /// Returns true when the rectangle lies entirely inside the grid.
    pub fn contains(&self, region: &Region) -> bool {
        region.validate_within(self.width(), self.height()).is_ok()
    }

    /// Copies the samples of `grid[y..y+height, x..x+width]` in row-major order.
    pub fn region_samples(&self, region: &Region) -> Result<Vec<u8>> {
        region.validate_within(self.width(), self.height())?;

        let row_stride = self.width() as usize;
        let raw = self.pixels.as_raw();
        let mut samples = Vec::with_capacity(region.area() as usize);
        for row in region.y..region.y + region.height {
            let start = row as usize * row_stride + region.x as usize;
            samples.extend_from_slice(&raw[start..start + region.width as usize]);
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: u32, height: u32) -> IntensityGrid {
        let samples = (0..width * height).map(|i| (i % 256) as u8).collect();
        IntensityGrid::from_raw(width, height, samples).expect("valid ramp")
    }

    #[test]
    fn from_raw_rejects_mismatched_buffer() {
        let err = IntensityGrid::from_raw(4, 4, vec![0; 15]).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidArgument { name: "samples", .. }));
    }

    #[test]
    fn region_samples_are_row_major() {
        let grid = ramp(5, 4);
        let region = Region::new("cell_1", 1, 2, 3, 2).unwrap();
        let samples = grid.region_samples(&region).unwrap();
        assert_eq!(samples, vec![11, 12, 13, 16, 17, 18]);
    }

    #[test]
    fn region_touching_the_far_edge_is_inside() {
        let grid = ramp(5, 4);
        let region = Region::new("edge", 3, 2, 2, 2).unwrap();
        assert!(grid.contains(&region));
        assert_eq!(grid.region_samples(&region).unwrap().len(), 4);
    }

    #[test]
    fn region_past_the_edge_is_out_of_bounds() {
        let grid = ramp(5, 4);
        let region = Region::new("wide", 3, 0, 3, 1).unwrap();
        let err = grid.region_samples(&region).unwrap_err();
        match err {
            AnalysisError::OutOfBounds {
                region_id,
                image_width,
                image_height,
                ..
            } => {
                assert_eq!(region_id, "wide");
                assert_eq!((image_width, image_height), (5, 4));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn open_missing_file_is_not_found() {
        let err = IntensityGrid::open("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, AnalysisError::NotFound { .. }));
    }

    #[test]
    fn png_round_trip_preserves_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.png");
        let grid = ramp(16, 8);
        grid.save(&path).unwrap();

        let reloaded = IntensityGrid::open(&path).unwrap();
        assert_eq!(reloaded, grid);
    }
}
