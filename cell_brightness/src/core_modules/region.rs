// THEORY:
// A `Region` is the analyzer's notion of a "cell": an axis-aligned rectangle in
// grid coordinates plus an identifier and, once measured, a brightness value.
// It is a "dumb" data container. The locators produce regions, the brightness
// reducer fills in their `brightness`, and the aggregator snapshots them into
// result records.
//
// Key architectural principles:
// 1.  **Non-degenerate by Construction**: A region always has a positive width and
//     height. Fitting inside a particular grid is checked separately, because the
//     same rectangle may be reused across several images of the same layout.
// 2.  **Absent until Measured**: `brightness` is `None` until a reduction method
//     runs. It is never recomputed behind the caller's back, so a region carried
//     over to a newly loaded image keeps its old value until measured again.

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// An axis-aligned rectangular region of an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// The identifier of this cell, e.g. `cell_3` or `cell_r1_c2`.
    pub id: String,
    /// Column of the top-left corner.
    pub x: u32,
    /// Row of the top-left corner.
    pub y: u32,
    /// Width in pixels, always > 0.
    pub width: u32,
    /// Height in pixels, always > 0.
    pub height: u32,
    /// The most recently computed brightness, if any.
    pub brightness: Option<f64>,
}

impl Region {
    pub fn new(id: impl Into<String>, x: u32, y: u32, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(AnalysisError::invalid_argument(
                "region",
                format!("width and height must be positive, got {width}x{height}"),
            ));
        }
        Ok(Self {
            id: id.into(),
            x,
            y,
            width,
            height,
            brightness: None,
        })
    }

    /// Identifier used for the n-th cell (1-based) of a manual or detected set.
    pub fn sequential_id(ordinal: usize) -> String {
        format!("cell_{ordinal}")
    }

    /// Identifier used for grid cells (0-based row and column in, 1-based out).
    pub fn grid_id(row: u32, col: u32) -> String {
        format!("cell_r{}_c{}", row + 1, col + 1)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        (self.x as u64) < other.right()
            && (other.x as u64) < self.right()
            && (self.y as u64) < other.bottom()
            && (other.y as u64) < self.bottom()
    }

    /// Fails with `OutOfBounds` unless `x + width <= image_width` and `y + height <= image_height`.
    pub fn validate_within(&self, image_width: u32, image_height: u32) -> Result<()> {
        if self.right() > image_width as u64 || self.bottom() > image_height as u64 {
            return Err(AnalysisError::OutOfBounds {
                region_id: self.id.clone(),
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
                image_width,
                image_height,
            });
        }
        Ok(())
    }
}
