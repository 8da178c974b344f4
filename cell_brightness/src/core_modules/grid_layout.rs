// THEORY:
// The `GridLayout` is the regular-grid strategy of the region locator. Where the
// detector discovers cells, the layout imposes them: the image is divided into a
// uniform rows x cols arrangement of equal rectangles, separated by a fixed spacing
// and inset from the image edges by a fixed margin.
//
// Key architectural principles:
// 1.  **Slicing Math**: Each axis is solved independently. The usable length is the
//     image dimension minus both margins minus every gap between cells; it is floor
//     divided by the cell count. Pixels lost to the floor division stay unused at
//     the trailing edge, they are never redistributed.
// 2.  **Row-major Order**: Cells are emitted row by row, left to right, and named
//     `cell_r{row}_c{col}` with 1-based indices.
// 3.  **Rejected Degenerate Layouts**: A layout with no rows, no columns, or one
//     whose cells would be zero or negative in size is an `InvalidArgument`.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core_modules::intensity_grid::IntensityGrid;
use crate::core_modules::region::Region;
use crate::error::{AnalysisError, Result};

/// A regular rows x cols arrangement of equal cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLayout {
    /// Number of cell rows.
    pub rows: u32,
    /// Number of cell columns.
    pub cols: u32,
    /// Distance from every image edge to the outermost cells, in pixels.
    #[serde(default)]
    pub margin: u32,
    /// Gap between neighbouring cells, in pixels.
    #[serde(default)]
    pub spacing: u32,
}

impl GridLayout {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self {
            rows,
            cols,
            margin: 0,
            spacing: 0,
        }
    }

    pub fn with_margin(mut self, margin: u32) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_spacing(mut self, spacing: u32) -> Self {
        self.spacing = spacing;
        self
    }

    /// Cell `(width, height)` for an image of the given size.
    pub fn cell_size(&self, image_width: u32, image_height: u32) -> Result<(u32, u32)> {
        let width = self.axis_cell_size("cols", image_width, self.cols)?;
        let height = self.axis_cell_size("rows", image_height, self.rows)?;
        Ok((width, height))
    }

    fn axis_cell_size(&self, axis: &'static str, dimension: u32, count: u32) -> Result<u32> {
        if count == 0 {
            return Err(AnalysisError::invalid_argument(axis, "must be at least 1"));
        }

        let usable = dimension as i64
            - 2 * self.margin as i64
            - (count as i64 - 1) * self.spacing as i64;
        let cell = usable.div_euclid(count as i64);
        if cell <= 0 {
            return Err(AnalysisError::invalid_argument(
                axis,
                format!(
                    "{count} cells with margin {} and spacing {} do not fit in {dimension} pixels",
                    self.margin, self.spacing
                ),
            ));
        }
        Ok(cell as u32)
    }

    /// Partitions the grid into `rows * cols` regions in row-major order.
    pub fn partition(&self, grid: &IntensityGrid) -> Result<Vec<Region>> {
        let (cell_width, cell_height) = self.cell_size(grid.width(), grid.height())?;
        debug!(
            "grid {}x{} over {}x{} image: cells {}x{}",
            self.rows,
            self.cols,
            grid.width(),
            grid.height(),
            cell_width,
            cell_height
        );

        let mut regions = Vec::with_capacity((self.rows * self.cols) as usize);
        for row in 0..self.rows {
            for col in 0..self.cols {
                let x = self.margin + col * (cell_width + self.spacing);
                let y = self.margin + row * (cell_height + self.spacing);
                regions.push(Region::new(
                    Region::grid_id(row, col),
                    x,
                    y,
                    cell_width,
                    cell_height,
                )?);
            }
        }
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u32, height: u32) -> IntensityGrid {
        IntensityGrid::from_raw(width, height, vec![0; (width * height) as usize]).unwrap()
    }

    #[test]
    fn partition_covers_layout_without_overlap() {
        let grid = blank(103, 77);
        for (rows, cols, margin, spacing) in [(1, 1, 0, 0), (3, 4, 5, 2), (7, 2, 0, 3), (5, 5, 10, 0)] {
            let layout = GridLayout::new(rows, cols).with_margin(margin).with_spacing(spacing);
            let regions = layout.partition(&grid).unwrap();

            assert_eq!(regions.len(), (rows * cols) as usize);
            let (w, h) = (regions[0].width, regions[0].height);
            assert!(regions.iter().all(|r| r.width == w && r.height == h));
            assert!(regions.iter().all(|r| grid.contains(r)));
            for (i, a) in regions.iter().enumerate() {
                for b in &regions[i + 1..] {
                    assert!(!a.overlaps(b), "{} overlaps {}", a.id, b.id);
                }
            }
        }
    }

    #[test]
    fn floor_division_leaves_trailing_pixels_unused() {
        let grid = blank(100, 50);
        let layout = GridLayout::new(2, 3).with_margin(2).with_spacing(3);
        let regions = layout.partition(&grid).unwrap();

        // (100 - 4 - 6) / 3 = 30, (50 - 4 - 3) / 2 = 21
        assert_eq!((regions[0].width, regions[0].height), (30, 21));
        let last = regions.last().unwrap();
        assert_eq!(last.id, "cell_r2_c3");
        assert_eq!((last.x, last.y), (2 + 2 * 33, 2 + 24));
        assert_eq!(regions[1].id, "cell_r1_c2");
    }

    #[test]
    fn degenerate_layouts_are_rejected() {
        let grid = blank(20, 20);
        assert!(GridLayout::new(0, 2).partition(&grid).is_err());
        assert!(GridLayout::new(2, 0).partition(&grid).is_err());
        assert!(GridLayout::new(30, 1).partition(&grid).is_err());
        assert!(GridLayout::new(2, 2).with_margin(10).partition(&grid).is_err());
        assert!(GridLayout::new(3, 3).with_spacing(9).partition(&grid).is_err());
    }
}
