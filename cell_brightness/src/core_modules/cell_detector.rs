// THEORY:
// The `CellDetector` is the automatic strategy of the region locator. It finds
// bright rectangular cells on a darker background without any prior knowledge of
// their layout, using a short pipeline of image-library primitives.
//
// Key architectural principles & algorithm steps:
// 1.  **Binarization**: The grid is split into foreground and background with the
//     configured `ThresholdMethod` (see `threshold`).
// 2.  **Border Following**: The outer borders of connected foreground components are
//     traced. Only external borders are kept; borders of holes, and anything nested
//     inside a hole, are ignored.
// 3.  **Measurement**: For each external border the enclosing axis-aligned bounding
//     box is computed, together with the polygon area enclosed by the border chain.
//     The polygon area, not the box area, decides whether a component is a cell.
// 4.  **Filtering**: Components whose area is below `min_area` are discarded.
// 5.  **Traceable Numbering**: Identifiers are `cell_{n}` where `n` is the 1-based
//     index of the border among ALL external borders found, before filtering, counted
//     in reverse discovery order (the last border met by the raster scan is `cell_1`).
//     This is the order OpenCV's external contour retrieval reports, so ids match
//     tables produced with it. Kept identifiers may skip numbers; each one still
//     points back at the raw border it came from.
// 6.  **Stateless Utility**: Detection takes a grid and a configuration and returns
//     regions. It does not know about sessions or earlier detections.

use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::point::Point;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::core_modules::intensity_grid::IntensityGrid;
use crate::core_modules::region::Region;
use crate::core_modules::threshold::{ThresholdMethod, binarize};

/// Default minimum component area, in square pixels.
pub const DEFAULT_MIN_AREA: f64 = 100.0;

/// Tunable parameters of automatic detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Components enclosing less than this polygon area are discarded.
    pub min_area: f64,
    /// How the grid is binarized before border following.
    pub threshold: ThresholdMethod,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_area: DEFAULT_MIN_AREA,
            threshold: ThresholdMethod::default(),
        }
    }
}

/// An external border found during detection, before area filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedComponent {
    /// 1-based position among all external borders.
    pub ordinal: usize,
    /// Bounding box of the border pixels, inclusive.
    pub bounds: (Point<i32>, Point<i32>),
    /// Polygon area enclosed by the border chain.
    pub area: f64,
}

impl DetectedComponent {
    fn into_region(self) -> Region {
        let (min, max) = self.bounds;
        Region {
            id: Region::sequential_id(self.ordinal),
            x: min.x as u32,
            y: min.y as u32,
            width: (max.x - min.x + 1) as u32,
            height: (max.y - min.y + 1) as u32,
            brightness: None,
        }
    }
}

pub mod cell_detector {
    use super::*; // Make the detector types from the parent module available.

    /// The main function of the automatic locator.
    /// Takes a grid and returns one region per sufficiently large bright component.
    pub fn detect_cells(grid: &IntensityGrid, config: &DetectionConfig) -> Vec<Region> {
        let components = find_components(grid, config.threshold);
        let found = components.len();

        // --- 4. Filtering ---
        let regions: Vec<Region> = components
            .into_iter()
            .filter(|component| {
                let keep = component.area >= config.min_area;
                debug!(
                    "border {} area {:.1} {}",
                    component.ordinal,
                    component.area,
                    if keep { "kept" } else { "discarded" }
                );
                keep
            })
            .map(DetectedComponent::into_region)
            .collect();

        info!(
            "detected {} cells from {} external borders ({} threshold, min area {})",
            regions.len(),
            found,
            config.threshold,
            config.min_area
        );
        regions
    }

    /// Runs stages 1 to 3 and returns every external border, numbered, unfiltered.
    pub fn find_components(grid: &IntensityGrid, threshold: ThresholdMethod) -> Vec<DetectedComponent> {
        // --- 1. Binarization ---
        let mask = binarize(grid, threshold);

        // --- 2. Border Following ---
        let contours: Vec<Contour<i32>> = find_contours(&mask);

        // Borders come back in raster discovery order; numbering runs from the last
        // one found, so the bottom-most component is `cell_1`.
        let mut external: Vec<Contour<i32>> = contours.into_iter().filter(is_external).collect();
        external.reverse();

        // --- 3. Measurement ---
        external
            .into_iter()
            .enumerate()
            .filter_map(|(index, contour)| {
                let bounds = bounding_box(&contour.points)?;
                Some(DetectedComponent {
                    ordinal: index + 1,
                    bounds,
                    area: polygon_area(&contour.points),
                })
            })
            .collect()
    }

    fn is_external(contour: &Contour<i32>) -> bool {
        contour.border_type == BorderType::Outer && contour.parent.is_none()
    }

    /// Inclusive bounding box of a point chain, `None` for an empty chain.
    pub fn bounding_box(points: &[Point<i32>]) -> Option<(Point<i32>, Point<i32>)> {
        let first = points.first()?;
        let mut min = *first;
        let mut max = *first;
        for point in points {
            min.x = min.x.min(point.x);
            min.y = min.y.min(point.y);
            max.x = max.x.max(point.x);
            max.y = max.y.max(point.y);
        }
        Some((min, max))
    }

    /// Area enclosed by a closed point chain (shoelace formula).
    pub fn polygon_area(points: &[Point<i32>]) -> f64 {
        if points.len() < 3 {
            return 0.0;
        }
        let twice_area: i64 = points
            .iter()
            .zip(points.iter().cycle().skip(1))
            .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
            .sum();
        twice_area.abs() as f64 / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::cell_detector::*;
    use super::*;

    /// Dark canvas with bright axis-aligned squares painted at (x, y, side, level).
    fn canvas(width: u32, height: u32, squares: &[(u32, u32, u32, u8)]) -> IntensityGrid {
        let mut samples = vec![20u8; (width * height) as usize];
        for &(x, y, side, level) in squares {
            for row in y..y + side {
                for col in x..x + side {
                    samples[(row * width + col) as usize] = level;
                }
            }
        }
        IntensityGrid::from_raw(width, height, samples).unwrap()
    }

    #[test]
    fn single_square_is_found_with_exact_bounds() {
        let grid = canvas(120, 100, &[(30, 25, 40, 180)]);
        let cells = detect_cells(&grid, &DetectionConfig::default());

        assert_eq!(cells.len(), 1);
        let cell = &cells[0];
        assert_eq!(cell.id, "cell_1");
        assert!(cell.x.abs_diff(30) <= 1 && cell.y.abs_diff(25) <= 1);
        assert!(cell.width.abs_diff(40) <= 1 && cell.height.abs_diff(40) <= 1);

        let mean = crate::core_modules::brightness::measure(
            &grid,
            cell,
            crate::core_modules::brightness::BrightnessMethod::Mean,
        )
        .unwrap();
        assert_eq!(mean, 180.0);
    }

    #[test]
    fn numbering_counts_discarded_components() {
        // The large square (row 40) is numbered before the small speck above it (row 5).
        let grid = canvas(120, 120, &[(10, 5, 3, 200), (40, 40, 30, 200)]);
        let all = find_components(&grid, ThresholdMethod::Manual);
        assert_eq!(all.len(), 2);
        assert_eq!((all[0].ordinal, all[0].bounds.0.y), (1, 40));
        assert_eq!((all[1].ordinal, all[1].bounds.0.y), (2, 5));

        let cells = detect_cells(
            &grid,
            &DetectionConfig {
                min_area: 100.0,
                threshold: ThresholdMethod::Manual,
            },
        );
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].id, "cell_1");
    }

    #[test]
    fn discarded_bottom_component_leaves_a_gap_in_numbering() {
        // A speck below the square is found last and therefore takes `cell_1`.
        let grid = canvas(120, 120, &[(40, 10, 30, 200), (10, 100, 3, 200)]);
        let cells = detect_cells(
            &grid,
            &DetectionConfig {
                min_area: 100.0,
                threshold: ThresholdMethod::Manual,
            },
        );
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].id, "cell_2");
        assert!(cells[0].y.abs_diff(10) <= 1);
    }

    #[test]
    fn rows_of_cells_are_numbered_from_the_bottom() {
        let grid = canvas(200, 120, &[(10, 10, 30, 200), (100, 10, 30, 200), (10, 70, 30, 200)]);
        let cells = detect_cells(
            &grid,
            &DetectionConfig {
                min_area: 100.0,
                threshold: ThresholdMethod::Manual,
            },
        );
        let ids: Vec<(&str, u32)> = cells.iter().map(|c| (c.id.as_str(), c.y)).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], ("cell_1", 70));
        assert!(ids[1..].iter().all(|&(_, y)| y == 10));
    }

    #[test]
    fn holes_and_nested_components_are_ignored() {
        // A bright frame with a dark hole and a bright island inside the hole.
        let mut grid = canvas(100, 100, &[(10, 10, 80, 220)]);
        let mut samples = grid.as_gray_image().as_raw().clone();
        for row in 25..75u32 {
            for col in 25..75u32 {
                samples[(row * 100 + col) as usize] = 20;
            }
        }
        for row in 40..60u32 {
            for col in 40..60u32 {
                samples[(row * 100 + col) as usize] = 220;
            }
        }
        grid = IntensityGrid::from_raw(100, 100, samples).unwrap();

        let cells = detect_cells(
            &grid,
            &DetectionConfig {
                min_area: 10.0,
                threshold: ThresholdMethod::Manual,
            },
        );
        assert_eq!(cells.len(), 1);
        assert_eq!((cells[0].x, cells[0].y, cells[0].width, cells[0].height), (10, 10, 80, 80));
    }

    #[test]
    fn polygon_area_of_a_square_border() {
        let square = [
            Point::new(0, 0),
            Point::new(0, 4),
            Point::new(4, 4),
            Point::new(4, 0),
        ];
        assert_eq!(polygon_area(&square), 16.0);
        assert_eq!(polygon_area(&square[..2]), 0.0);
    }

    #[test]
    fn empty_image_yields_no_cells() {
        let grid = canvas(50, 50, &[]);
        let cells = detect_cells(
            &grid,
            &DetectionConfig {
                min_area: 1.0,
                threshold: ThresholdMethod::Manual,
            },
        );
        assert!(cells.is_empty());
    }
}
