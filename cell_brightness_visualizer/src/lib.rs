// THEORY:
// Renders an analysis as a two-panel figure: the original image with every region
// outlined, next to a dimmed copy where each measured region is painted with a
// colormap color. The renderer only reads the grid and the regions; it never
// measures.
//
// Key architectural principles:
// 1.  **Relative Color**: Colors are normalized over the min..max brightness of the
//     region set being drawn, so the chosen colormap always spans its full range
//     from the dimmest to the brightest cell, whatever the absolute levels are.
// 2.  **Dim Then Blend**: The right panel is dimmed first and the color layer is
//     added on top at a fixed weight, so image texture stays visible under the
//     colors.
// 3.  **Unmeasured Regions**: A region without a brightness value is outlined in
//     both panels but never colored or labeled.
// 4.  **Labels**: With `show_values`, the left panel carries each value and the
//     right panel carries the cell id above its value, centered in the region.

use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;

use ab_glyph::{FontRef, PxScale};
use cell_brightness::{AnalysisError, IntensityGrid, Region, Result};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use log::debug;

pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);

/// DejaVu Sans, see `assets/DejaVuSans-LICENSE.txt`.
const LABEL_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Color ramps available for the right panel. Each is sampled with a score in
/// `0.0..=1.0` by linear interpolation between its stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Colormap {
    #[default]
    Viridis,
    Plasma,
    Cool,
    /// Blue -> yellow -> red.
    Heat,
}

impl Colormap {
    pub const ALL: [Colormap; 4] = [Self::Viridis, Self::Plasma, Self::Cool, Self::Heat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viridis => "viridis",
            Self::Plasma => "plasma",
            Self::Cool => "cool",
            Self::Heat => "heat",
        }
    }

    fn stops(&self) -> &'static [[u8; 3]] {
        match self {
            Self::Viridis => &[[68, 1, 84], [59, 82, 139], [33, 145, 140], [94, 201, 98], [253, 231, 37]],
            Self::Plasma => &[[13, 8, 135], [126, 3, 168], [204, 71, 120], [248, 149, 64], [240, 249, 33]],
            Self::Cool => &[[0, 255, 255], [255, 0, 255]],
            Self::Heat => &[[0, 0, 255], [255, 255, 0], [255, 0, 0]],
        }
    }

    /// Color at `score`, clamped to `0.0..=1.0`.
    pub fn color(&self, score: f64) -> Rgb<u8> {
        let stops = self.stops();
        let position = score.clamp(0.0, 1.0) * (stops.len() - 1) as f64;
        let lower = (position.floor() as usize).min(stops.len() - 2);
        let ratio = position - lower as f64;
        let (from, to) = (stops[lower], stops[lower + 1]);
        let channel =
            |i: usize| (from[i] as f64 + (to[i] as f64 - from[i] as f64) * ratio).round() as u8;
        Rgb([channel(0), channel(1), channel(2)])
    }
}

impl fmt::Display for Colormap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Colormap {
    type Err = AnalysisError;

    fn from_str(token: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|colormap| colormap.as_str() == token)
            .ok_or_else(|| AnalysisError::InvalidArgument {
                name: "colormap",
                reason: format!("unknown colormap `{token}` (expected viridis, plasma, cool or heat)"),
            })
    }
}

/// Appearance of the rendered figure.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Outline color on the left panel.
    pub outline: Rgb<u8>,
    /// Outline color on the colored panel.
    pub heat_outline: Rgb<u8>,
    /// Factor applied to the image under the color layer.
    pub dim_factor: f32,
    /// Weight of the color layer when it is added onto the dimmed image.
    pub heat_weight: f32,
    pub colormap: Colormap,
    /// Write brightness values (and ids on the right panel) into the regions.
    pub show_values: bool,
    /// Label height in pixels.
    pub label_scale: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            outline: RED,
            heat_outline: BLACK,
            dim_factor: 0.4,
            heat_weight: 0.8,
            colormap: Colormap::default(),
            show_values: true,
            label_scale: 12.0,
        }
    }
}

/// Brightness range of the measured regions, or `None` when none is measured.
fn brightness_range(regions: &[Region]) -> Option<(f64, f64)> {
    regions
        .iter()
        .filter_map(|region| region.brightness)
        .fold(None, |range, value| match range {
            None => Some((value, value)),
            Some((lo, hi)) => Some((lo.min(value), hi.max(value))),
        })
}

fn normalized(value: f64, (lo, hi): (f64, f64)) -> f64 {
    if hi > lo {
        (value - lo) / (hi - lo)
    } else {
        // A single level has no spread; draw it mid-ramp.
        0.5
    }
}

fn region_rect(region: &Region, offset_x: u32) -> Rect {
    Rect::at((region.x + offset_x) as i32, region.y as i32).of_size(region.width, region.height)
}

fn label_font() -> Result<FontRef<'static>> {
    FontRef::try_from_slice(LABEL_FONT)
        .map_err(|e| AnalysisError::InvalidState(format!("label font is unreadable: {e}")))
}

/// Draws `lines` stacked and centered on the region shifted by `offset_x`.
fn draw_centered_lines(
    canvas: &mut RgbImage,
    region: &Region,
    offset_x: u32,
    lines: &[&str],
    color: Rgb<u8>,
    scale: PxScale,
    font: &FontRef<'_>,
) {
    let sizes: Vec<(u32, u32)> = lines.iter().map(|line| text_size(scale, font, line)).collect();
    let gap = 2;
    let total_height: u32 = sizes.iter().map(|&(_, h)| h).sum::<u32>() + gap * (lines.len() as u32 - 1);
    let center_x = (region.x + offset_x) as i32 + region.width as i32 / 2;
    let mut y = region.y as i32 + region.height as i32 / 2 - total_height as i32 / 2;
    for (line, (width, height)) in lines.iter().zip(sizes) {
        draw_text_mut(canvas, color, center_x - width as i32 / 2, y, scale, font, line);
        y += (height + gap) as i32;
    }
}

/// Builds the side-by-side figure: outlines on the left, colored cells on the right.
pub fn render_overlay(grid: &IntensityGrid, regions: &[Region], options: &RenderOptions) -> Result<RgbImage> {
    let width = grid.width();
    let height = grid.height();
    let source = grid.as_gray_image();
    let mut canvas = RgbImage::new(width * 2, height);

    // --- 1. Base Panels ---
    for (x, y, pixel) in source.enumerate_pixels() {
        let level = pixel.0[0];
        let dimmed = (level as f32 * options.dim_factor).round().clamp(0.0, 255.0) as u8;
        canvas.put_pixel(x, y, Rgb([level, level, level]));
        canvas.put_pixel(x + width, y, Rgb([dimmed, dimmed, dimmed]));
    }

    // --- 2. Color Layer ---
    let range = brightness_range(regions);
    let mut heat = RgbImage::new(width, height);
    if let Some(range) = range {
        for region in regions {
            if let Some(value) = region.brightness {
                let color = options.colormap.color(normalized(value, range));
                draw_filled_rect_mut(&mut heat, region_rect(region, 0), color);
            }
        }
    }

    // --- 3. Blend ---
    for (x, y, color) in heat.enumerate_pixels() {
        let target = canvas.get_pixel_mut(x + width, y);
        for channel in 0..3 {
            let blended = target.0[channel] as f32 + color.0[channel] as f32 * options.heat_weight;
            target.0[channel] = blended.round().clamp(0.0, 255.0) as u8;
        }
    }

    // --- 4. Outlines ---
    for region in regions {
        draw_hollow_rect_mut(&mut canvas, region_rect(region, 0), options.outline);
        draw_hollow_rect_mut(&mut canvas, region_rect(region, width), options.heat_outline);
    }

    // --- 5. Labels ---
    if options.show_values && range.is_some() {
        let font = label_font()?;
        let scale = PxScale::from(options.label_scale);
        for region in regions {
            let Some(value) = region.brightness else {
                continue;
            };
            let value = format!("{value:.1}");
            draw_centered_lines(&mut canvas, region, 0, &[value.as_str()], YELLOW, scale, &font);
            draw_centered_lines(&mut canvas, region, width, &[region.id.as_str(), value.as_str()], WHITE, scale, &font);
        }
    }

    debug!(
        "rendered {} regions onto a {}x{} figure ({})",
        regions.len(),
        width * 2,
        height,
        options.colormap
    );
    Ok(canvas)
}

/// Writes the figure as a PNG.
pub fn save_overlay(image: &RgbImage, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let encoder = PngEncoder::new(BufWriter::new(file));
    encoder
        .write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgb8)
        .map_err(|source| AnalysisError::Image {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plate(width: u32, height: u32) -> IntensityGrid {
        IntensityGrid::from_raw(width, height, vec![100; (width * height) as usize]).unwrap()
    }

    fn measured(id: &str, x: u32, y: u32, side: u32, brightness: Option<f64>) -> Region {
        let mut region = Region::new(id, x, y, side, side).unwrap();
        region.brightness = brightness;
        region
    }

    fn plain(colormap: Colormap) -> RenderOptions {
        RenderOptions {
            colormap,
            show_values: false,
            ..RenderOptions::default()
        }
    }

    #[test]
    fn heat_ramp_runs_blue_yellow_red() {
        assert_eq!(Colormap::Heat.color(0.0), Rgb([0, 0, 255]));
        assert_eq!(Colormap::Heat.color(0.5), YELLOW);
        assert_eq!(Colormap::Heat.color(1.0), RED);
        assert_eq!(Colormap::Heat.color(7.0), RED);
    }

    #[test]
    fn colormaps_hit_their_stops() {
        assert_eq!(Colormap::Viridis.color(0.0), Rgb([68, 1, 84]));
        assert_eq!(Colormap::Viridis.color(1.0), Rgb([253, 231, 37]));
        assert_eq!(Colormap::Plasma.color(0.5), Rgb([204, 71, 120]));
        assert_eq!(Colormap::Cool.color(0.5), Rgb([128, 128, 255]));
        assert_eq!("plasma".parse::<Colormap>().unwrap(), Colormap::Plasma);
        assert!(matches!(
            "jet".parse::<Colormap>(),
            Err(AnalysisError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn figure_has_two_panels_with_outlines_and_colors() {
        let regions = vec![
            measured("dim", 2, 4, 10, Some(10.0)),
            measured("bright", 14, 4, 10, Some(90.0)),
            measured("unmeasured", 26, 4, 10, None),
        ];
        let figure = render_overlay(&plate(40, 20), &regions, &plain(Colormap::Heat)).unwrap();
        assert_eq!(figure.dimensions(), (80, 20));

        // Left panel: untouched interior, red border.
        assert_eq!(*figure.get_pixel(6, 8), Rgb([100, 100, 100]));
        assert_eq!(*figure.get_pixel(2, 4), RED);

        // Right panel: dimmed to 40, plus 0.8 of the ramp color.
        assert_eq!(*figure.get_pixel(40 + 6, 8), Rgb([40, 40, 244]));
        assert_eq!(*figure.get_pixel(40 + 18, 8), Rgb([244, 40, 40]));
        assert_eq!(*figure.get_pixel(40 + 30, 8), Rgb([40, 40, 40]));
        assert_eq!(*figure.get_pixel(40 + 26, 4), BLACK);
    }

    #[test]
    fn single_level_is_drawn_mid_ramp() {
        let regions = vec![measured("only", 2, 4, 10, Some(55.0))];
        let figure = render_overlay(&plate(40, 20), &regions, &plain(Colormap::Heat)).unwrap();
        assert_eq!(*figure.get_pixel(40 + 6, 8), Rgb([244, 244, 40]));
    }

    #[test]
    fn values_are_written_only_into_measured_regions() {
        let grid = plate(160, 80);
        let regions = vec![
            measured("cell_1", 10, 20, 50, Some(123.4)),
            measured("cell_2", 90, 20, 50, None),
        ];
        let unlabeled = render_overlay(&grid, &regions, &plain(Colormap::Viridis)).unwrap();
        let labeled = render_overlay(
            &grid,
            &regions,
            &RenderOptions {
                show_values: true,
                ..plain(Colormap::Viridis)
            },
        )
        .unwrap();

        let interior = |x0: u32| (x0 + 1..x0 + 49).flat_map(|x| (21..69).map(move |y| (x, y)));

        // Yellow value text on the left panel raises red above blue.
        assert!(interior(10).any(|(x, y)| {
            let p = labeled.get_pixel(x, y).0;
            p[0] > p[2]
        }));
        // White id and value on the colored panel.
        assert!(interior(170).any(|(x, y)| labeled.get_pixel(x, y) != unlabeled.get_pixel(x, y)));
        // No label for the unmeasured region, on either panel.
        assert!(interior(90).all(|(x, y)| labeled.get_pixel(x, y) == unlabeled.get_pixel(x, y)));
        assert!(interior(250).all(|(x, y)| labeled.get_pixel(x, y) == unlabeled.get_pixel(x, y)));
        // Without labels the measured interior stays flat.
        assert!(interior(10).all(|(x, y)| *unlabeled.get_pixel(x, y) == Rgb([100, 100, 100])));
    }

    #[test]
    fn overlay_is_written_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overlay.png");
        let regions = [measured("a", 2, 4, 10, Some(1.0))];
        let figure = render_overlay(&plate(40, 20), &regions, &RenderOptions::default()).unwrap();
        save_overlay(&figure, &path).unwrap();

        let reloaded = image::open(&path).unwrap().into_rgb8();
        assert_eq!(reloaded, figure);
    }

    #[test]
    fn unwritable_overlay_path_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let figure = RgbImage::new(4, 4);
        let err = save_overlay(&figure, dir.path().join("missing").join("overlay.png")).unwrap_err();
        assert!(matches!(err, AnalysisError::Io { .. }));
    }
}
