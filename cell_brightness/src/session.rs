// THEORY:
// The `session` module is the top-level API for analyzing one image at a time. It
// encapsulates the full stack (grid, region locators, brightness reducer, result
// aggregator) behind a single owner of the analysis state.
//
// An `AnalysisSession` owns exactly one triad of state: the loaded grid, the
// current region list, and the results of the last analysis pass. Nothing is shared
// between sessions, so independent analyses never see each other's regions.
//
// Two behaviours that used to be implicit are explicit here:
// - Whether locating cells replaces or extends the region list is a `RegionUpdate`
//   argument of every locator call.
// - Whether loading a new image keeps the previous regions (useful to reuse a
//   hand-made layout across a series of same-layout images) or clears them is the
//   session's `RegionRetention` setting. Retained regions keep their old brightness
//   until the next measurement.

use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::core_modules::aggregator::analyze_all;
use crate::core_modules::brightness::{BrightnessMethod, reduce};
use crate::core_modules::cell_detector::{DetectionConfig, cell_detector};
use crate::core_modules::grid_layout::GridLayout;
use crate::core_modules::intensity_grid::IntensityGrid;
use crate::core_modules::record::ResultRecord;
use crate::core_modules::region::Region;
use crate::core_modules::statistics::SummaryStatistics;
use crate::error::{AnalysisError, Result};
use crate::export::{ExportFormat, save_results};

/// What happens to regions and results when a new image is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionRetention {
    /// Keep regions and results from the previous image.
    #[default]
    Retain,
    /// Start every image with no regions and no results.
    Clear,
}

/// Whether newly located regions replace the current list or are appended to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionUpdate {
    Replace,
    Append,
}

/// Configuration for an `AnalysisSession`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub region_retention: RegionRetention,
}

/// The owner of one image's analysis state.
#[derive(Debug, Default)]
pub struct AnalysisSession {
    config: SessionConfig,
    grid: Option<IntensityGrid>,
    source: Option<PathBuf>,
    regions: Vec<Region>,
    results: Vec<ResultRecord>,
}

impl AnalysisSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Loads an image from disk, replacing any grid held by the session.
    pub fn load_image(&mut self, path: impl AsRef<Path>) -> Result<&IntensityGrid> {
        let path = path.as_ref();
        let grid = IntensityGrid::open(path)?;
        info!("loaded {} ({}x{})", path.display(), grid.width(), grid.height());
        self.install_grid(grid, Some(path.to_path_buf()));
        self.grid()
    }

    /// Installs an in-memory grid, replacing any grid held by the session.
    pub fn load_grid(&mut self, grid: IntensityGrid) {
        self.install_grid(grid, None);
    }

    fn install_grid(&mut self, grid: IntensityGrid, source: Option<PathBuf>) {
        if self.config.region_retention == RegionRetention::Clear {
            self.regions.clear();
            self.results.clear();
        }
        self.grid = Some(grid);
        self.source = source;
    }

    /// The loaded grid, or `InvalidState` when none is loaded.
    pub fn grid(&self) -> Result<&IntensityGrid> {
        self.grid
            .as_ref()
            .ok_or_else(|| AnalysisError::invalid_state("no image loaded; load an image first"))
    }

    /// File name of the loaded image, when it came from disk.
    pub fn source_name(&self) -> Option<String> {
        self.source
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn results(&self) -> &[ResultRecord] {
        &self.results
    }

    pub fn clear_regions(&mut self) {
        self.regions.clear();
    }

    /// Locates cells automatically and returns the newly added regions.
    pub fn detect_cells(&mut self, config: &DetectionConfig, update: RegionUpdate) -> Result<&[Region]> {
        let detected = cell_detector::detect_cells(self.grid()?, config);
        Ok(self.apply_update(detected, update))
    }

    /// Lays out a regular grid of cells and returns the newly added regions.
    pub fn add_grid_cells(&mut self, layout: &GridLayout, update: RegionUpdate) -> Result<&[Region]> {
        let cells = layout.partition(self.grid()?)?;
        Ok(self.apply_update(cells, update))
    }

    /// Appends one hand-placed cell. Without an id it is named `cell_{count + 1}`.
    ///
    /// When a grid is loaded the cell must fit inside it. Ids are not checked for
    /// uniqueness.
    pub fn add_manual_cell(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        id: Option<String>,
    ) -> Result<&Region> {
        let id = id.unwrap_or_else(|| Region::sequential_id(self.regions.len() + 1));
        let region = Region::new(id, x, y, width, height)?;
        if let Some(grid) = &self.grid {
            region.validate_within(grid.width(), grid.height())?;
        }
        self.regions.push(region);
        Ok(&self.regions[self.regions.len() - 1])
    }

    fn apply_update(&mut self, regions: Vec<Region>, update: RegionUpdate) -> &[Region] {
        if update == RegionUpdate::Replace {
            self.regions.clear();
        }
        let start = self.regions.len();
        self.regions.extend(regions);
        &self.regions[start..]
    }

    /// Measures the region at `index` and stores the value on it.
    pub fn calculate_brightness(&mut self, index: usize, method: BrightnessMethod) -> Result<f64> {
        let grid = self
            .grid
            .as_ref()
            .ok_or_else(|| AnalysisError::invalid_state("no image loaded; load an image first"))?;
        let count = self.regions.len();
        let region = self.regions.get_mut(index).ok_or_else(|| {
            AnalysisError::invalid_argument("index", format!("no cell at {index} ({count} defined)"))
        })?;
        reduce(grid, region, method)
    }

    /// Runs a full analysis pass, replacing the previous results.
    pub fn analyze_all(&mut self, method: BrightnessMethod) -> Result<&[ResultRecord]> {
        let grid = self
            .grid
            .as_ref()
            .ok_or_else(|| AnalysisError::invalid_state("no image loaded; load an image first"))?;
        self.results = analyze_all(grid, &mut self.regions, method)?;
        Ok(&self.results)
    }

    /// Summary statistics over the current results.
    pub fn statistics(&self) -> Result<SummaryStatistics> {
        SummaryStatistics::from_records(&self.results)
    }

    pub fn save_results(&self, path: impl AsRef<Path>, format: ExportFormat) -> Result<()> {
        save_results(&self.results, path, format)
    }
}
