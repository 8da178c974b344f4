// THEORY:
// Batch mode applies the same locate-then-measure pipeline to every image in a
// directory. Each image gets its own fresh `AnalysisSession`, so no regions or
// results leak from one image into the next. Per-image records are tagged with the
// image's file name and concatenated in directory order, then region order.
//
// Key architectural principles:
// 1.  **Deterministic Enumeration**: Images are the directory entries whose extension
//     is on a fixed, case-insensitive allow-list, sorted by file name.
// 2.  **Explicit Failure Policy**: `Abort` stops the batch at the first failing image;
//     `Skip` logs the failure, records it in the report and moves on.
// 3.  **Observer Hook**: Callers that persist per-image artefacts (tables, overlays)
//     receive each finished `ImageAnalysis` through an observer. An observer error
//     counts as a failure of that image.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::core_modules::brightness::BrightnessMethod;
use crate::core_modules::cell_detector::DetectionConfig;
use crate::core_modules::grid_layout::GridLayout;
use crate::core_modules::intensity_grid::IntensityGrid;
use crate::core_modules::record::ResultRecord;
use crate::core_modules::region::Region;
use crate::error::{AnalysisError, Result};
use crate::export::{ExportFormat, save_results};
use crate::session::{AnalysisSession, RegionUpdate, SessionConfig};

/// Extensions (lowercase, without the dot) recognized as images.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "tif", "tiff", "bmp"];

/// Name of the combined table written by [`write_combined_results`].
pub const COMBINED_RESULTS_FILE: &str = "combined_results.csv";

/// How cells are located on every image of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum LocatorPolicy {
    Automatic(DetectionConfig),
    Grid(GridLayout),
}

impl Default for LocatorPolicy {
    fn default() -> Self {
        Self::Automatic(DetectionConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The first failing image aborts the whole batch.
    #[default]
    Abort,
    /// Failing images are reported and skipped.
    Skip,
}

/// Configuration shared by every image of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub locator: LocatorPolicy,
    pub method: BrightnessMethod,
    pub failure_policy: FailurePolicy,
}

impl BatchConfig {
    /// Reads a batch configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                AnalysisError::not_found(path)
            } else {
                AnalysisError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        serde_json::from_str(&text).map_err(|source| AnalysisError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Everything produced for one image of a batch.
#[derive(Debug, Clone)]
pub struct ImageAnalysis {
    pub image_name: String,
    pub path: PathBuf,
    pub grid: IntensityGrid,
    /// Regions with their brightness filled in.
    pub regions: Vec<Region>,
    /// Records tagged with `image_name`.
    pub records: Vec<ResultRecord>,
}

impl ImageAnalysis {
    /// File stem used to name per-image artefacts.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.image_name.clone())
    }
}

/// An image that was skipped under [`FailurePolicy::Skip`].
#[derive(Debug)]
pub struct BatchFailure {
    pub path: PathBuf,
    pub error: AnalysisError,
}

/// The outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// All records, directory order then region order.
    pub records: Vec<ResultRecord>,
    pub images_processed: usize,
    pub failures: Vec<BatchFailure>,
}

/// True when the path has an allow-listed image extension (any case).
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Lists the image files of a directory, sorted by file name.
pub fn list_images(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(AnalysisError::not_found(dir));
    }

    let io_error = |source| AnalysisError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut images = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_file() && is_image_path(&path) {
            images.push(path);
        }
    }
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}

/// Runs the full pipeline on one image with a fresh session.
pub fn analyze_image(path: &Path, config: &BatchConfig) -> Result<ImageAnalysis> {
    let mut session = AnalysisSession::new(SessionConfig::default());
    session.load_image(path)?;

    match &config.locator {
        LocatorPolicy::Automatic(detection) => {
            session.detect_cells(detection, RegionUpdate::Replace)?;
        }
        LocatorPolicy::Grid(layout) => {
            session.add_grid_cells(layout, RegionUpdate::Replace)?;
        }
    }
    session.analyze_all(config.method)?;

    let image_name = session
        .source_name()
        .unwrap_or_else(|| path.display().to_string());
    let records = session
        .results()
        .iter()
        .cloned()
        .map(|record| record.with_image_name(image_name.clone()))
        .collect();

    Ok(ImageAnalysis {
        image_name,
        path: path.to_path_buf(),
        grid: session.grid()?.clone(),
        regions: session.regions().to_vec(),
        records,
    })
}

/// Processes every image of `dir` in order, handing each finished analysis to `observer`.
///
/// Fails with `NotFound` when the directory is missing and `InvalidState` when it
/// holds no images.
pub fn process_directory<F>(dir: impl AsRef<Path>, config: &BatchConfig, mut observer: F) -> Result<BatchReport>
where
    F: FnMut(&ImageAnalysis) -> Result<()>,
{
    let images = images_for_batch(dir.as_ref())?;
    let mut report = BatchReport::default();
    for path in images {
        info!("processing {}", path.display());
        let outcome = analyze_image(&path, config);
        record_outcome(&mut report, path, outcome, config.failure_policy, &mut observer)?;
    }
    finish(&report);
    Ok(report)
}

pub(crate) fn images_for_batch(dir: &Path) -> Result<Vec<PathBuf>> {
    let images = list_images(dir)?;
    if images.is_empty() {
        return Err(AnalysisError::invalid_state(format!(
            "no image files found in {}",
            dir.display()
        )));
    }
    Ok(images)
}

/// Folds one image outcome into the report according to the failure policy.
pub(crate) fn record_outcome<F>(
    report: &mut BatchReport,
    path: PathBuf,
    outcome: Result<ImageAnalysis>,
    policy: FailurePolicy,
    observer: &mut F,
) -> Result<()>
where
    F: FnMut(&ImageAnalysis) -> Result<()>,
{
    let observed = outcome.and_then(|analysis| {
        observer(&analysis)?;
        Ok(analysis)
    });

    match observed {
        Ok(analysis) => {
            report.images_processed += 1;
            report.records.extend(analysis.records);
            Ok(())
        }
        Err(error) => match policy {
            FailurePolicy::Abort => Err(error),
            FailurePolicy::Skip => {
                warn!("skipping {}: {}", path.display(), error);
                report.failures.push(BatchFailure { path, error });
                Ok(())
            }
        },
    }
}

pub(crate) fn finish(report: &BatchReport) {
    info!(
        "batch complete: {} images, {} records, {} skipped",
        report.images_processed,
        report.records.len(),
        report.failures.len()
    );
}

/// Writes `<stem>_results.csv` for one image into `out_dir`.
pub fn write_image_results(out_dir: impl AsRef<Path>, analysis: &ImageAnalysis) -> Result<PathBuf> {
    let path = out_dir.as_ref().join(format!("{}_results.csv", analysis.stem()));
    save_results(&analysis.records, &path, ExportFormat::Csv)?;
    Ok(path)
}

/// Writes `combined_results.csv` into `out_dir`.
pub fn write_combined_results(out_dir: impl AsRef<Path>, report: &BatchReport) -> Result<PathBuf> {
    let path = out_dir.as_ref().join(COMBINED_RESULTS_FILE);
    save_results(&report.records, &path, ExportFormat::Csv)?;
    Ok(path)
}

/// Creates `out_dir` and its parents when missing.
pub fn ensure_output_dir(out_dir: impl AsRef<Path>) -> Result<()> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir).map_err(|source| AnalysisError::Io {
        path: out_dir.to_path_buf(),
        source,
    })
}
