// THEORY:
// This file is the main entry point for the `cell_brightness` library crate. It
// defines the public API used by the `cell_tester` CLI and the overlay renderer.
//
// The high-level interface is `AnalysisSession` for one image at a time and
// `batch`/`parallel_batch` for whole directories. The building blocks live in
// `core_modules` and stay public for callers that want to compose their own pass
// (locate regions, reduce them, summarize, export).

pub mod batch;
pub mod core_modules;
pub mod error;
pub mod export;
pub mod parallel_batch;
pub mod session;
pub mod synthetic;

pub use batch::{BatchConfig, BatchReport, FailurePolicy, ImageAnalysis, LocatorPolicy};
pub use core_modules::brightness::BrightnessMethod;
pub use core_modules::cell_detector::DetectionConfig;
pub use core_modules::grid_layout::GridLayout;
pub use core_modules::intensity_grid::IntensityGrid;
pub use core_modules::record::ResultRecord;
pub use core_modules::region::Region;
pub use core_modules::statistics::SummaryStatistics;
pub use core_modules::threshold::ThresholdMethod;
pub use error::{AnalysisError, Result};
pub use export::ExportFormat;
pub use session::{AnalysisSession, RegionRetention, RegionUpdate, SessionConfig};
pub use synthetic::{SampleCell, SampleSpec};
