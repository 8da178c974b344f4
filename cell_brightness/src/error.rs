// THEORY:
// Every fallible operation in the analyzer reports through one error type. The
// variants mirror the failure classes a caller can act on: a missing precondition
// (`InvalidState`), a rejected token or parameter (`InvalidArgument`), a region
// that does not fit its image (`OutOfBounds`) and a path that does not exist
// (`NotFound`). The remaining variants wrap the I/O collaborators (image codec,
// filesystem, CSV and JSON) so their failures keep the offending path.
//
// Nothing in the core recovers locally. Errors travel to the caller with enough
// context (which precondition, which argument, which region) to diagnose the
// failure without re-running it.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// An operation was called before its precondition was met.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A token or parameter was rejected.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// A region reaches past the edge of the image it is applied to.
    #[error(
        "region `{region_id}` ({x}, {y}, {width}x{height}) exceeds image bounds {image_width}x{image_height}"
    )]
    OutOfBounds {
        region_id: String,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("image codec failed for '{}': {source}", path.display())]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("i/o failed for '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("csv failed for '{}': {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },

    /// A batch worker task died before reporting its image.
    #[error("batch worker failed: {0}")]
    Worker(String),

    #[error("json failed for '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl AnalysisError {
    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub(crate) fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }
}
