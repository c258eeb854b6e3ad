// THEORY:
// A single error type for everything the library can report. Per-pair failures
// are contained by the orchestrator, so this enum mostly exists to let the
// orchestrator tell "could not read the input" apart from "the pipeline broke".
// Alignment failures are NOT errors; they travel as `AlignmentOutcome` values.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// An input raster could not be opened or decoded.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// An output raster could not be encoded or written.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Two rasters that must share a pixel grid do not.
    #[error("raster dimensions differ: {left:?} vs {right:?}")]
    DimensionMismatch { left: (u32, u32), right: (u32, u32) },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A raster could not be moved between `image` buffers and OpenCV matrices.
    #[error("raster layout: {0}")]
    RasterLayout(String),

    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// True when the failure happened while decoding an input file.
    pub fn is_read_error(&self) -> bool {
        matches!(self, PipelineError::Read { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
