//! See [`Error`].

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Error types for this crate.
///
/// Configuration errors (bad anchor table, bad thresholds, mismatched map
/// shapes) are fatal and raised before or at the boundary of an image run.
/// Per-box numeric anomalies are not errors: the offending box is dropped
/// inside the pipeline and never surfaces here.
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("minimum object size {min:?} exceeds maximum object size {max:?}")]
    SizeRange { min: (f32, f32), max: (f32, f32) },

    #[error("object size {size:?} must have positive, finite dimensions")]
    InvalidObjectSize { size: (f32, f32) },

    #[error("anchor base size {size:?} must have positive, finite dimensions")]
    InvalidAnchorSize { size: (f32, f32) },

    #[error(
        "detector configured with no anchor shapes \
            ({base_sizes} base sizes, {levels} pyramid levels)"
    )]
    EmptyAnchorTable { base_sizes: usize, levels: usize },

    #[error("pyramid scale must be a finite number of at least 1, got {value}")]
    PyramidScale { value: f32 },

    #[error("detector configured with an empty class table")]
    EmptyClassTable,

    #[error("threshold `{name}` must be finite, got {value}")]
    NonFiniteThreshold { name: &'static str, value: f32 },

    #[error("overlap threshold `{name}` must lie in [0, 1], got {value}")]
    ThresholdRange { name: &'static str, value: f32 },

    #[error(
        "region of interest ({x}, {y}, {width}, {height}) does not fit the \
            {image_width}x{image_height} image"
    )]
    RoiOutOfBounds {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        image_width: usize,
        image_height: usize,
    },

    #[error("image has degenerate dimensions {height}x{width}")]
    DegenerateImage { height: usize, width: usize },

    #[error("proposal function violated its contract: {reason}")]
    ProposalContract { reason: String },

    #[error("proposal function failed: {reason}")]
    ProposalSource { reason: String },

    #[error("failed to read detector config from `{path}`")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write detector config to `{path}`")]
    WriteConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse detector config")]
    ParseConfig(#[from] toml::de::Error),

    #[error("failed to serialize detector config")]
    SerializeConfig(#[from] toml::ser::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Network(#[from] ml::Error),
}

/// Type alias for [`Result<T, Error>`].
pub type Result<T> = std::result::Result<T, Error>;
