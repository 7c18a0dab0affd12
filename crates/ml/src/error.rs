//! See [`Error`].

use miette::Diagnostic;
use thiserror::Error;

/// Error types for this crate.
///
/// Every variant is a fatal contract violation at the network boundary:
/// the shapes handed back by the external network do not match the
/// detector configuration. None of these are retried.
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("score map carries {actual} anchor channels, the detector is configured for {expected}")]
    ScoreChannels { expected: usize, actual: usize },

    #[error(
        "regression map carries {actual} channels, expected 4 regression values \
            per anchor ({expected})"
    )]
    RegressionChannels { expected: usize, actual: usize },

    #[error(
        "score and regression maps disagree on the spatial grid \
            ({score_rows}x{score_cols} vs {regression_rows}x{regression_cols})"
    )]
    GridMismatch {
        score_rows: usize,
        score_cols: usize,
        regression_rows: usize,
        regression_cols: usize,
    },

    #[error(
        "class score matrix carries {actual} columns, expected {expected} \
            foreground classes plus background"
    )]
    ClassColumns { expected: usize, actual: usize },

    #[error(
        "class regression matrix carries {actual} columns, expected 4 values \
            per foreground class ({expected})"
    )]
    DeltaColumns { expected: usize, actual: usize },

    #[error("network returned outputs for {actual} regions, but {expected} were submitted")]
    RegionCount { expected: usize, actual: usize },

    #[error("network evaluation failed: {reason}")]
    Evaluation { reason: String },
}

/// Type alias for [`Result<T, Error>`].
pub type Result<T> = std::result::Result<T, Error>;
