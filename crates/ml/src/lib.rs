//! Typed seam between the geometric detection pipeline and the external
//! network that produces its classification and regression outputs.
//!
//! The network is a black box behind [`Evaluator`]; this crate pins down the
//! shapes crossing that boundary ([`maps`]) and validates them once, at the
//! boundary, so shape errors surface as configuration errors instead of
//! corrupting geometry downstream.

pub mod error;
pub mod evaluator;
pub mod maps;
pub mod util;

pub use error::{Error, Result};
pub use evaluator::{DetectionImage, Evaluator, ExecutionHints, PlanarImage, Region};
pub use maps::{ClassDeltas, ClassScores, RegressionMap, ScoreMap};
