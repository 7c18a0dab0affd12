//! Geometric post-processing for two-stage, region-based object detectors.
//!
//! The convolutional network lives behind the [`ml`] crate's
//! [`Evaluator`](ml::Evaluator) trait; everything in this crate is the
//! geometry around it: anchor pyramids, coordinate-space mapping, box delta
//! decoding, filtering, non-maximum suppression, and the
//! [`Detector`](pipeline::Detector) pipeline that strings the stages
//! together.
//!
//! A detector is built from a validated [`DetectorConfig`](config::DetectorConfig)
//! plus a network, proposes candidate regions either through the network's
//! proposal head ([`RpnSource`](proposal::RpnSource)) or through an external
//! heuristic ([`HeuristicSource`](proposal::HeuristicSource)), and produces
//! labeled, suppressed [`Detection`](pipeline::Detection)s in image pixels.

pub mod anchor;
pub mod batch;
pub mod bbox;
pub mod box_coder;
pub mod config;
pub mod coords;
pub mod error;
pub mod filter;
pub mod nms;
pub mod pipeline;
pub mod proposal;

pub use anchor::AnchorPyramid;
pub use batch::detect_batch;
pub use bbox::{Bbox, ConvertBbox, Cxcywh, OverlapMetric, Xywh, Xyxy};
pub use box_coder::BoxCoder;
pub use config::{DetectorConfig, NmsSettings};
pub use coords::{CoordinateScale, ScaleCache};
pub use error::{Error, Result};
pub use filter::{BoxFilter, FilterChain};
pub use pipeline::{ClassId, DetectOptions, Detection, Detector, RegionClassification};
pub use proposal::{FailurePolicy, HeuristicSource, Proposal, ProposalSource, RpnSource};
