//! Parallel detection over image batches.
//!
//! A [`Detector`](crate::pipeline::Detector) carries per-image mutable state
//! (the proposal source's scale cache), so batch work cannot share one
//! instance across threads. Instead each rayon worker builds its own
//! detector from a factory and streams images through it; images keep their
//! input order in the output.

use ml::{DetectionImage, Evaluator};
use rayon::prelude::*;

use crate::error::Result;
use crate::pipeline::{DetectOptions, Detection, Detector};
use crate::proposal::ProposalSource;

/// Run detection over a batch of images in parallel.
///
/// `factory` is invoked once per worker; the detectors it builds should be
/// identically configured or the results are meaningless. The first error
/// aborts the batch.
pub fn detect_batch<I, E, P, F>(
    images: &[I],
    options: &DetectOptions,
    factory: F,
) -> Result<Vec<Vec<Detection>>>
where
    I: DetectionImage + Sync,
    E: Evaluator<I>,
    P: ProposalSource<I, E>,
    F: Fn() -> Detector<E, P> + Sync + Send,
{
    images
        .par_iter()
        .map_init(&factory, |detector, image| {
            detector.detect(image, None, options)
        })
        .collect()
}
