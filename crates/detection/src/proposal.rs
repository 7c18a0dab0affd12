//! Raw region proposals: decoding the network's proposal head, and the
//! pluggable sources that feed the pipeline.

use ml::{DetectionImage, Evaluator, RegressionMap, ScoreMap, util};

use crate::anchor::AnchorPyramid;
use crate::bbox::{Bbox, Xywh};
use crate::box_coder::BoxCoder;
use crate::coords::ScaleCache;
use crate::error::{Error, Result};

/// An unlabeled candidate box with an objectness score.
#[derive(Debug, Clone, Copy)]
pub struct Proposal {
    pub bbox: Bbox<Xywh>,
    pub score: f32,
}

/// Objectness above which a location's best anchor counts as "object"
/// rather than background. The configurable proposal floor is applied on
/// top of this binary decision.
const OBJECTNESS_DECISION: f32 = 0.5;

/// Turn a pair of proposal-head maps into raw candidate boxes in image
/// space.
///
/// Per spatial cell: pick the best-scoring anchor, skip cells classified as
/// background, skip anchors too large for the image, decode the anchor's
/// regression delta against the anchor box centered on the cell's image-space
/// center, and keep the result only if it lies fully inside the image and
/// clears `min_score`. Iteration is row-major, so identical inputs always
/// produce the identical proposal list.
///
/// Cells with non-finite scores or deltas are dropped individually; a
/// score map whose channel count disagrees with the pyramid is a fatal
/// configuration error.
pub fn decode_proposals(
    scores: &ScoreMap,
    regression: &RegressionMap,
    anchors: &AnchorPyramid,
    image_size: (usize, usize),
    cache: &mut ScaleCache,
    coder: &BoxCoder,
    min_score: f32,
) -> Result<Vec<Proposal>> {
    if scores.num_anchors() != anchors.len() {
        return Err(ml::Error::ScoreChannels {
            expected: anchors.len(),
            actual: scores.num_anchors(),
        }
        .into());
    }

    let (rows, cols) = scores.grid();
    if rows == 0 || cols == 0 {
        return Ok(Vec::new());
    }

    let scale = cache.scale_factors(image_size, |_| (rows, cols))?;
    let (image_height, image_width) = image_size;
    let (iw, ih) = (image_width as f32, image_height as f32);

    let mut proposals = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            let cell = scores.cell(row, col).to_vec();
            let best = util::argmax(&cell);
            let best_score = cell[best];

            if !best_score.is_finite() || best_score < OBJECTNESS_DECISION {
                continue;
            }

            // an anchor that cannot fit the image is not worth regressing
            let (anchor_h, anchor_w) = anchors.shape(best);
            if anchor_w > iw || anchor_h > ih {
                continue;
            }

            let (cx, cy) = scale.cell_center(col, row);
            let reference = anchors.centered_at(best, cx, cy);
            let Some(bbox) = coder.apply(reference, regression.deltas(row, col, best)) else {
                continue;
            };

            // strict bound: raw proposals must lie fully inside the image
            let (x, y, w, h) = bbox.inner;
            if x < 0.0 || y < 0.0 || x + w > iw || y + h > ih {
                continue;
            }

            if best_score < min_score {
                continue;
            }

            proposals.push(Proposal {
                bbox,
                score: best_score,
            });
        }
    }

    Ok(proposals)
}

/// How proposal-source failures surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Propagate the error to the caller. The right choice for direct
    /// inference calls.
    #[default]
    Propagate,
    /// Log a warning and treat the image as having no proposals. Bulk
    /// region mining runs for hours; one bad image must not kill the job.
    WarnEmpty,
}

/// Where raw candidate regions come from.
///
/// Fast-style detectors plug in an external heuristic, Faster-style
/// detectors decode the network's own proposal head; everything downstream
/// of this seam is shared between the two.
pub trait ProposalSource<I: DetectionImage, E: Evaluator<I>> {
    fn propose(&mut self, image: &I, evaluator: &E) -> Result<Vec<Proposal>>;
}

/// Proposals decoded from the network's region-proposal head.
#[derive(Debug, Clone)]
pub struct RpnSource {
    anchors: AnchorPyramid,
    coder: BoxCoder,
    min_score: f32,
    cache: ScaleCache,
}

impl RpnSource {
    #[must_use]
    pub fn new(anchors: AnchorPyramid, min_score: f32) -> RpnSource {
        RpnSource {
            anchors,
            coder: BoxCoder::new(),
            min_score,
            cache: ScaleCache::new(),
        }
    }

    #[must_use]
    pub fn anchors(&self) -> &AnchorPyramid {
        &self.anchors
    }
}

impl<I: DetectionImage, E: Evaluator<I>> ProposalSource<I, E> for RpnSource {
    fn propose(&mut self, image: &I, evaluator: &E) -> Result<Vec<Proposal>> {
        let (scores, regression) = evaluator.rpn_forward(image)?;

        decode_proposals(
            &scores,
            &regression,
            &self.anchors,
            image.dimensions(),
            &mut self.cache,
            &self.coder,
            self.min_score,
        )
    }
}

/// Proposals from a user-supplied heuristic `(image) -> (boxes, scores)`.
///
/// The heuristic's output is validated for shape and finiteness before use;
/// a non-conforming result is a contract violation. What happens then is the
/// policy's call: direct calls propagate, mining runs degrade to an empty
/// proposal list plus a warning.
pub struct HeuristicSource<F> {
    func: F,
    policy: FailurePolicy,
}

impl<F> HeuristicSource<F> {
    pub fn new(func: F) -> HeuristicSource<F> {
        HeuristicSource {
            func,
            policy: FailurePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: FailurePolicy) -> HeuristicSource<F> {
        self.policy = policy;
        self
    }
}

impl<I, E, F> ProposalSource<I, E> for HeuristicSource<F>
where
    I: DetectionImage,
    E: Evaluator<I>,
    F: FnMut(&I) -> miette::Result<(Vec<Bbox<Xywh>>, Vec<f32>)>,
{
    fn propose(&mut self, image: &I, _evaluator: &E) -> Result<Vec<Proposal>> {
        let result = (self.func)(image)
            .map_err(|err| Error::ProposalSource {
                reason: err.to_string(),
            })
            .and_then(|(boxes, scores)| validate_heuristic(boxes, scores));

        match (result, self.policy) {
            (Ok(proposals), _) => Ok(proposals),
            (Err(err), FailurePolicy::WarnEmpty) => {
                tracing::warn!(%err, "proposal heuristic failed, treating image as empty");
                Ok(Vec::new())
            }
            (Err(err), FailurePolicy::Propagate) => Err(err),
        }
    }
}

fn validate_heuristic(boxes: Vec<Bbox<Xywh>>, scores: Vec<f32>) -> Result<Vec<Proposal>> {
    if boxes.len() != scores.len() {
        return Err(Error::ProposalContract {
            reason: format!("returned {} boxes but {} scores", boxes.len(), scores.len()),
        });
    }

    for (i, (bbox, &score)) in boxes.iter().zip(&scores).enumerate() {
        let (x, y, w, h) = bbox.inner;
        if !(x.is_finite() && y.is_finite() && w.is_finite() && h.is_finite() && score.is_finite())
        {
            return Err(Error::ProposalContract {
                reason: format!("box {i} has non-finite coordinates or score"),
            });
        }
    }

    Ok(boxes
        .into_iter()
        .zip(scores)
        .map(|(bbox, score)| Proposal { bbox, score })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn rpn_maps(
        rows: usize,
        cols: usize,
        num_anchors: usize,
        hits: &[(usize, usize, usize, f32)],
    ) -> (ScoreMap, RegressionMap) {
        let mut scores = Array3::zeros((rows, cols, num_anchors));
        for &(row, col, anchor, score) in hits {
            scores[[row, col, anchor]] = score;
        }
        let scores = ScoreMap::new(scores, num_anchors).unwrap();
        let regression =
            RegressionMap::new(Array3::zeros((rows, cols, 4 * num_anchors)), num_anchors, &scores)
                .unwrap();
        (scores, regression)
    }

    #[test]
    fn single_hit_yields_one_anchor_centered_proposal() {
        // 64x64 image, 8x8 grid, one 32x32 anchor, one object cell
        let anchors = AnchorPyramid::new(&[(32.0, 32.0)], 2.0, 1);
        let (scores, regression) = rpn_maps(8, 8, 1, &[(3, 3, 0, 0.9)]);

        let proposals = decode_proposals(
            &scores,
            &regression,
            &anchors,
            (64, 64),
            &mut ScaleCache::new(),
            &BoxCoder::new(),
            0.5,
        )
        .unwrap();

        assert_eq!(proposals.len(), 1);
        // cell (3,3) centers at 28 in both axes; the anchor straddles it
        assert_eq!(proposals[0].bbox.inner, (12.0, 12.0, 32.0, 32.0));
        assert!((proposals[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn background_cells_produce_nothing() {
        let anchors = AnchorPyramid::new(&[(32.0, 32.0)], 2.0, 1);
        let (scores, regression) = rpn_maps(8, 8, 1, &[(3, 3, 0, 0.4)]);

        let proposals = decode_proposals(
            &scores,
            &regression,
            &anchors,
            (64, 64),
            &mut ScaleCache::new(),
            &BoxCoder::new(),
            0.0,
        )
        .unwrap();
        assert!(proposals.is_empty());
    }

    #[test]
    fn oversized_anchors_are_skipped_before_regression() {
        // a 128-pixel anchor cannot fit a 64-pixel image
        let anchors = AnchorPyramid::new(&[(128.0, 128.0)], 2.0, 1);
        let (scores, regression) = rpn_maps(8, 8, 1, &[(3, 3, 0, 0.9)]);

        let proposals = decode_proposals(
            &scores,
            &regression,
            &anchors,
            (64, 64),
            &mut ScaleCache::new(),
            &BoxCoder::new(),
            0.5,
        )
        .unwrap();
        assert!(proposals.is_empty());
    }

    #[test]
    fn boxes_regressed_over_the_border_are_dropped() {
        // cell (0,0) centers at 4; the 32-pixel anchor pokes out at the top-left
        let anchors = AnchorPyramid::new(&[(32.0, 32.0)], 2.0, 1);
        let (scores, regression) = rpn_maps(8, 8, 1, &[(0, 0, 0, 0.9)]);

        let proposals = decode_proposals(
            &scores,
            &regression,
            &anchors,
            (64, 64),
            &mut ScaleCache::new(),
            &BoxCoder::new(),
            0.5,
        )
        .unwrap();
        assert!(proposals.is_empty());
    }

    #[test]
    fn non_finite_scores_drop_only_their_cell() {
        let anchors = AnchorPyramid::new(&[(32.0, 32.0)], 2.0, 1);
        let (scores, regression) =
            rpn_maps(8, 8, 1, &[(3, 3, 0, 0.9), (4, 4, 0, f32::NAN)]);

        let proposals = decode_proposals(
            &scores,
            &regression,
            &anchors,
            (64, 64),
            &mut ScaleCache::new(),
            &BoxCoder::new(),
            0.5,
        )
        .unwrap();
        assert_eq!(proposals.len(), 1);
    }

    #[test]
    fn channel_count_mismatch_is_fatal() {
        let anchors = AnchorPyramid::new(&[(32.0, 32.0), (16.0, 16.0)], 2.0, 1);
        let (scores, regression) = rpn_maps(8, 8, 1, &[]);

        let result = decode_proposals(
            &scores,
            &regression,
            &anchors,
            (64, 64),
            &mut ScaleCache::new(),
            &BoxCoder::new(),
            0.5,
        );
        assert!(matches!(
            result,
            Err(Error::Network(ml::Error::ScoreChannels { .. }))
        ));
    }

    #[test]
    fn heuristic_contract_violation_propagates_by_default() {
        let image = ml::PlanarImage::zeros(32, 32);
        let mut source = HeuristicSource::new(|_: &ml::PlanarImage| {
            Ok((vec![Bbox::xywh(0.0, 0.0, 10.0, 10.0)], vec![0.5, 0.6]))
        });

        let result = ProposalSource::<_, NoNetwork>::propose(&mut source, &image, &NoNetwork);
        assert!(matches!(result, Err(Error::ProposalContract { .. })));
    }

    #[test]
    fn heuristic_failure_degrades_to_empty_under_warn_policy() {
        let image = ml::PlanarImage::zeros(32, 32);
        let mut source = HeuristicSource::new(|_: &ml::PlanarImage| {
            Err(miette::miette!("segmentation backend crashed"))
        })
        .with_policy(FailurePolicy::WarnEmpty);

        let proposals =
            ProposalSource::<_, NoNetwork>::propose(&mut source, &image, &NoNetwork).unwrap();
        assert!(proposals.is_empty());
    }

    /// Evaluator stub for sources that never touch the network.
    struct NoNetwork;

    impl Evaluator<ml::PlanarImage> for NoNetwork {
        fn rpn_forward(
            &self,
            _image: &ml::PlanarImage,
        ) -> ml::Result<(ScoreMap, RegressionMap)> {
            unreachable!("heuristic sources never call the network")
        }

        fn classify(
            &self,
            _image: &ml::PlanarImage,
            _regions: &[ml::Region],
            _hints: &ml::ExecutionHints,
        ) -> ml::Result<(ml::ClassScores, ml::ClassDeltas)> {
            unreachable!("heuristic sources never call the network")
        }
    }
}
