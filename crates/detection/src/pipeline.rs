//! The detection pipeline: raw proposals in, labeled detections out.
//!
//! Stages run in a fixed order. Proposals are filtered and suppressed before
//! the (expensive) classification call, classified regions are regressed
//! per class, filtered again, suppressed again, and only then translated out
//! of any region-of-interest crop. Every stage short-circuits on an empty
//! candidate list.

use itertools::izip;
use ml::{ClassDeltas, ClassScores, DetectionImage, Evaluator, ExecutionHints, util};
use ndarray::Array2;

use crate::anchor::AnchorPyramid;
use crate::bbox::{Bbox, Xywh};
use crate::box_coder::BoxCoder;
use crate::config::{DetectorConfig, validate_size_range};
use crate::error::{Error, Result};
use crate::filter::{BoxFilter, FilterChain};
use crate::nms;
use crate::proposal::{ProposalSource, RpnSource};

/// Index into the configured class table.
pub type ClassId = usize;

/// One detected object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Object bounds in full-image pixels, region-of-interest offset already
    /// applied.
    pub bbox: Bbox<Xywh>,
    /// Class probability after softmax, in `(0, 1)`.
    pub score: f32,
    pub label: ClassId,
}

/// Per-call knobs; the persistent knobs live in [`DetectorConfig`].
#[derive(Debug, Clone)]
pub struct DetectOptions {
    /// Hard cap on the proposals forwarded to classification.
    pub max_proposals: usize,
    /// Whether to run the final suppression pass. Disabled by evaluation
    /// tooling that wants the pre-suppression detections.
    pub final_nms: bool,
    /// Overrides the configured `(min, max)` object size for this call.
    pub object_size_range: Option<((f32, f32), (f32, f32))>,
    /// Forwarded to the network untouched.
    pub hints: ExecutionHints,
}

impl Default for DetectOptions {
    fn default() -> Self {
        DetectOptions {
            max_proposals: 2000,
            final_nms: true,
            object_size_range: None,
            hints: ExecutionHints::default(),
        }
    }
}

/// Labels and scores assigned to a batch of regions.
///
/// Row `i` describes region `i`: `labels[i]` is the winning foreground
/// class, or `None` when the classifier put the region in the background
/// (or produced a non-finite row). `scores[i]` is the winning class's
/// softmax probability; `class_scores` keeps the full probability rows for
/// callers that want the whole distribution.
#[derive(Debug, Clone)]
pub struct RegionClassification {
    pub labels: Vec<Option<ClassId>>,
    pub scores: Vec<f32>,
    pub class_scores: Array2<f32>,
}

/// A configured two-stage detector.
///
/// Generic over the network ([`Evaluator`]) and the proposal source, so a
/// network-driven proposal head and an external heuristic share the entire
/// downstream pipeline. The detector owns per-image mutable state (the
/// proposal source's scale cache), so batch runs hand each worker its own
/// instance.
pub struct Detector<E, P> {
    config: DetectorConfig,
    evaluator: E,
    source: P,
}

impl<E> Detector<E, RpnSource> {
    /// A detector proposing regions through the network's own proposal head.
    pub fn with_rpn(config: DetectorConfig, evaluator: E) -> Result<Detector<E, RpnSource>> {
        config.validate()?;
        let anchors = AnchorPyramid::new(
            &config.base_sizes,
            config.pyramid_scale,
            config.num_pyramid_levels,
        );
        let source = RpnSource::new(anchors, config.min_proposal_score);

        Ok(Detector {
            config,
            evaluator,
            source,
        })
    }
}

impl<E, P> Detector<E, P> {
    /// A detector with an externally supplied proposal source.
    pub fn new(config: DetectorConfig, evaluator: E, source: P) -> Result<Detector<E, P>> {
        config.validate()?;
        Ok(Detector {
            config,
            evaluator,
            source,
        })
    }

    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// The name of a detected class.
    #[must_use]
    pub fn class_name(&self, label: ClassId) -> &str {
        &self.config.class_names[label]
    }
}

impl<E, P> Detector<E, P> {
    /// Detect objects on an image, optionally restricted to a region of
    /// interest.
    ///
    /// With a region of interest, the pipeline runs entirely on the cropped
    /// sub-image and the returned boxes are shifted back into full-image
    /// coordinates as the very last step, after all filtering and
    /// suppression. Invalid per-call options are rejected before any network
    /// work happens.
    pub fn detect<I>(
        &mut self,
        image: &I,
        roi: Option<Bbox<Xywh>>,
        options: &DetectOptions,
    ) -> Result<Vec<Detection>>
    where
        I: DetectionImage,
        E: Evaluator<I>,
        P: ProposalSource<I, E>,
    {
        let size_range = match options.object_size_range {
            Some((min, max)) => {
                validate_size_range(min, max)?;
                (min, max)
            }
            None => (self.config.min_object_size, self.config.max_object_size),
        };

        let cropped;
        let (target, offset) = match roi {
            Some(roi) => {
                let (x, y, w, h) = validated_roi(roi, image.dimensions())?;
                cropped = image.crop(x, y, w, h);
                (&cropped, (x as f32, y as f32))
            }
            None => (image, (0.0, 0.0)),
        };

        let (image_height, image_width) = target.dimensions();
        if image_height == 0 || image_width == 0 {
            return Err(Error::DegenerateImage {
                height: image_height,
                width: image_width,
            });
        }

        // stage 1: raw proposals
        let proposals = self.source.propose(target, &self.evaluator)?;
        if proposals.is_empty() {
            tracing::debug!("no raw proposals, image is empty");
            return Ok(Vec::new());
        }

        let mut boxes: Vec<Bbox<Xywh>> = proposals.iter().map(|p| p.bbox).collect();
        let mut scores: Vec<f32> = proposals.iter().map(|p| p.score).collect();

        // stage 2: geometric pre-filter
        let (min_size, max_size) = size_range;
        FilterChain::new()
            .with(BoxFilter::Invalid)
            .with(BoxFilter::Size {
                min: min_size,
                max: max_size,
            })
            .apply(&mut boxes, &mut scores);
        if boxes.is_empty() {
            tracing::debug!("all proposals filtered out before suppression");
            return Ok(Vec::new());
        }

        // stage 3: proposal suppression, then the top-k cut; kept indices
        // come back best-first, so the cut is a truncation
        let kept = nms::suppress(
            &boxes,
            &scores,
            self.config.proposal_nms.metric,
            self.config.proposal_nms.threshold,
        );
        let mut boxes = nms::select(&boxes, &kept);
        let mut scores = nms::select(&scores, &kept);
        boxes.truncate(options.max_proposals);
        scores.truncate(options.max_proposals);
        if boxes.is_empty() {
            tracing::debug!("suppression removed every proposal");
            return Ok(Vec::new());
        }

        // stage 4: classification
        let regions: Vec<ml::Region> = boxes
            .iter()
            .map(|b| [b.inner.0, b.inner.1, b.inner.2, b.inner.3])
            .collect();
        let (class_scores, class_deltas) =
            self.evaluator.classify(target, &regions, &options.hints)?;
        self.check_head_shapes(&class_scores, &class_deltas, regions.len())?;

        let classification = self.classify_regions(&class_scores);

        // stage 5: background removal and per-class regression
        let coder = BoxCoder::new().with_size_range(min_size, max_size);
        let mut detected = Vec::new();
        let mut detected_scores = Vec::new();
        let mut labels = Vec::new();
        for (region, (label, &score)) in classification
            .labels
            .iter()
            .zip(&classification.scores)
            .enumerate()
        {
            let Some(label) = *label else { continue };
            let delta = class_deltas.for_class(region, label);
            let Some(bbox) = coder.apply(boxes[region], delta) else {
                continue;
            };
            detected.push(bbox);
            detected_scores.push(score);
            labels.push(label);
        }
        if detected.is_empty() {
            tracing::debug!("classifier assigned every region to the background");
            return Ok(Vec::new());
        }

        // stage 6: geometric post-filter; regression may overshoot the
        // border, so clip first and judge validity after
        FilterChain::new()
            .with(BoxFilter::ClipToImage {
                width: image_width as f32,
                height: image_height as f32,
            })
            .with(BoxFilter::Invalid)
            .with(BoxFilter::Size {
                min: min_size,
                max: max_size,
            })
            .with(BoxFilter::Score {
                threshold: self.config.score_threshold,
            })
            .apply_labeled(&mut detected, &mut detected_scores, &mut labels);

        // stage 7: final suppression
        if options.final_nms {
            let kept = nms::suppress(
                &detected,
                &detected_scores,
                self.config.detection_nms.metric,
                self.config.detection_nms.threshold,
            );
            detected = nms::select(&detected, &kept);
            detected_scores = nms::select(&detected_scores, &kept);
            labels = nms::select(&labels, &kept);
        }

        // stage 8: restore full-image coordinates, strictly last
        let (dx, dy) = offset;
        Ok(izip!(detected, detected_scores, labels)
            .map(|(bbox, score, label)| Detection {
                bbox: bbox.translated(dx, dy),
                score,
                label,
            })
            .collect())
    }

    /// Classify caller-supplied regions without running the proposal stages.
    ///
    /// Exposed for hosts that already have candidate boxes (tracking,
    /// ground-truth evaluation) and only want the classification half of
    /// the pipeline. Head shapes are cross-checked the same way `detect`
    /// does it.
    pub fn classify_boxes<I>(
        &self,
        image: &I,
        rois: &[Bbox<Xywh>],
        options: &DetectOptions,
    ) -> Result<RegionClassification>
    where
        I: DetectionImage,
        E: Evaluator<I>,
    {
        let regions: Vec<ml::Region> = rois
            .iter()
            .map(|b| [b.inner.0, b.inner.1, b.inner.2, b.inner.3])
            .collect();
        let (class_scores, class_deltas) =
            self.evaluator.classify(image, &regions, &options.hints)?;
        self.check_head_shapes(&class_scores, &class_deltas, regions.len())?;

        Ok(self.classify_regions(&class_scores))
    }

    /// Softmax the raw class-score rows and pick each region's winner.
    ///
    /// Background wins by argmax like any other column, it just yields a
    /// `None` label. A region whose score row is not finite cannot be ranked
    /// and is treated as background.
    #[must_use]
    pub fn classify_regions(&self, class_scores: &ClassScores) -> RegionClassification {
        let num_regions = class_scores.num_regions();
        let background = class_scores.background_index();

        let mut labels = Vec::with_capacity(num_regions);
        let mut scores = Vec::with_capacity(num_regions);
        let mut probabilities = Array2::zeros((num_regions, background + 1));

        for region in 0..num_regions {
            let raw = class_scores.region(region).to_vec();
            if raw.iter().any(|v| !v.is_finite()) {
                tracing::debug!(region, "non-finite class scores, treating as background");
                labels.push(None);
                scores.push(0.0);
                continue;
            }

            let probs = util::softmax(&raw);
            let best = util::argmax(&probs);

            labels.push((best != background).then_some(best));
            scores.push(probs[best]);
            for (column, &p) in probs.iter().enumerate() {
                probabilities[[region, column]] = p;
            }
        }

        RegionClassification {
            labels,
            scores,
            class_scores: probabilities,
        }
    }

    /// The classification heads must agree with the configured class table;
    /// a mismatch means the wrong network is loaded.
    fn check_head_shapes(
        &self,
        scores: &ClassScores,
        deltas: &ClassDeltas,
        num_regions: usize,
    ) -> Result<()> {
        let num_classes = self.config.num_classes();
        let score_cols = scores.background_index() + 1;
        if score_cols != num_classes + 1 {
            return Err(ml::Error::ClassColumns {
                expected: num_classes + 1,
                actual: score_cols,
            }
            .into());
        }
        if scores.num_regions() != num_regions {
            return Err(ml::Error::RegionCount {
                expected: num_regions,
                actual: scores.num_regions(),
            }
            .into());
        }

        if deltas.num_classes() != num_classes {
            return Err(ml::Error::DeltaColumns {
                expected: 4 * num_classes,
                actual: 4 * deltas.num_classes(),
            }
            .into());
        }
        if deltas.num_regions() != num_regions {
            return Err(ml::Error::RegionCount {
                expected: num_regions,
                actual: deltas.num_regions(),
            }
            .into());
        }
        Ok(())
    }
}

/// Check a region of interest against the image and return it as integer
/// crop coordinates.
fn validated_roi(
    roi: Bbox<Xywh>,
    (image_height, image_width): (usize, usize),
) -> Result<(usize, usize, usize, usize)> {
    let (x, y, w, h) = roi.rounded().inner;
    let fits = x >= 0.0
        && y >= 0.0
        && w >= 1.0
        && h >= 1.0
        && x + w <= image_width as f32
        && y + h <= image_height as f32;

    if !(x.is_finite() && y.is_finite() && w.is_finite() && h.is_finite()) || !fits {
        return Err(Error::RoiOutOfBounds {
            x,
            y,
            width: w,
            height: h,
            image_width,
            image_height,
        });
    }

    Ok((x as usize, y as usize, w as usize, h as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ml::PlanarImage;
    use ndarray::Array2;

    /// Evaluator that never gets called; enough for tests that fail before
    /// the network.
    struct NoNetwork;

    impl Evaluator<PlanarImage> for NoNetwork {
        fn rpn_forward(
            &self,
            _image: &PlanarImage,
        ) -> ml::Result<(ml::ScoreMap, ml::RegressionMap)> {
            unreachable!()
        }

        fn classify(
            &self,
            _image: &PlanarImage,
            _regions: &[ml::Region],
            _hints: &ExecutionHints,
        ) -> ml::Result<(ClassScores, ClassDeltas)> {
            unreachable!()
        }
    }

    fn config() -> DetectorConfig {
        DetectorConfig::with_classes(vec!["ball".into(), "robot".into()])
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut config = config();
        config.min_object_size = (100.0, 100.0);
        config.max_object_size = (50.0, 50.0);

        assert!(matches!(
            Detector::with_rpn(config, NoNetwork),
            Err(Error::SizeRange { .. })
        ));
    }

    #[test]
    fn invalid_size_override_is_rejected_before_any_network_call() {
        let mut detector = Detector::with_rpn(config(), NoNetwork).unwrap();
        let image = PlanarImage::zeros(64, 64);

        let options = DetectOptions {
            object_size_range: Some(((100.0, 100.0), (50.0, 50.0))),
            ..DetectOptions::default()
        };
        assert!(matches!(
            detector.detect(&image, None, &options),
            Err(Error::SizeRange { .. })
        ));
    }

    #[test]
    fn roi_outside_the_image_is_rejected() {
        let mut detector = Detector::with_rpn(config(), NoNetwork).unwrap();
        let image = PlanarImage::zeros(64, 64);

        let roi = Bbox::xywh(40.0, 40.0, 32.0, 32.0);
        assert!(matches!(
            detector.detect(&image, Some(roi), &DetectOptions::default()),
            Err(Error::RoiOutOfBounds { .. })
        ));
    }

    #[test]
    fn classify_regions_softmaxes_and_strips_background() {
        let detector = Detector::with_rpn(config(), NoNetwork).unwrap();

        // three regions over two classes plus background: a clear class 0,
        // a clear background, a non-finite row
        let raw = ndarray::array![
            [4.0, 0.0, 0.0],
            [0.0, 0.0, 4.0],
            [f32::NAN, 0.0, 0.0],
        ];
        let scores = ClassScores::new(raw, 2, 3).unwrap();

        let result = detector.classify_regions(&scores);
        assert_eq!(result.labels, vec![Some(0), None, None]);
        assert!(result.scores[0] > 0.9);
        assert!(result.scores[1] > 0.9);
        assert_eq!(result.scores[2], 0.0);

        let row0: f32 = result.class_scores.row(0).sum();
        assert!((row0 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn classify_regions_stays_finite_for_extreme_scores() {
        let detector = Detector::with_rpn(config(), NoNetwork).unwrap();

        let raw = ndarray::array![[100.0, 0.0, 0.0]];
        let scores = ClassScores::new(raw, 2, 1).unwrap();

        let result = detector.classify_regions(&scores);
        assert_eq!(result.labels, vec![Some(0)]);
        assert!(result.scores[0].is_finite());
        assert!(result.scores[0] > 0.999);
    }

    #[test]
    fn classification_head_shape_mismatch_is_fatal() {
        let detector = Detector::with_rpn(config(), NoNetwork).unwrap();

        // five columns instead of the expected three
        let scores = ClassScores::new(Array2::zeros((1, 5)), 4, 1).unwrap();
        let deltas = ClassDeltas::new(Array2::zeros((1, 8)), 2, 1).unwrap();

        assert!(matches!(
            detector.check_head_shapes(&scores, &deltas, 1),
            Err(Error::Network(ml::Error::ClassColumns { .. }))
        ));
    }
}
