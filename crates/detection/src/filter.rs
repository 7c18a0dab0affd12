//! Order-preserving geometric filters over parallel box/score arrays.
//!
//! Every filter either drops box/score pairs together or rewrites boxes in
//! place; none of them ever breaks the 1:1 correspondence between the
//! parallel arrays, so callers can carry extra per-box data (labels) through
//! the same masks.

use crate::bbox::{Bbox, ConvertBbox, Xywh, Xyxy};

/// One step of a filter chain.
#[derive(Debug, Clone, Copy)]
pub enum BoxFilter {
    /// Drop boxes whose `(height, width)` falls below `min` or above `max`
    /// in either dimension.
    Size { min: (f32, f32), max: (f32, f32) },
    /// Drop boxes scoring below the threshold.
    Score { threshold: f32 },
    /// Drop boxes extending outside an image of the given size. Used before
    /// regression, where a box that does not fit is simply not a candidate.
    ImageBounds { width: f32, height: f32 },
    /// Clamp boxes into the image instead of dropping them. Used after
    /// regression, which is expected to overshoot the border slightly.
    ClipToImage { width: f32, height: f32 },
    /// Drop degenerate boxes: non-finite, or less than one pixel in either
    /// dimension.
    Invalid,
}

impl BoxFilter {
    /// The keep-decision for one box/score pair; rewrite-only filters keep
    /// everything.
    fn keeps(&self, bbox: &Bbox<Xywh>, score: f32) -> bool {
        match *self {
            BoxFilter::Size { min, max } => {
                let (h, w) = (bbox.height(), bbox.width());
                h >= min.0 && w >= min.1 && h <= max.0 && w <= max.1
            }
            BoxFilter::Score { threshold } => score >= threshold,
            BoxFilter::ImageBounds { width, height } => {
                let (x1, y1, x2, y2) = ConvertBbox::<Xyxy>::convert(bbox).inner;
                x1 >= 0.0 && y1 >= 0.0 && x2 <= width && y2 <= height
            }
            BoxFilter::ClipToImage { .. } => true,
            BoxFilter::Invalid => bbox.is_valid(),
        }
    }

    /// Apply this filter's rewrites and compute the keep mask for the
    /// parallel arrays.
    fn mask(&self, boxes: &mut [Bbox<Xywh>], scores: &[f32]) -> Vec<bool> {
        if let BoxFilter::ClipToImage { width, height } = *self {
            for bbox in boxes.iter_mut() {
                *bbox = bbox.clipped(width, height);
            }
            return vec![true; boxes.len()];
        }

        boxes
            .iter()
            .zip(scores)
            .map(|(bbox, &score)| self.keeps(bbox, score))
            .collect()
    }
}

/// A composable sequence of filters, applied in order.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<BoxFilter>,
}

impl FilterChain {
    #[must_use]
    pub fn new() -> FilterChain {
        FilterChain::default()
    }

    #[must_use]
    pub fn with(mut self, filter: BoxFilter) -> FilterChain {
        self.filters.push(filter);
        self
    }

    /// Run the chain over parallel box/score arrays.
    pub fn apply(&self, boxes: &mut Vec<Bbox<Xywh>>, scores: &mut Vec<f32>) {
        debug_assert_eq!(boxes.len(), scores.len());

        for filter in &self.filters {
            let mask = filter.mask(boxes, scores);
            retain_masked(boxes, &mask);
            retain_masked(scores, &mask);
            debug_assert_eq!(boxes.len(), scores.len());
        }
    }

    /// Run the chain with a third parallel column of labels.
    pub fn apply_labeled(
        &self,
        boxes: &mut Vec<Bbox<Xywh>>,
        scores: &mut Vec<f32>,
        labels: &mut Vec<usize>,
    ) {
        debug_assert_eq!(boxes.len(), scores.len());
        debug_assert_eq!(boxes.len(), labels.len());

        for filter in &self.filters {
            let mask = filter.mask(boxes, scores);
            retain_masked(boxes, &mask);
            retain_masked(scores, &mask);
            retain_masked(labels, &mask);
        }
    }
}

fn retain_masked<T>(items: &mut Vec<T>, mask: &[bool]) {
    let mut it = mask.iter();
    items.retain(|_| *it.next().unwrap());
}
