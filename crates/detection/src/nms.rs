//! Greedy non-maximum suppression.

use crate::bbox::{Bbox, OverlapMetric, Xywh};

/// Applies non-maximum suppression to the given bounding boxes and scores.
///
/// Indices are ranked by score descending and processed greedily: the best
/// remaining box is kept, and every other remaining box whose overlap with
/// it (under `metric`) is positive and reaches `threshold` is removed, so a
/// zero threshold removes overlapping boxes but never disjoint ones. Score
/// ties keep the lower original index — the sort is stable, so the
/// tie-break is deterministic.
///
/// The returned indices point into the input slices, best first; callers use
/// them to re-slice any auxiliary per-box data (labels and the like) this
/// function never sees. The output is always a subset of the input indices.
/// Boxes with non-finite scores cannot be ranked and are dropped up front.
#[must_use]
pub fn suppress(
    boxes: &[Bbox<Xywh>],
    scores: &[f32],
    metric: OverlapMetric,
    threshold: f32,
) -> Vec<usize> {
    debug_assert_eq!(boxes.len(), scores.len());

    let mut order: Vec<usize> = (0..boxes.len()).filter(|&i| scores[i].is_finite()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut removed = vec![false; boxes.len()];
    let mut kept = Vec::new();

    for (rank, &index) in order.iter().enumerate() {
        if removed[index] {
            continue;
        }
        kept.push(index);

        for &other in &order[rank + 1..] {
            if removed[other] {
                continue;
            }
            let overlap = boxes[index].overlap(&boxes[other], metric);
            if overlap > 0.0 && overlap >= threshold {
                removed[other] = true;
            }
        }
    }

    kept
}

/// Gather the survivors of a suppression pass out of a parallel array.
#[must_use]
pub fn select<T: Clone>(items: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| items[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn output_never_grows() {
        let mut rng = rand::rng();

        for _ in 0..50 {
            let n = rng.random_range(0..40);
            let boxes: Vec<_> = (0..n)
                .map(|_| {
                    Bbox::xywh(
                        rng.random_range(0.0..100.0),
                        rng.random_range(0.0..100.0),
                        rng.random_range(1.0..50.0),
                        rng.random_range(1.0..50.0),
                    )
                })
                .collect();
            let scores: Vec<_> = (0..n).map(|_| rng.random_range(0.0..1.0)).collect();

            for metric in [OverlapMetric::Union, OverlapMetric::Min] {
                let kept = suppress(&boxes, &scores, metric, 0.5);
                assert!(kept.len() <= boxes.len());
            }
        }
    }

    #[test]
    fn maximal_threshold_only_removes_exact_duplicates() {
        let boxes = vec![
            Bbox::xywh(0.0, 0.0, 10.0, 10.0),
            Bbox::xywh(0.0, 0.0, 10.0, 10.0),
            Bbox::xywh(2.0, 2.0, 10.0, 10.0),
        ];
        let scores = vec![0.9, 0.8, 0.7];

        let kept = suppress(&boxes, &scores, OverlapMetric::Union, 1.0);
        assert_eq!(kept, vec![0, 2]);
    }

    #[test]
    fn zero_threshold_keeps_only_the_best_of_mutually_overlapping_boxes() {
        let boxes = vec![
            Bbox::xywh(0.0, 0.0, 10.0, 10.0),
            Bbox::xywh(5.0, 5.0, 10.0, 10.0),
            Bbox::xywh(8.0, 8.0, 10.0, 10.0),
        ];
        let scores = vec![0.5, 0.9, 0.6];

        let kept = suppress(&boxes, &scores, OverlapMetric::Union, 0.0);
        assert_eq!(kept, vec![1]);
    }

    #[test]
    fn zero_threshold_never_removes_disjoint_boxes() {
        let boxes = vec![
            Bbox::xywh(0.0, 0.0, 10.0, 10.0),
            Bbox::xywh(50.0, 50.0, 10.0, 10.0),
        ];
        let scores = vec![0.9, 0.8];

        for metric in [OverlapMetric::Union, OverlapMetric::Min] {
            assert_eq!(suppress(&boxes, &scores, metric, 0.0), vec![0, 1]);
        }
    }

    #[test]
    fn score_ties_keep_the_earlier_index() {
        let boxes = vec![
            Bbox::xywh(0.0, 0.0, 10.0, 10.0),
            Bbox::xywh(1.0, 1.0, 10.0, 10.0),
        ];
        let scores = vec![0.8, 0.8];

        let kept = suppress(&boxes, &scores, OverlapMetric::Union, 0.5);
        assert_eq!(kept, vec![0]);
    }

    #[test]
    fn min_metric_suppresses_nested_boxes_where_union_does_not() {
        let boxes = vec![
            Bbox::xywh(10.0, 10.0, 50.0, 50.0),
            Bbox::xywh(12.0, 12.0, 46.0, 46.0),
        ];
        let scores = vec![0.9, 0.7];

        assert_eq!(suppress(&boxes, &scores, OverlapMetric::Min, 0.5), vec![0]);
        // union-IoU of the nested pair is 46²/50² ≈ 0.85, above 0.5 — but at
        // a stricter threshold the union metric keeps both
        assert_eq!(
            suppress(&boxes, &scores, OverlapMetric::Union, 0.9),
            vec![0, 1]
        );
    }

    #[test]
    fn non_finite_scores_are_dropped_up_front() {
        let boxes = vec![
            Bbox::xywh(0.0, 0.0, 10.0, 10.0),
            Bbox::xywh(50.0, 50.0, 10.0, 10.0),
        ];
        let scores = vec![f32::NAN, 0.4];

        assert_eq!(suppress(&boxes, &scores, OverlapMetric::Union, 0.5), vec![1]);
    }

    #[test]
    fn kept_indices_reindex_auxiliary_data() {
        let boxes = vec![
            Bbox::xywh(0.0, 0.0, 10.0, 10.0),
            Bbox::xywh(1.0, 1.0, 10.0, 10.0),
            Bbox::xywh(80.0, 80.0, 10.0, 10.0),
        ];
        let scores = vec![0.6, 0.9, 0.5];
        let labels = vec!["a", "b", "c"];

        let kept = suppress(&boxes, &scores, OverlapMetric::Union, 0.5);
        assert_eq!(select(&labels, &kept), vec!["b", "c"]);
    }
}
