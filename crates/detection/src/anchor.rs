use crate::bbox::{Bbox, ConvertBbox, Xywh};

/// The fixed set of reference box shapes placed at every cell of a score
/// map.
///
/// Shapes are the configured base `(height, width)` pairs blown up through a
/// geometric scale pyramid: level `l` multiplies every base size by
/// `pyramid_scale^l`. The resulting ordering is base-major, then level-major
/// (`index = base_idx + level * num_base_sizes`), which is also how the
/// network lays out its score and regression channels — the two sides must
/// agree on this ordering or every decoded box is garbage.
///
/// Anchors are derived from validated configuration, never learned, and the
/// table is immutable once built.
#[derive(Debug, Clone)]
pub struct AnchorPyramid {
    shapes: Vec<(f32, f32)>,
    num_base_sizes: usize,
    num_levels: usize,
}

impl AnchorPyramid {
    /// Build the full anchor table from base sizes and pyramid parameters.
    #[must_use]
    pub fn new(base_sizes: &[(f32, f32)], pyramid_scale: f32, num_levels: usize) -> AnchorPyramid {
        let mut shapes = Vec::with_capacity(base_sizes.len() * num_levels);
        for level in 0..num_levels {
            let scale = pyramid_scale.powi(level as i32);
            for &(height, width) in base_sizes {
                shapes.push((height * scale, width * scale));
            }
        }

        AnchorPyramid {
            shapes,
            num_base_sizes: base_sizes.len(),
            num_levels,
        }
    }

    /// Total number of anchor shapes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    #[must_use]
    pub fn num_base_sizes(&self) -> usize {
        self.num_base_sizes
    }

    #[must_use]
    pub fn num_levels(&self) -> usize {
        self.num_levels
    }

    /// The `(height, width)` of one anchor shape.
    #[must_use]
    pub fn shape(&self, index: usize) -> (f32, f32) {
        self.shapes[index]
    }

    #[must_use]
    pub fn shapes(&self) -> &[(f32, f32)] {
        &self.shapes
    }

    /// The anchor box placed with its center on the given image point.
    #[must_use]
    pub fn centered_at(&self, index: usize, cx: f32, cy: f32) -> Bbox<Xywh> {
        let (height, width) = self.shapes[index];
        Bbox::cxcywh(cx, cy, width, height).convert()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_base_major_then_level_major() {
        let pyramid = AnchorPyramid::new(&[(32.0, 16.0), (16.0, 32.0)], 2.0, 3);

        assert_eq!(pyramid.len(), 6);
        assert_eq!(pyramid.shape(0), (32.0, 16.0));
        assert_eq!(pyramid.shape(1), (16.0, 32.0));
        assert_eq!(pyramid.shape(2), (64.0, 32.0));
        assert_eq!(pyramid.shape(3), (32.0, 64.0));
        assert_eq!(pyramid.shape(4), (128.0, 64.0));
        assert_eq!(pyramid.shape(5), (64.0, 128.0));
    }

    #[test]
    fn single_level_pyramid_keeps_base_sizes() {
        let pyramid = AnchorPyramid::new(&[(32.0, 32.0)], 1.5, 1);
        assert_eq!(pyramid.shapes(), &[(32.0, 32.0)]);
    }

    #[test]
    fn centered_anchor_straddles_the_point() {
        let pyramid = AnchorPyramid::new(&[(10.0, 20.0)], 2.0, 1);
        let bbox = pyramid.centered_at(0, 50.0, 40.0);
        assert_eq!(bbox.inner, (40.0, 35.0, 20.0, 10.0));
    }
}
