//! Typed wrappers around the raw network output arrays.
//!
//! The external network hands back plain `ndarray` tensors; the wrappers in
//! this module pin down the channel layout the detector expects and reject
//! mismatched shapes up front, so the geometric stages never have to
//! re-validate dimensions.

use ndarray::{Array2, Array3, ArrayView1};

use crate::error::{Error, Result};

/// Per-location objectness scores produced by the region-proposal head.
///
/// Shape `(rows, cols, num_anchors)`: one object-likelihood value per anchor
/// per spatial cell of the feature map.
#[derive(Debug, Clone)]
pub struct ScoreMap {
    map: Array3<f32>,
}

impl ScoreMap {
    /// Wrap a raw score tensor, checking the anchor channel count.
    pub fn new(map: Array3<f32>, num_anchors: usize) -> Result<Self> {
        let channels = map.dim().2;
        if channels != num_anchors {
            return Err(Error::ScoreChannels {
                expected: num_anchors,
                actual: channels,
            });
        }

        Ok(ScoreMap { map })
    }

    /// The spatial grid of the feature map, as `(rows, cols)`.
    #[must_use]
    pub fn grid(&self) -> (usize, usize) {
        let (rows, cols, _) = self.map.dim();
        (rows, cols)
    }

    #[must_use]
    pub fn num_anchors(&self) -> usize {
        self.map.dim().2
    }

    /// All anchor scores at one spatial cell.
    #[must_use]
    pub fn cell(&self, row: usize, col: usize) -> ArrayView1<'_, f32> {
        self.map.slice(ndarray::s![row, col, ..])
    }
}

/// Per-location box deltas produced by the region-proposal head.
///
/// Shape `(rows, cols, 4 * num_anchors)`: a `(dx, dy, dw, dh)` quadruple per
/// anchor per cell, laid out anchor-major. The anchor ordering must match
/// [`ScoreMap`]'s channels; both follow the anchor pyramid's ordering.
#[derive(Debug, Clone)]
pub struct RegressionMap {
    map: Array3<f32>,
}

impl RegressionMap {
    /// Wrap a raw regression tensor, checking channel count and that its
    /// spatial grid agrees with the score map it accompanies.
    pub fn new(map: Array3<f32>, num_anchors: usize, scores: &ScoreMap) -> Result<Self> {
        let (rows, cols, channels) = map.dim();
        if channels != 4 * num_anchors {
            return Err(Error::RegressionChannels {
                expected: 4 * num_anchors,
                actual: channels,
            });
        }

        let (score_rows, score_cols) = scores.grid();
        if (rows, cols) != (score_rows, score_cols) {
            return Err(Error::GridMismatch {
                score_rows,
                score_cols,
                regression_rows: rows,
                regression_cols: cols,
            });
        }

        Ok(RegressionMap { map })
    }

    /// The `(dx, dy, dw, dh)` quadruple for one anchor at one cell.
    #[must_use]
    pub fn deltas(&self, row: usize, col: usize, anchor: usize) -> [f32; 4] {
        let base = 4 * anchor;
        [
            self.map[[row, col, base]],
            self.map[[row, col, base + 1]],
            self.map[[row, col, base + 2]],
            self.map[[row, col, base + 3]],
        ]
    }
}

/// Per-region class scores from the classification head.
///
/// Shape `(num_regions, num_classes + 1)`: one raw score per foreground
/// class plus a trailing background column. Rows are unnormalized; callers
/// softmax them before comparing against thresholds.
#[derive(Debug, Clone)]
pub struct ClassScores {
    scores: Array2<f32>,
}

impl ClassScores {
    /// Wrap a raw class-score matrix, checking the column count against the
    /// foreground class count and the row count against the submitted regions.
    pub fn new(scores: Array2<f32>, num_classes: usize, num_regions: usize) -> Result<Self> {
        let (rows, cols) = scores.dim();
        if cols != num_classes + 1 {
            return Err(Error::ClassColumns {
                expected: num_classes + 1,
                actual: cols,
            });
        }
        if rows != num_regions {
            return Err(Error::RegionCount {
                expected: num_regions,
                actual: rows,
            });
        }

        Ok(ClassScores { scores })
    }

    #[must_use]
    pub fn num_regions(&self) -> usize {
        self.scores.dim().0
    }

    /// Index of the background column (always the last one).
    #[must_use]
    pub fn background_index(&self) -> usize {
        self.scores.dim().1 - 1
    }

    /// The score row for one region, background column included.
    #[must_use]
    pub fn region(&self, index: usize) -> ArrayView1<'_, f32> {
        self.scores.row(index)
    }

    /// The full score matrix, for callers that report all class scores.
    #[must_use]
    pub fn matrix(&self) -> &Array2<f32> {
        &self.scores
    }
}

/// Per-region, per-class box deltas from the regression head.
///
/// Shape `(num_regions, 4 * num_classes)`: a `(dx, dy, dw, dh)` quadruple
/// for every foreground class. Background has no regression parameters.
#[derive(Debug, Clone)]
pub struct ClassDeltas {
    deltas: Array2<f32>,
}

impl ClassDeltas {
    /// Wrap a raw per-class regression matrix, checking both dimensions.
    pub fn new(deltas: Array2<f32>, num_classes: usize, num_regions: usize) -> Result<Self> {
        let (rows, cols) = deltas.dim();
        if cols != 4 * num_classes {
            return Err(Error::DeltaColumns {
                expected: 4 * num_classes,
                actual: cols,
            });
        }
        if rows != num_regions {
            return Err(Error::RegionCount {
                expected: num_regions,
                actual: rows,
            });
        }

        Ok(ClassDeltas { deltas })
    }

    #[must_use]
    pub fn num_regions(&self) -> usize {
        self.deltas.dim().0
    }

    /// Number of foreground classes covered by the delta columns.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.deltas.dim().1 / 4
    }

    /// The `(dx, dy, dw, dh)` quadruple for one region and one foreground class.
    #[must_use]
    pub fn for_class(&self, region: usize, class: usize) -> [f32; 4] {
        let base = 4 * class;
        [
            self.deltas[[region, base]],
            self.deltas[[region, base + 1]],
            self.deltas[[region, base + 2]],
            self.deltas[[region, base + 3]],
        ]
    }
}
