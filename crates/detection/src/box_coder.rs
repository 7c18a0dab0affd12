use crate::bbox::{Bbox, Xywh};

/// Decodes learned 4-parameter deltas against a reference box, using the
/// center-size parametrization standard in anchor-based detectors (the same
/// one torchvision's `BoxCoder` implements).
///
/// `dx`/`dy` shift the reference center in units of the reference size,
/// `dw`/`dh` scale the extent in log space. Results are rounded to whole
/// pixels; a zero delta therefore reproduces an integral reference box
/// exactly.
#[derive(Debug, Clone)]
pub struct BoxCoder {
    /// Per-component divisors applied to incoming deltas.
    pub weights: (f32, f32, f32, f32),
    /// The maximum value for `dw`/`dh` before exponentiation.
    /// This is used to avoid overflow when applying the exponent.
    pub bbox_xform_clip: f32,
    /// Optional `(min, max)` clamp on the regressed `(height, width)`.
    /// Clamp-only: the center stays where regression put it.
    pub size_range: Option<((f32, f32), (f32, f32))>,
}

impl Default for BoxCoder {
    fn default() -> Self {
        BoxCoder::new()
    }
}

impl BoxCoder {
    /// Create a [`BoxCoder`] with unit weights and a `bbox_xform_clip` of
    /// `ln(1000/16)`.
    #[must_use]
    pub fn new() -> Self {
        BoxCoder {
            weights: (1.0, 1.0, 1.0, 1.0),
            bbox_xform_clip: (1000.0_f32 / 16.0).ln(),
            size_range: None,
        }
    }

    /// Set the delta weights.
    #[must_use]
    pub fn with_weights(mut self, weights: (f32, f32, f32, f32)) -> Self {
        self.weights = weights;
        self
    }

    /// Clamp regressed extents into `[min, max]` per `(height, width)` axis.
    #[must_use]
    pub fn with_size_range(mut self, min: (f32, f32), max: (f32, f32)) -> Self {
        self.size_range = Some((min, max));
        self
    }

    /// Apply one `(dx, dy, dw, dh)` delta to a reference box.
    ///
    /// Returns `None` when the delta is not finite — the caller drops that
    /// box and moves on, a bad regression output is never an error.
    #[must_use]
    pub fn apply(&self, reference: Bbox<Xywh>, delta: [f32; 4]) -> Option<Bbox<Xywh>> {
        let [dx, dy, dw, dh] = delta;
        if !(dx.is_finite() && dy.is_finite() && dw.is_finite() && dh.is_finite()) {
            return None;
        }

        let (x, y, width, height) = reference.inner;
        let cx = x + (width / 2.0).floor();
        let cy = y + (height / 2.0).floor();

        let (wx, wy, ww, wh) = self.weights;
        let dx = dx / wx;
        let dy = dy / wy;

        // clamp to avoid overflow in exp
        let dw = (dw / ww).min(self.bbox_xform_clip);
        let dh = (dh / wh).min(self.bbox_xform_clip);

        let gx = width * dx + cx;
        let gy = height * dy + cy;
        let mut gw = width * dw.exp();
        let mut gh = height * dh.exp();

        if let Some(((min_h, min_w), (max_h, max_w))) = self.size_range {
            gw = gw.clamp(min_w, max_w);
            gh = gh.clamp(min_h, max_h);
        }

        let bbox = Bbox::xywh(
            (gx - (gw / 2.0).floor()).round(),
            (gy - (gh / 2.0).floor()).round(),
            gw.round(),
            gh.round(),
        );

        let (bx, by, bw, bh) = bbox.inner;
        (bx.is_finite() && by.is_finite() && bw.is_finite() && bh.is_finite()).then_some(bbox)
    }
}
