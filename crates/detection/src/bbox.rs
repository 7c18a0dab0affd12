use serde::{Deserialize, Serialize};

/// A type-safe bounding box.
///
/// It is a wrapper around a tuple of four `f32` values in pixel units with an
/// upper-left origin. The type parameter `T` is used to specify the format of
/// the bounding box, and is used to enforce type safety.
///
/// # Conversion
///
/// The bounding box can be converted between different formats using the
/// [`ConvertBbox`] trait.
///
/// ```
/// use detection::bbox::*;
///
/// let xyxy = Bbox::xyxy(4.0, 4.0, 10.0, 10.0);
/// let xywh: Bbox<Xywh> = xyxy.convert();
///
/// assert_eq!(xywh.inner, (4.0, 4.0, 6.0, 6.0));
/// ```
///
/// # Formats
///
/// The following formats are supported:
///
/// - [`Xyxy`] (xmin, ymin, xmax, ymax)
/// - [`Xywh`] (xmin, ymin, width, height)
/// - [`Cxcywh`] (center_x, center_y, width, height)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox<T> {
    pub inner: (f32, f32, f32, f32),
    _marker: std::marker::PhantomData<T>,
}

impl<T> Bbox<T> {
    /// Create a new bounding box from the given coordinates.
    fn new(bbox: (f32, f32, f32, f32)) -> Self {
        Bbox {
            inner: bbox,
            _marker: std::marker::PhantomData,
        }
    }
}

/// Trait for converting a bounding box to a different representation.
pub trait ConvertBbox<T> {
    fn convert(&self) -> Bbox<T>;
}

/// Marker type for bounding boxes with coordinates of the top-left and
/// bottom-right corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Xyxy;

/// Marker type for bounding boxes with coordinates of the top-left corner and
/// the width and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Xywh;

/// Marker type for bounding boxes with the center point and the width and
/// height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cxcywh;

impl Bbox<Xyxy> {
    /// Create a bounding box from the coordinates of the top-left and
    /// bottom-right corners.
    #[must_use]
    pub fn xyxy(x1: f32, y1: f32, x2: f32, y2: f32) -> Bbox<Xyxy> {
        Bbox::new((x1, y1, x2, y2))
    }
}

impl Bbox<Xywh> {
    /// Create a bounding box from the coordinates of the top-left corner and
    /// the width and height.
    #[must_use]
    pub fn xywh(x: f32, y: f32, width: f32, height: f32) -> Bbox<Xywh> {
        Bbox::new((x, y, width, height))
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.inner.2
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.inner.3
    }

    /// Whether this is a usable pixel box: finite coordinates and at least
    /// one pixel of width and height.
    ///
    /// Degenerate boxes are dropped by the filtering stages, never clamped
    /// silently into validity.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let (x, y, w, h) = self.inner;
        x.is_finite() && y.is_finite() && w.is_finite() && h.is_finite() && w >= 1.0 && h >= 1.0
    }

    /// The box shifted by the given offset.
    #[must_use]
    pub fn translated(&self, dx: f32, dy: f32) -> Bbox<Xywh> {
        let (x, y, w, h) = self.inner;
        Bbox::xywh(x + dx, y + dy, w, h)
    }

    /// The box with coordinates and extent scaled per axis.
    #[must_use]
    pub fn scaled(&self, sx: f32, sy: f32) -> Bbox<Xywh> {
        let (x, y, w, h) = self.inner;
        Bbox::xywh(x * sx, y * sy, w * sx, h * sy)
    }

    /// The box clipped against an image of the given size.
    ///
    /// Corners are clamped into `[0, width] x [0, height]`; the result may be
    /// degenerate if the box lay entirely outside the image.
    #[must_use]
    pub fn clipped(&self, image_width: f32, image_height: f32) -> Bbox<Xywh> {
        let (x1, y1, x2, y2) = ConvertBbox::<Xyxy>::convert(self).inner;
        Bbox::xyxy(
            x1.clamp(0.0, image_width),
            y1.clamp(0.0, image_height),
            x2.clamp(0.0, image_width),
            y2.clamp(0.0, image_height),
        )
        .convert()
    }

    /// The box with all four values rounded to whole pixels.
    #[must_use]
    pub fn rounded(&self) -> Bbox<Xywh> {
        let (x, y, w, h) = self.inner;
        Bbox::xywh(x.round(), y.round(), w.round(), h.round())
    }
}

impl Bbox<Cxcywh> {
    /// Create a bounding box from its center point and the width and height.
    #[must_use]
    pub fn cxcywh(cx: f32, cy: f32, width: f32, height: f32) -> Bbox<Cxcywh> {
        Bbox::new((cx, cy, width, height))
    }
}

impl ConvertBbox<Xyxy> for Bbox<Xyxy> {
    fn convert(&self) -> Bbox<Xyxy> {
        *self
    }
}

impl ConvertBbox<Xywh> for Bbox<Xyxy> {
    fn convert(&self) -> Bbox<Xywh> {
        let (x1, y1, x2, y2) = self.inner;
        Bbox::new((x1, y1, x2 - x1, y2 - y1))
    }
}

impl ConvertBbox<Xyxy> for Bbox<Xywh> {
    fn convert(&self) -> Bbox<Xyxy> {
        let (x, y, w, h) = self.inner;
        Bbox::new((x, y, x + w, y + h))
    }
}

impl ConvertBbox<Xywh> for Bbox<Xywh> {
    fn convert(&self) -> Bbox<Xywh> {
        *self
    }
}

impl ConvertBbox<Cxcywh> for Bbox<Xywh> {
    fn convert(&self) -> Bbox<Cxcywh> {
        let (x, y, w, h) = self.inner;
        Bbox::new((x + w / 2.0, y + h / 2.0, w, h))
    }
}

impl ConvertBbox<Xywh> for Bbox<Cxcywh> {
    fn convert(&self) -> Bbox<Xywh> {
        let (cx, cy, w, h) = self.inner;
        Bbox::new((cx - w / 2.0, cy - h / 2.0, w, h))
    }
}

impl ConvertBbox<Xyxy> for Bbox<Cxcywh> {
    fn convert(&self) -> Bbox<Xyxy> {
        ConvertBbox::<Xyxy>::convert(&ConvertBbox::<Xywh>::convert(self))
    }
}

/// The reference area used when turning an intersection into an overlap
/// ratio.
///
/// `Union` is the classic IoU denominator. `Min` divides by the smaller of
/// the two areas instead, so a box fully nested inside another scores `1.0`
/// regardless of the size difference; it exists specifically to let
/// suppression kill small boxes contained in larger ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum OverlapMetric {
    Union,
    Min,
}

impl<T> Bbox<T>
where
    Bbox<T>: ConvertBbox<Xyxy>,
{
    /// Compute the area of the bounding box.
    pub fn area(&self) -> f32 {
        let (x1, y1, x2, y2) = ConvertBbox::<Xyxy>::convert(self).inner;
        (x2 - x1) * (y2 - y1)
    }

    /// Compute the intersection area between two bounding boxes.
    ///
    /// If the bounding boxes do not overlap, the intersection area is `0.0`.
    pub fn intersection<S>(&self, other: &S) -> f32
    where
        S: ConvertBbox<Xyxy>,
    {
        let (x1, y1, x2, y2) = ConvertBbox::<Xyxy>::convert(self).inner;
        let (x3, y3, x4, y4) = ConvertBbox::<Xyxy>::convert(other).inner;

        let x1 = x1.max(x3);
        let y1 = y1.max(y3);
        let x2 = x2.min(x4);
        let y2 = y2.min(y4);

        if x2 < x1 || y2 < y1 {
            0.0
        } else {
            (x2 - x1) * (y2 - y1)
        }
    }

    /// Compute the union area between two bounding boxes.
    ///
    /// The union area is the sum of the two areas minus the intersection
    /// area.
    pub fn union<S>(&self, other: &S) -> f32
    where
        S: ConvertBbox<Xyxy>,
    {
        let area1 = ConvertBbox::<Xyxy>::convert(self).area();
        let area2 = ConvertBbox::<Xyxy>::convert(other).area();
        area1 + area2 - self.intersection(other)
    }

    /// The overlap ratio between two boxes under the given metric.
    ///
    /// Returns `0.0` when the reference area is degenerate.
    pub fn overlap<S>(&self, other: &S, metric: OverlapMetric) -> f32
    where
        S: ConvertBbox<Xyxy>,
    {
        let intersection = self.intersection(other);
        let reference = match metric {
            OverlapMetric::Union => self.union(other),
            OverlapMetric::Min => {
                let area1 = ConvertBbox::<Xyxy>::convert(self).area();
                let area2 = ConvertBbox::<Xyxy>::convert(other).area();
                area1.min(area2)
            }
        };

        if reference > 0.0 {
            intersection / reference
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox() {
        let bbox1 = Bbox::xyxy(0.0, 0.0, 10.0, 10.0);
        let bbox2 = Bbox::xyxy(5.0, 5.0, 15.0, 15.0);

        assert_eq!(bbox1.intersection(&bbox2), 25.0);
        assert_eq!(bbox1.union(&bbox2), 175.0);
    }

    #[test]
    fn conversion_round_trips() {
        let xywh = Bbox::xywh(10.0, 20.0, 30.0, 40.0);
        let cxcywh: Bbox<Cxcywh> = xywh.convert();
        assert_eq!(cxcywh.inner, (25.0, 40.0, 30.0, 40.0));

        let back: Bbox<Xywh> = cxcywh.convert();
        assert_eq!(back, xywh);
    }

    #[test]
    fn nested_box_overlap_is_one_under_min_metric() {
        let outer = Bbox::xywh(10.0, 10.0, 50.0, 50.0);
        let inner = Bbox::xywh(12.0, 12.0, 46.0, 46.0);

        assert!((inner.overlap(&outer, OverlapMetric::Min) - 1.0).abs() < 1e-6);
        assert!(inner.overlap(&outer, OverlapMetric::Union) < 1.0);
    }

    #[test]
    fn degenerate_boxes_are_invalid() {
        assert!(!Bbox::xywh(0.0, 0.0, 0.0, 5.0).is_valid());
        assert!(!Bbox::xywh(0.0, 0.0, 5.0, -1.0).is_valid());
        assert!(!Bbox::xywh(f32::NAN, 0.0, 5.0, 5.0).is_valid());
        assert!(Bbox::xywh(0.0, 0.0, 1.0, 1.0).is_valid());
    }

    #[test]
    fn clipping_clamps_corners_to_the_image() {
        let bbox = Bbox::xywh(-5.0, 2.0, 20.0, 20.0);
        let clipped = bbox.clipped(10.0, 10.0);
        assert_eq!(clipped.inner, (0.0, 2.0, 10.0, 8.0));
    }
}
