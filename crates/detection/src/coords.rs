//! Mapping between image pixel space and feature-map space.
//!
//! A convolutional backbone downsamples the image by a fixed but
//! architecture-dependent factor, so the relation between the two coordinate
//! systems is a per-axis affine scale. Computing that scale means asking the
//! network for the feature-map size of a given image size, which is worth
//! caching — but the cache is an owned value, one per execution context,
//! never shared across workers (distinct images may have distinct sizes).

use crate::bbox::{Bbox, Xywh};
use crate::error::{Error, Result};

/// Scale factors relating image pixels to feature-map cells.
///
/// `sx`/`sy` are `feature_size / image_size` per axis; multiplying an image
/// coordinate by them lands in feature space, dividing goes back. The two
/// directions are exact inverses up to floating-point rounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateScale {
    pub sx: f32,
    pub sy: f32,
}

impl CoordinateScale {
    /// Map a box from image pixels into feature-map coordinates.
    #[must_use]
    pub fn to_feature_space(&self, bbox: Bbox<Xywh>) -> Bbox<Xywh> {
        bbox.scaled(self.sx, self.sy)
    }

    /// Map a box from feature-map coordinates into image pixels.
    #[must_use]
    pub fn to_image_space(&self, bbox: Bbox<Xywh>) -> Bbox<Xywh> {
        bbox.scaled(1.0 / self.sx, 1.0 / self.sy)
    }

    /// Center of the feature-map cell `(col, row)` in image pixels.
    #[must_use]
    pub fn cell_center(&self, col: usize, row: usize) -> (f32, f32) {
        ((col as f32 + 0.5) / self.sx, (row as f32 + 0.5) / self.sy)
    }
}

/// Cache of the scale computed for the most recent image size.
///
/// Recomputes (through the caller's feature-geometry callback) only when the
/// queried size differs from the cached key, since consecutive images in a
/// stream usually share dimensions.
#[derive(Debug, Clone, Default)]
pub struct ScaleCache {
    cached: Option<((usize, usize), CoordinateScale)>,
}

impl ScaleCache {
    #[must_use]
    pub fn new() -> ScaleCache {
        ScaleCache::default()
    }

    /// The scale factors for an image of `(height, width)` pixels.
    ///
    /// `feature_size` maps an image size to the network's feature-map grid
    /// `(rows, cols)` and is only invoked on a cache miss. Mixing scales
    /// computed through different callbacks is on the caller; one cache
    /// belongs to one network configuration.
    pub fn scale_factors<F>(
        &mut self,
        image_size: (usize, usize),
        feature_size: F,
    ) -> Result<CoordinateScale>
    where
        F: FnOnce((usize, usize)) -> (usize, usize),
    {
        if let Some((cached_size, scale)) = self.cached {
            if cached_size == image_size {
                return Ok(scale);
            }
        }

        let (height, width) = image_size;
        if height == 0 || width == 0 {
            return Err(Error::DegenerateImage { height, width });
        }

        let (rows, cols) = feature_size(image_size);
        if rows == 0 || cols == 0 {
            return Err(Error::DegenerateImage {
                height: rows,
                width: cols,
            });
        }

        let scale = CoordinateScale {
            sx: cols as f32 / width as f32,
            sy: rows as f32 / height as f32,
        };
        self.cached = Some((image_size, scale));

        Ok(scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quarter_grid((height, width): (usize, usize)) -> (usize, usize) {
        (height / 4, width / 4)
    }

    #[test]
    fn round_trip_stays_within_one_pixel() {
        let mut cache = ScaleCache::new();

        for image_size in [(64, 64), (480, 640), (123, 77), (31, 500)] {
            let scale = cache.scale_factors(image_size, quarter_grid).unwrap();
            let bbox = Bbox::xywh(17.0, 23.0, 40.0, 31.0);
            let back = scale.to_image_space(scale.to_feature_space(bbox));

            let (x, y, w, h) = back.inner;
            assert!((x - 17.0).abs() <= 1.0);
            assert!((y - 23.0).abs() <= 1.0);
            assert!((w - 40.0).abs() <= 1.0);
            assert!((h - 31.0).abs() <= 1.0);
        }
    }

    #[test]
    fn cache_skips_recomputation_for_the_same_size() {
        let mut cache = ScaleCache::new();
        let mut calls = 0;

        for _ in 0..3 {
            let _ = cache
                .scale_factors((100, 200), |size| {
                    calls += 1;
                    quarter_grid(size)
                })
                .unwrap();
        }
        assert_eq!(calls, 1);

        let _ = cache
            .scale_factors((200, 100), |size| {
                calls += 1;
                quarter_grid(size)
            })
            .unwrap();
        assert_eq!(calls, 2);
    }

    #[test]
    fn cache_invalidates_when_the_size_changes_back() {
        let mut cache = ScaleCache::new();

        let first = cache.scale_factors((100, 100), quarter_grid).unwrap();
        let _ = cache.scale_factors((200, 200), quarter_grid).unwrap();
        let again = cache.scale_factors((100, 100), quarter_grid).unwrap();

        assert_eq!(first, again);
    }

    #[test]
    fn zero_sized_image_is_rejected() {
        let mut cache = ScaleCache::new();
        assert!(matches!(
            cache.scale_factors((0, 64), quarter_grid),
            Err(Error::DegenerateImage { .. })
        ));
    }

    #[test]
    fn cell_centers_land_mid_cell_in_image_space() {
        let scale = CoordinateScale { sx: 0.25, sy: 0.25 };
        assert_eq!(scale.cell_center(0, 0), (2.0, 2.0));
        assert_eq!(scale.cell_center(3, 1), (14.0, 6.0));
    }
}
