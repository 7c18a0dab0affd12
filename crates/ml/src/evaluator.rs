//! The network boundary: traits the detection pipeline calls through.
//!
//! The convolutional network itself is out of scope; the pipeline only ever
//! sees it through [`Evaluator`]. A first call runs the region-proposal head
//! over the full image; a second call classifies and regresses a batch of
//! candidate regions (implementations are expected to reuse the shared
//! feature map between the two).

use crate::error::Result;
use crate::maps::{ClassDeltas, ClassScores, RegressionMap, ScoreMap};

/// Candidate region in image pixels, as `(x, y, width, height)` rows.
///
/// Regions cross this boundary as plain quadruples; the geometry types live
/// one crate up and are flattened before the call.
pub type Region = [f32; 4];

/// Execution-resource hints forwarded to the network call.
///
/// The pipeline never interprets these; they exist so hosts can steer the
/// external engine (device placement, batching) through the public API.
#[derive(Debug, Clone, Default)]
pub struct ExecutionHints {
    pub device: Option<String>,
    pub batch_size: Option<usize>,
}

/// The minimal image surface the pipeline needs.
pub trait DetectionImage: Sized {
    /// Image size as `(height, width)` in pixels.
    fn dimensions(&self) -> (usize, usize);

    /// Copy out the given sub-rectangle as a new image.
    ///
    /// # Panics
    ///
    /// Implementations may panic if the rectangle exceeds the image; the
    /// pipeline validates regions of interest before cropping.
    fn crop(&self, x: usize, y: usize, width: usize, height: usize) -> Self;
}

/// A network that scores images and regions.
pub trait Evaluator<I: DetectionImage> {
    /// Run the region-proposal head over the whole image.
    fn rpn_forward(&self, image: &I) -> Result<(ScoreMap, RegressionMap)>;

    /// Classify and regress a batch of candidate regions of the image.
    fn classify(
        &self,
        image: &I,
        regions: &[Region],
        hints: &ExecutionHints,
    ) -> Result<(ClassScores, ClassDeltas)>;
}

/// A single-channel float image stored row-major.
///
/// This is the reference [`DetectionImage`] implementation, used by the test
/// suites and small hosts; real deployments usually wrap their own frame
/// type instead.
#[derive(Debug, Clone)]
pub struct PlanarImage {
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl PlanarImage {
    /// Create an image from row-major pixel data.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != height * width`.
    #[must_use]
    pub fn new(height: usize, width: usize, data: Vec<f32>) -> Self {
        assert_eq!(
            data.len(),
            height * width,
            "pixel buffer does not match image dimensions"
        );
        PlanarImage {
            height,
            width,
            data,
        }
    }

    /// An all-zero image of the given size.
    #[must_use]
    pub fn zeros(height: usize, width: usize) -> Self {
        PlanarImage {
            height,
            width,
            data: vec![0.0; height * width],
        }
    }

    #[must_use]
    pub fn pixels(&self) -> &[f32] {
        &self.data
    }
}

impl DetectionImage for PlanarImage {
    fn dimensions(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    fn crop(&self, x: usize, y: usize, width: usize, height: usize) -> Self {
        assert!(
            x + width <= self.width && y + height <= self.height,
            "crop rectangle exceeds image bounds"
        );

        let mut data = Vec::with_capacity(width * height);
        for row in y..y + height {
            let start = row * self.width + x;
            data.extend_from_slice(&self.data[start..start + width]);
        }

        PlanarImage {
            height,
            width,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_copies_the_sub_rectangle() {
        let data = (0..12).map(|i| i as f32).collect();
        let image = PlanarImage::new(3, 4, data);

        let patch = image.crop(1, 1, 2, 2);
        assert_eq!(patch.dimensions(), (2, 2));
        assert_eq!(patch.pixels(), &[5.0, 6.0, 9.0, 10.0]);
    }

    #[test]
    #[should_panic(expected = "crop rectangle exceeds image bounds")]
    fn crop_panics_outside_the_image() {
        let image = PlanarImage::zeros(4, 4);
        let _ = image.crop(2, 2, 3, 3);
    }
}
