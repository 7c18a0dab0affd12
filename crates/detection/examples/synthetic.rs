//! Runs the full detection pipeline against a synthetic network.
//!
//! The "network" here classifies a region as an object whenever it contains
//! a bright pixel, which is enough to watch proposals flow through
//! filtering, suppression, and classification without loading a real model.

use detection::{Bbox, DetectOptions, Detector, DetectorConfig, HeuristicSource, Xywh};
use miette::Result;
use ml::{
    ClassDeltas, ClassScores, DetectionImage, Evaluator, ExecutionHints, PlanarImage, Region,
};
use ndarray::Array2;

struct BrightPixelNet;

impl Evaluator<PlanarImage> for BrightPixelNet {
    fn rpn_forward(
        &self,
        _image: &PlanarImage,
    ) -> ml::Result<(ml::ScoreMap, ml::RegressionMap)> {
        unreachable!("this example proposes through a heuristic")
    }

    fn classify(
        &self,
        image: &PlanarImage,
        regions: &[Region],
        _hints: &ExecutionHints,
    ) -> ml::Result<(ClassScores, ClassDeltas)> {
        let (height, width) = image.dimensions();
        let pixels = image.pixels();

        let mut scores = Array2::zeros((regions.len(), 2));
        for (i, &[x, y, w, h]) in regions.iter().enumerate() {
            let x2 = ((x + w) as usize).min(width);
            let y2 = ((y + h) as usize).min(height);
            let bright = (y as usize..y2)
                .any(|row| (x as usize..x2).any(|col| pixels[row * width + col] > 0.9));

            scores[[i, if bright { 0 } else { 1 }]] = 6.0;
        }

        Ok((
            ClassScores::new(scores, 1, regions.len())?,
            ClassDeltas::new(Array2::zeros((regions.len(), 4)), 1, regions.len())?,
        ))
    }
}

/// Slide a coarse window over the image and score it by peak brightness.
fn sliding_windows(image: &PlanarImage) -> miette::Result<(Vec<Bbox<Xywh>>, Vec<f32>)> {
    let (height, width) = image.dimensions();
    let pixels = image.pixels();

    let mut boxes = Vec::new();
    let mut scores = Vec::new();
    for y in (0..height.saturating_sub(32)).step_by(16) {
        for x in (0..width.saturating_sub(32)).step_by(16) {
            let peak = (y..y + 32)
                .flat_map(|row| (x..x + 32).map(move |col| pixels[row * width + col]))
                .fold(0.0_f32, f32::max);

            boxes.push(Bbox::xywh(x as f32, y as f32, 32.0, 32.0));
            scores.push(peak);
        }
    }

    Ok((boxes, scores))
}

fn main() -> Result<()> {
    // a dark image with one bright square
    let mut data = vec![0.1; 128 * 128];
    for row in 48..72 {
        for col in 64..88 {
            data[row * 128 + col] = 1.0;
        }
    }
    let image = PlanarImage::new(128, 128, data);

    let config = DetectorConfig::with_classes(vec!["bright-square".into()]);
    let source = HeuristicSource::new(sliding_windows);
    let mut detector = Detector::new(config, BrightPixelNet, source)?;

    let detections = detector.detect(&image, None, &DetectOptions::default())?;

    println!("{} detection(s)", detections.len());
    for detection in detections {
        println!(
            "  {} at {:?} (score {:.3})",
            detector.class_name(detection.label),
            detection.bbox.inner,
            detection.score,
        );
    }

    Ok(())
}
