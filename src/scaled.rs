use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::debug;

use crate::detection::Detection;
use crate::error::AnalysisError;
use crate::infer::Detector;

/// Low on purpose: small items only survive at some scales.
pub const CONFIDENCE_THRESHOLD: f32 = 0.15;
/// Overlap threshold handed to the detector's own NMS.
pub const OVERLAP_THRESHOLD: f32 = 0.3;

/// Runs `detector` once per scale and returns every detection, projected
/// back onto `image`'s pixel grid, in scale order.
pub fn run_scaled_inference(
    detector: &dyn Detector,
    image: &RgbImage,
    scales: &[f64],
) -> Result<Vec<Detection>, AnalysisError> {
    let mut all = Vec::new();
    for &scale in scales {
        let found = detect_at_scale(detector, image, scale)?;
        debug!("event" = "scale.done", scale, detections = found.len());
        all.extend(found);
    }
    Ok(all)
}

fn detect_at_scale(
    detector: &dyn Detector,
    image: &RgbImage,
    scale: f64,
) -> Result<Vec<Detection>, AnalysisError> {
    let raw = if scale == 1.0 {
        detector.detect(image, CONFIDENCE_THRESHOLD, OVERLAP_THRESHOLD)?
    } else {
        let (w, h) = scaled_dimensions(image.width(), image.height(), scale);
        let resized = imageops::resize(image, w, h, FilterType::Triangle);
        detector.detect(&resized, CONFIDENCE_THRESHOLD, OVERLAP_THRESHOLD)?
    };
    Ok(raw.iter().map(|r| Detection::from_scaled(r, scale)).collect())
}

pub fn scaled_dimensions(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let w = ((width as f64 * scale) as u32).max(1);
    let h = ((height as f64 * scale) as u32).max(1);
    (w, h)
}
