#[cfg(feature = "onnx")]
pub mod yolo;

use image::RgbImage;

use crate::detection::BoundingBox;
use crate::error::InferenceError;

/// Box as returned by a detector, in the coordinates of the image it was given.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub label: String,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Detector score in `[0, 1]`.
    pub score: f32,
}

impl RawDetection {
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox { x1: self.x1 as f64, y1: self.y1 as f64, x2: self.x2 as f64, y2: self.y2 as f64 }
    }
}

/// Object detection capability.
///
/// Implementations must be shareable across request workers. If the
/// underlying engine is not reentrant the implementation serializes calls
/// itself, as the ONNX detector does.
pub trait Detector: Send + Sync {
    fn detect(
        &self,
        image: &RgbImage,
        confidence_threshold: f32,
        overlap_threshold: f32,
    ) -> Result<Vec<RawDetection>, InferenceError>;
}
