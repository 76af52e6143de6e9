use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::annotate::{annotate, jpeg_data_uri, AnnotationStyle};
use crate::detection::Detection;
use crate::error::AnalysisError;
use crate::estimate::{estimate, CleanupEstimate, ItemCountBasis};
use crate::inference::InferenceContext;
use crate::reconcile::reconcile;
use crate::scaled::run_scaled_inference;

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub trash_items: Vec<Detection>,
    pub cleanup_estimate: CleanupEstimate,
    /// JPEG data URI; `None` when the pipeline failed.
    pub annotated_image: Option<String>,
}

/// Decode, detect at every scale, reconcile, annotate and estimate.
pub struct Analyzer {
    inference: Arc<InferenceContext>,
    scales: Vec<f64>,
    style: AnnotationStyle,
    basis: ItemCountBasis,
}

impl Analyzer {
    pub fn new(
        inference: Arc<InferenceContext>,
        scales: Vec<f64>,
        style: AnnotationStyle,
        basis: ItemCountBasis,
    ) -> Self {
        Self { inference, scales, style, basis }
    }

    pub fn inference(&self) -> &InferenceContext {
        &self.inference
    }

    /// Never fails: decode, inference and encode errors are logged and
    /// reported as an image with nothing found.
    pub fn analyze(&self, image_bytes: &[u8]) -> Analysis {
        match self.try_analyze(image_bytes) {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!("event" = "analyze.degraded", error = %err);
                Analysis {
                    trash_items: Vec::new(),
                    cleanup_estimate: estimate(&[], 0, self.basis),
                    annotated_image: None,
                }
            }
        }
    }

    pub fn try_analyze(&self, image_bytes: &[u8]) -> Result<Analysis, AnalysisError> {
        let mut image = image::load_from_memory(image_bytes)
            .map_err(AnalysisError::Decoding)?
            .to_rgb8();
        let detector = self.inference.detector.as_deref().ok_or(AnalysisError::NoDetector)?;

        let raw = run_scaled_inference(detector, &image, &self.scales)?;
        let multi_scale_count = raw.len();
        let reconciled = reconcile(raw);
        let jpeg = annotate(&mut image, &reconciled, &self.style)?;
        let cleanup_estimate = estimate(&reconciled, multi_scale_count, self.basis);

        info!(
            "event" = "analyze.done",
            width = image.width(),
            height = image.height(),
            raw = multi_scale_count,
            kept = reconciled.len(),
            people = cleanup_estimate.people_needed,
            hours = cleanup_estimate.hours_needed,
        );
        Ok(Analysis {
            trash_items: reconciled,
            cleanup_estimate,
            annotated_image: Some(jpeg_data_uri(&jpeg)),
        })
    }
}
