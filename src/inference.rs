use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::infer::Detector;
use crate::models::{select_best_model, ModelSelection};
#[cfg(feature = "onnx")]
use crate::infer::yolo::YoloDetector;
#[cfg(feature = "onnx")]
use ort::session::Session;

/// The process wide detector, loaded once at startup and shared read-only
/// by every request worker.
pub struct InferenceContext {
    pub selected_model: Option<ModelSelection>,
    pub detector: Option<Arc<dyn Detector>>,
}

impl InferenceContext {
    pub fn load(models_dir: impl AsRef<Path>) -> Self {
        let selected = select_best_model(models_dir);
        if selected.is_none() {
            warn!("event" = "models.missing", "message" = "no trash detection model found in models directory");
        }
        info!("event" = "models.selected", has_detection = selected.is_some());

        #[cfg(feature = "onnx")]
        let detector = selected.as_ref().and_then(build_yolo);
        #[cfg(not(feature = "onnx"))]
        let detector: Option<Arc<dyn Detector>> = None;

        if detector.is_none() {
            warn!("event" = "detector.unavailable", "message" = "analyses will return empty results");
        }
        InferenceContext { selected_model: selected, detector }
    }

    pub fn with_detector(detector: Arc<dyn Detector>) -> Self {
        InferenceContext { selected_model: None, detector: Some(detector) }
    }

    pub fn empty() -> Self {
        InferenceContext { selected_model: None, detector: None }
    }
}

#[cfg(feature = "onnx")]
fn build_yolo(sel: &ModelSelection) -> Option<Arc<dyn Detector>> {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProviderDispatch};

    let _ = ort::init().with_name("trashscan").commit();
    let session = (|| {
        let builder = Session::builder().ok()?;
        let builder = builder.with_intra_threads(1).ok()?;
        let cuda = CUDAExecutionProvider::default();
        let providers: [ExecutionProviderDispatch; 1] = [cuda.into()];
        let builder = builder.with_execution_providers(providers).ok()?;
        builder.commit_from_file(&sel.path).ok()
    })();
    let Some(session) = session else {
        warn!("event" = "onnx.session.fail", "model" = %sel.path);
        return None;
    };
    info!("event" = "onnx.session.ok", "model" = %sel.path);

    // Expecting [N, C, H, W]
    let (mut in_w, mut in_h) = (640usize, 640usize);
    let mut mean: Option<[f32; 3]> = None;
    let mut stdv: Option<[f32; 3]> = None;
    if let Some(spec) = sel.metadata.inputs.first() {
        if spec.shape.len() >= 4 {
            in_h = spec.shape[2].max(1) as usize;
            in_w = spec.shape[3].max(1) as usize;
        }
        if let Some(m) = &spec.mean {
            if m.len() == 3 { mean = Some([m[0], m[1], m[2]]); }
        }
        if let Some(s) = &spec.std {
            if s.len() == 3 { stdv = Some([s[0], s[1], s[2]]); }
        }
    }
    let mut det = YoloDetector::new(session, in_w, in_h, sel.metadata.labels.clone());
    if let Some(m) = mean { det.mean = m; }
    if let Some(s) = stdv { det.std = s; }
    info!("event" = "yolo.ready", width = in_w, height = in_h, classes = det.labels.len());
    Some(Arc::new(det))
}
