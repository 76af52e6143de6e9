use crate::error::InferenceError;
use crate::infer::{Detector, RawDetection};
use image::{imageops::FilterType, Rgb, RgbImage};
use std::sync::Mutex;

use ndarray::{Array4, ArrayView2};
use ort::session::Session;
use ort::value::Tensor;

/// COCO class names (80 classes), the default label set for YOLOv8 weights.
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator",
    "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

const PAD_GRAY: u8 = 114;

/// YOLOv8 detector over an ONNX session.
///
/// An ONNX session run needs exclusive access, so calls are serialized on
/// the session mutex: one inference in flight per loaded model.
pub struct YoloDetector {
    pub session: Mutex<Session>,
    pub input_width: usize,
    pub input_height: usize,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub input_name: String,
    pub output_name: String,
    pub labels: Vec<String>,
}

/// Mapping from letterboxed model input back to the source image.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    ratio: f32,
    dx: f32,
    dy: f32,
    src_w: f32,
    src_h: f32,
}

impl YoloDetector {
    pub fn new(session: Session, input_width: usize, input_height: usize, labels: Option<Vec<String>>) -> Self {
        let input_name = session.inputs.first().map(|i| i.name.clone()).unwrap_or_else(|| "images".to_string());
        let output_name = session.outputs.first().map(|o| o.name.clone()).unwrap_or_else(|| "output0".to_string());
        let labels = labels.unwrap_or_else(|| COCO_CLASSES.iter().map(|s| s.to_string()).collect());
        Self {
            session: Mutex::new(session),
            input_width,
            input_height,
            mean: [0.0, 0.0, 0.0],
            std: [1.0, 1.0, 1.0],
            input_name,
            output_name,
            labels,
        }
    }

    fn letterbox(&self, image: &RgbImage) -> (Vec<f32>, Letterbox) {
        let (iw, ih) = (self.input_width as u32, self.input_height as u32);
        let (src_w, src_h) = image.dimensions();
        let ratio = (iw as f32 / src_w as f32).min(ih as f32 / src_h as f32);
        let new_w = ((src_w as f32 * ratio).round() as u32).clamp(1, iw);
        let new_h = ((src_h as f32 * ratio).round() as u32).clamp(1, ih);
        let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);
        let mut canvas = RgbImage::from_pixel(iw, ih, Rgb([PAD_GRAY; 3]));
        let dx = (iw - new_w) / 2;
        let dy = (ih - new_h) / 2;
        image::imageops::overlay(&mut canvas, &resized, dx.into(), dy.into());

        // HWC -> NCHW
        let mut tensor = Array4::<f32>::zeros((1, 3, ih as usize, iw as usize));
        for (x, y, p) in canvas.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = (p[c] as f32 / 255.0 - self.mean[c]) / self.std[c];
            }
        }
        let mapping = Letterbox {
            ratio,
            dx: dx as f32,
            dy: dy as f32,
            src_w: src_w as f32,
            src_h: src_h as f32,
        };
        (tensor.into_raw_vec(), mapping)
    }

    fn run(&self, input: Vec<f32>) -> Result<(Vec<i64>, Vec<f32>), InferenceError> {
        let shape = [1usize, 3, self.input_height, self.input_width];
        let input = Tensor::from_array((shape, input))?;
        let mut session = self
            .session
            .lock()
            .map_err(|_| InferenceError("session lock poisoned".to_string()))?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input])?;
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| InferenceError(format!("model has no output {}", self.output_name)))?;
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        Ok((shape.iter().copied().collect(), data.to_vec()))
    }

    fn label(&self, class: usize) -> String {
        self.labels.get(class).cloned().unwrap_or_else(|| format!("class_{class}"))
    }
}

/// Decodes a `[1, 4 + C, N]` or `[1, N, 4 + C]` YOLOv8 head into boxes in
/// letterboxed input coordinates, keeping the best class per anchor.
fn decode_head(
    shape: &[i64],
    data: &[f32],
    confidence_threshold: f32,
    label: impl Fn(usize) -> String,
) -> Result<Vec<RawDetection>, InferenceError> {
    if shape.len() != 3 || shape.iter().any(|&d| d <= 0) {
        return Err(InferenceError(format!("unexpected output shape {shape:?}")));
    }
    let (a, b) = (shape[1] as usize, shape[2] as usize);
    let view = ArrayView2::from_shape((a, b), data)
        .map_err(|e| InferenceError(format!("output does not match shape {shape:?}: {e}")))?;
    // anchors always outnumber features
    let rows = if a < b { view.reversed_axes() } else { view };
    if rows.ncols() < 5 {
        return Err(InferenceError(format!("too few output features in {shape:?}")));
    }

    let mut out = Vec::new();
    for row in rows.outer_iter() {
        let (class, score) = row
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |best, (i, s)| if s > best.1 { (i, s) } else { best });
        if score < confidence_threshold { continue; }
        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        if !(cx.is_finite() && cy.is_finite() && w > 0.0 && h > 0.0) { continue; }
        out.push(RawDetection {
            label: label(class),
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            score,
        });
    }
    Ok(out)
}

/// Confidence-first NMS, applied per label.
fn non_max_suppression(mut boxes: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    // ascending, so pop() yields the best remaining score
    boxes.sort_by(|a, b| a.score.total_cmp(&b.score));
    let threshold = iou_threshold as f64;
    let mut selected: Vec<RawDetection> = Vec::new();
    while let Some(candidate) = boxes.pop() {
        let bbox = candidate.bbox();
        let keep = selected
            .iter()
            .filter(|s| s.label == candidate.label)
            .all(|s| bbox.iou(&s.bbox()) <= threshold);
        if keep { selected.push(candidate); }
    }
    selected
}

fn unletterbox(mut b: RawDetection, m: Letterbox) -> RawDetection {
    b.x1 = ((b.x1 - m.dx) / m.ratio).clamp(0.0, m.src_w);
    b.y1 = ((b.y1 - m.dy) / m.ratio).clamp(0.0, m.src_h);
    b.x2 = ((b.x2 - m.dx) / m.ratio).clamp(0.0, m.src_w);
    b.y2 = ((b.y2 - m.dy) / m.ratio).clamp(0.0, m.src_h);
    b
}

impl Detector for YoloDetector {
    fn detect(
        &self,
        image: &RgbImage,
        confidence_threshold: f32,
        overlap_threshold: f32,
    ) -> Result<Vec<RawDetection>, InferenceError> {
        let (input, mapping) = self.letterbox(image);
        let (shape, data) = self.run(input)?;
        let boxes = decode_head(&shape, &data, confidence_threshold, |c| self.label(c))?;
        let boxes = non_max_suppression(boxes, overlap_threshold);
        Ok(boxes
            .into_iter()
            .map(|b| unletterbox(b, mapping))
            .filter(|b| b.x2 > b.x1 && b.y2 > b.y1)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(c: usize) -> String {
        COCO_CLASSES[c].to_string()
    }

    #[test]
    fn decodes_feature_major_head() {
        // [1, 4 + 2 classes, 8 anchors]; only the first three score
        let rows: [[f32; 3]; 6] = [
            [100.0, 10.0, 50.0],  // cx
            [100.0, 10.0, 50.0],  // cy
            [20.0, 4.0, 10.0],    // w
            [40.0, 4.0, 10.0],    // h
            [0.9, 0.05, 0.1],     // class 0
            [0.1, 0.1, 0.6],      // class 1
        ];
        let data: Vec<f32> = rows
            .iter()
            .flat_map(|r| r.iter().copied().chain(std::iter::repeat(0.0).take(5)))
            .collect();
        let out = decode_head(&[1, 6, 8], &data, 0.15, name).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].label, "person");
        assert_eq!((out[0].x1, out[0].y1, out[0].x2, out[0].y2), (90.0, 80.0, 110.0, 120.0));
        assert_eq!(out[1].label, "bicycle");
        assert_eq!(out[1].score, 0.6);
    }

    #[test]
    fn decodes_anchor_major_head() {
        // [1, 8 anchors, 4 + 2 classes]
        let anchor = [100.0, 100.0, 20.0, 40.0, 0.9, 0.1];
        let data: Vec<f32> = (0..8).flat_map(|_| anchor).collect();
        let out = decode_head(&[1, 8, 6], &data, 0.5, name).unwrap();
        assert_eq!(out.len(), 8);
        assert!(out.iter().all(|d| d.label == "person" && d.x1 == 90.0 && d.y2 == 120.0));
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(decode_head(&[1, 6], &[0.0; 6], 0.1, name).is_err());
        assert!(decode_head(&[1, 6, 4], &[0.0; 6], 0.1, name).is_err());
    }

    fn raw(label: &str, x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> RawDetection {
        RawDetection { label: label.to_string(), x1, y1, x2, y2, score }
    }

    #[test]
    fn nms_keeps_highest_score_of_overlapping_pair() {
        let boxes = vec![
            raw("bottle", 0.0, 0.0, 10.0, 10.0, 0.4),
            raw("bottle", 1.0, 1.0, 10.0, 10.0, 0.9),
        ];
        let kept = non_max_suppression(boxes, 0.3);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].score, 0.9);
    }

    #[test]
    fn nms_does_not_suppress_across_labels() {
        let boxes = vec![
            raw("bottle", 0.0, 0.0, 10.0, 10.0, 0.4),
            raw("cup", 0.0, 0.0, 10.0, 10.0, 0.9),
        ];
        assert_eq!(non_max_suppression(boxes, 0.3).len(), 2);
    }

    #[test]
    fn unletterbox_maps_to_source_and_clamps() {
        let m = Letterbox { ratio: 0.5, dx: 0.0, dy: 80.0, src_w: 1280.0, src_h: 960.0 };
        let b = RawDetection { label: "cup".into(), x1: 10.0, y1: 90.0, x2: 700.0, y2: 200.0, score: 0.5 };
        let out = unletterbox(b, m);
        assert_eq!((out.x1, out.y1, out.x2, out.y2), (20.0, 20.0, 1280.0, 240.0));
    }
}
