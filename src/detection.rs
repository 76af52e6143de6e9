use serde::Serialize;

use crate::infer::RawDetection;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn area(&self) -> f64 {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }

    /// Intersection over union. Boxes whose intersection has no positive
    /// width or height score 0, as does a degenerate union.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let w = self.x2.min(other.x2) - self.x1.max(other.x1);
        let h = self.y2.min(other.y2) - self.y1.max(other.y1);
        if w <= 0.0 || h <= 0.0 {
            return 0.0;
        }
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }
}

/// A detected item in original-image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    #[serde(rename = "name")]
    pub label: String,
    /// Percent, `[0, 100]`.
    pub confidence: f64,
    pub bbox: BoundingBox,
    pub area: f64,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f64, bbox: BoundingBox) -> Self {
        Self { label: label.into(), confidence, area: bbox.area(), bbox }
    }

    /// Projects a detector box found on an image resized by `scale` back
    /// onto the original image.
    pub fn from_scaled(raw: &RawDetection, scale: f64) -> Self {
        let b = raw.bbox();
        let bbox = if scale == 1.0 {
            b
        } else {
            BoundingBox { x1: b.x1 / scale, y1: b.y1 / scale, x2: b.x2 / scale, y2: b.y2 / scale }
        };
        Self::new(raw.label.clone(), raw.score as f64 * 100.0, bbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x1: f64, y1: f64, x2: f64, y2: f64) -> BoundingBox {
        BoundingBox { x1, y1, x2, y2 }
    }

    #[test]
    fn iou_of_half_overlapping_squares() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(5.0, 0.0, 15.0, 10.0);
        // 50 / (100 + 100 - 50)
        assert_eq!(a.iou(&b), 50.0 / 150.0);
        assert_eq!(b.iou(&a), a.iou(&b));
    }

    #[test]
    fn iou_of_contained_box() {
        let outer = bbox(0.0, 0.0, 10.0, 10.0);
        let inner = bbox(2.0, 2.0, 7.0, 7.0);
        assert_eq!(outer.iou(&inner), 25.0 / 100.0);
    }

    #[test]
    fn touching_and_disjoint_boxes_score_zero() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        assert_eq!(a.iou(&bbox(10.0, 0.0, 20.0, 10.0)), 0.0);
        assert_eq!(a.iou(&bbox(30.0, 30.0, 40.0, 40.0)), 0.0);
    }

    #[test]
    fn degenerate_boxes_score_zero() {
        let line = bbox(5.0, 0.0, 5.0, 10.0);
        assert_eq!(line.iou(&line), 0.0);
        assert_eq!(line.iou(&bbox(0.0, 0.0, 10.0, 10.0)), 0.0);
    }

    #[test]
    fn scaled_detection_maps_back_to_original_space() {
        let raw = RawDetection { label: "cup".into(), x1: 40.0, y1: 80.0, x2: 120.0, y2: 160.0, score: 0.5 };
        let det = Detection::from_scaled(&raw, 0.8);
        assert_eq!(det.bbox, bbox(50.0, 100.0, 150.0, 200.0));
        assert_eq!(det.area, 100.0 * 100.0);
        assert_eq!(det.confidence, 50.0);

        let det = Detection::from_scaled(&raw, 1.2);
        assert_eq!(det.bbox, bbox(40.0 / 1.2, 80.0 / 1.2, 120.0 / 1.2, 160.0 / 1.2));
    }

    #[test]
    fn rescale_round_trips_raw_coordinates() {
        let raw = RawDetection { label: "bottle".into(), x1: 13.0, y1: 27.5, x2: 301.25, y2: 99.0, score: 0.9 };
        for s in [0.5, 0.8, 1.2, 2.0] {
            let det = Detection::from_scaled(&raw, s);
            assert!((det.bbox.x1 * s - raw.x1 as f64).abs() < 1e-9);
            assert!((det.bbox.y1 * s - raw.y1 as f64).abs() < 1e-9);
            assert!((det.bbox.x2 * s - raw.x2 as f64).abs() < 1e-9);
            assert!((det.bbox.y2 * s - raw.y2 as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn serializes_label_as_name() {
        let det = Detection::new("bottle", 87.5, bbox(0.0, 0.0, 2.0, 3.0));
        let json = serde_json::to_value(&det).unwrap();
        assert_eq!(json["name"], "bottle");
        assert_eq!(json["area"], 6.0);
        assert_eq!(json["bbox"]["x2"], 2.0);
    }
}
