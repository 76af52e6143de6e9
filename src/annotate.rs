use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{info, warn};

use crate::detection::Detection;
use crate::error::AnalysisError;

const MAX_STROKE: f64 = 4.0;
const LABEL_PADDING: i32 = 10;
const LABEL_BASELINE_GAP: i32 = 5;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
/// Glyph box used to size label backgrounds when no font is available.
const FALLBACK_GLYPH: (u32, u32) = (10, 13);

#[derive(Clone)]
pub struct AnnotationStyle {
    pub font: Option<FontArc>,
    pub font_scale: PxScale,
    pub jpeg_quality: u8,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self { font: None, font_scale: PxScale::from(18.0), jpeg_quality: 95 }
    }
}

impl AnnotationStyle {
    /// Builds the style, loading the label font if one is configured.
    /// A missing or unreadable font only disables label text.
    pub fn load(font_path: Option<&Path>, jpeg_quality: u8) -> Self {
        let font = font_path.and_then(|path| {
            let font = std::fs::read(path)
                .ok()
                .and_then(|bytes| FontArc::try_from_vec(bytes).ok());
            match &font {
                Some(_) => info!("event" = "font.loaded", path = %path.display()),
                None => warn!("event" = "font.fail", path = %path.display()),
            }
            font
        });
        Self { font, jpeg_quality, ..Self::default() }
    }

    fn label_size(&self, label: &str) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(self.font_scale, font, label),
            None => (FALLBACK_GLYPH.0 * label.chars().count() as u32, FALLBACK_GLYPH.1),
        }
    }
}

/// Red at 0% confidence, green at 100%.
pub fn confidence_color(confidence: f64) -> Rgb<u8> {
    let c = (confidence / 100.0).clamp(0.0, 1.0);
    Rgb([(255.0 * (1.0 - c)) as u8, (255.0 * c) as u8, 0])
}

pub fn stroke_width(confidence: f64) -> u32 {
    let c = (confidence / 100.0).clamp(0.0, 1.0);
    ((c * MAX_STROKE) as u32).max(1)
}

/// Draws every detection onto `image` and returns it JPEG encoded.
pub fn annotate(
    image: &mut RgbImage,
    detections: &[Detection],
    style: &AnnotationStyle,
) -> Result<Vec<u8>, AnalysisError> {
    draw_detections(image, detections, style);
    encode_jpeg(image, style.jpeg_quality)
}

pub fn draw_detections(image: &mut RgbImage, detections: &[Detection], style: &AnnotationStyle) {
    for det in detections {
        draw_detection(image, det, style);
    }
}

fn draw_detection(image: &mut RgbImage, det: &Detection, style: &AnnotationStyle) {
    let color = confidence_color(det.confidence);
    let (x1, y1) = (det.bbox.x1 as i32, det.bbox.y1 as i32);
    let (x2, y2) = (det.bbox.x2 as i32, det.bbox.y2 as i32);

    // strokes grow inward; both corners are inclusive
    for i in 0..stroke_width(det.confidence) as i32 {
        let w = x2 - x1 + 1 - 2 * i;
        let h = y2 - y1 + 1 - 2 * i;
        if w <= 0 || h <= 0 {
            break;
        }
        draw_hollow_rect_mut(image, Rect::at(x1 + i, y1 + i).of_size(w as u32, h as u32), color);
    }

    let (text_w, text_h) = style.label_size(&det.label);
    if text_w == 0 {
        return;
    }
    let top = y1 - text_h as i32 - LABEL_PADDING;
    let background = Rect::at(x1, top).of_size(text_w, text_h + LABEL_PADDING as u32);
    draw_filled_rect_mut(image, background, color);
    if let Some(font) = &style.font {
        let text_top = y1 - LABEL_BASELINE_GAP - text_h as i32;
        draw_text_mut(image, TEXT_COLOR, x1, text_top, style.font_scale, font, &det.label);
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, AnalysisError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(image)
        .map_err(AnalysisError::Encoding)?;
    Ok(buf)
}

pub fn jpeg_data_uri(bytes: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", base64::engine::general_purpose::STANDARD.encode(bytes))
}
