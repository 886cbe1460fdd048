//! Annotated-image rendering.
//!
//! Output is a pure function of the decoded image, the detection result and
//! the style. Every call starts from a fresh copy of the decoded pixels.

use crate::config::{HexColor, RenderConfig};
use crate::detection::DetectionResult;
use crate::intake::StagedFile;
use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use std::{fmt, io::Cursor};
use thiserror::Error;

const LABEL_TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const LABEL_PADDING: i32 = 6;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to decode image: {0}")]
    Decode(image::ImageError),
    #[error("Failed to encode image: {0}")]
    Encode(image::ImageError),
    #[error("Failed to read label font: {0}")]
    FontIo(#[from] std::io::Error),
    #[error("Invalid label font: {0}")]
    Font(String),
}

pub struct LabelStyle {
    font: FontVec,
    scale: PxScale,
}

impl fmt::Debug for LabelStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelStyle")
            .field("scale", &self.scale.y)
            .finish_non_exhaustive()
    }
}

impl LabelStyle {
    pub fn from_font_bytes(bytes: Vec<u8>, scale: f32) -> Result<Self, RenderError> {
        let font = FontVec::try_from_vec(bytes).map_err(|e| RenderError::Font(e.to_string()))?;
        Ok(Self {
            font,
            scale: PxScale::from(scale),
        })
    }
}

#[derive(Debug)]
pub struct RenderStyle {
    pub compliant_label: String,
    pub compliant_color: Rgba<u8>,
    pub violation_color: Rgba<u8>,
    pub stroke_width: u32,
    pub labels: Option<LabelStyle>,
}

fn to_rgba(color: HexColor) -> Rgba<u8> {
    let [r, g, b] = color.0;
    Rgba([r, g, b, 255])
}

impl RenderStyle {
    pub fn from_config(config: &RenderConfig) -> Result<Self, RenderError> {
        let labels = match &config.label_font_path {
            Some(path) => {
                let bytes = std::fs::read(path)?;
                tracing::info!("Label overlay enabled with font {:?}", path);
                Some(LabelStyle::from_font_bytes(bytes, config.label_scale)?)
            }
            None => None,
        };

        Ok(Self {
            compliant_label: config.compliant_label.clone(),
            compliant_color: to_rgba(config.compliant_color),
            violation_color: to_rgba(config.violation_color),
            stroke_width: config.stroke_width.max(1),
            labels,
        })
    }
}

impl Default for RenderStyle {
    fn default() -> Self {
        let config = RenderConfig::default();
        Self {
            compliant_label: config.compliant_label,
            compliant_color: to_rgba(config.compliant_color),
            violation_color: to_rgba(config.violation_color),
            stroke_width: config.stroke_width,
            labels: None,
        }
    }
}

/// One rectangle to stroke, in surface pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxOverlay {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub color: Rgba<u8>,
    pub label: Option<String>,
}

/// Maps detections onto a `surface` of (width, height) pixels. Coordinates are
/// clamped to a margin just past the surface edges, so boxes reaching far
/// outside stay finite and draw the same visible strokes.
pub fn plan_overlays(
    result: &DetectionResult,
    style: &RenderStyle,
    surface: (u32, u32),
) -> Vec<BoxOverlay> {
    let margin = style.stroke_width as f32 + 1.0;
    let max_x = surface.0 as f32 + margin;
    let max_y = surface.1 as f32 + margin;
    let to_px = |v: f32, max: f32| v.round().clamp(-margin, max) as i32;

    result
        .detections
        .iter()
        .map(|detection| {
            let bbox = &detection.bbox;
            let x = to_px(bbox.x1, max_x);
            let y = to_px(bbox.y1, max_y);
            let color = if detection.is_compliant(&style.compliant_label) {
                style.compliant_color
            } else {
                style.violation_color
            };
            BoxOverlay {
                x,
                y,
                width: to_px(bbox.x2, max_x) - x,
                height: to_px(bbox.y2, max_y) - y,
                color,
                label: style.labels.as_ref().map(|_| detection.label()),
            }
        })
        .collect()
}

pub fn decode(file: &StagedFile) -> Result<DynamicImage, RenderError> {
    let data = file.data();
    image::load_from_memory(data)
        .or_else(|_| image::load_from_memory_with_format(data, file.media_type().image_format()))
        .map_err(RenderError::Decode)
}

#[derive(Debug, Clone)]
pub struct AnnotatedImage {
    pub image: RgbaImage,
    pub overlays: Vec<BoxOverlay>,
}

impl AnnotatedImage {
    pub fn render(background: &DynamicImage, result: &DetectionResult, style: &RenderStyle) -> Self {
        // Surface takes the decoded dimensions so box coordinates map 1:1.
        let mut image = background.to_rgba8();
        let overlays = plan_overlays(result, style, image.dimensions());

        for overlay in &overlays {
            stroke_rect(&mut image, overlay, style.stroke_width);
        }
        if let Some(labels) = &style.labels {
            for overlay in &overlays {
                if let Some(text) = &overlay.label {
                    draw_label(&mut image, overlay, text, labels);
                }
            }
        }

        tracing::debug!(
            width = image.width(),
            height = image.height(),
            boxes = overlays.len(),
            "rendered annotated image"
        );

        Self { image, overlays }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn to_png(&self) -> Result<Vec<u8>, RenderError> {
        let mut buf = Cursor::new(Vec::new());
        self.image
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(RenderError::Encode)?;
        Ok(buf.into_inner())
    }
}

/// Strokes `overlay` with a line of `width` pixels centred on its edges.
fn stroke_rect(image: &mut RgbaImage, overlay: &BoxOverlay, width: u32) {
    let half = (width / 2) as i32;
    for offset in -half..(width as i32 - half) {
        let w = overlay.width - 2 * offset;
        let h = overlay.height - 2 * offset;
        if w <= 0 || h <= 0 {
            continue;
        }
        let rect = Rect::at(overlay.x + offset, overlay.y + offset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(image, rect, overlay.color);
    }
}

fn draw_label(image: &mut RgbaImage, overlay: &BoxOverlay, text: &str, style: &LabelStyle) {
    let (text_width, text_height) = text_size(style.scale, &style.font, text);
    let tab_height = text_height as i32 + 2 * LABEL_PADDING;
    let tab = Rect::at(overlay.x, overlay.y - tab_height)
        .of_size(text_width + 2 * LABEL_PADDING as u32, tab_height as u32);

    draw_filled_rect_mut(image, tab, overlay.color);
    draw_text_mut(
        image,
        LABEL_TEXT_COLOR,
        overlay.x + LABEL_PADDING,
        overlay.y - tab_height + LABEL_PADDING,
        style.scale,
        &style.font,
        text,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntakeConfig;
    use crate::detection::{BoundingBox, Detection, DetectionSummary};
    use crate::intake::{CandidateFile, FileIntake};
    use bytes::Bytes;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const GREEN: Rgba<u8> = Rgba([0x22, 0xc5, 0x5e, 255]);
    const RED: Rgba<u8> = Rgba([0xef, 0x44, 0x44, 255]);

    fn white_png(width: u32, height: u32) -> Bytes {
        let image = RgbaImage::from_pixel(width, height, WHITE);
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        Bytes::from(buf.into_inner())
    }

    fn staged(data: Bytes, media_type: &str) -> StagedFile {
        let mut intake = FileIntake::new(IntakeConfig::default());
        intake
            .select_file(CandidateFile::new("site.png", media_type, data))
            .unwrap()
            .clone()
    }

    fn detection(bbox: [f32; 4], class_name: &str, confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox::from(bbox),
            class_name: class_name.into(),
            confidence,
        }
    }

    fn example_result() -> DetectionResult {
        DetectionResult {
            detections: vec![
                detection([10.0, 10.0, 50.0, 60.0], "Hardhat", 0.9),
                detection([60.0, 20.0, 100.0, 80.0], "NO-Hardhat", 0.8),
            ],
            summary: DetectionSummary {
                total_persons: 2,
                wearing_hardhat: 1,
                missing_hardhat: 1,
                average_confidence: 85.0,
            },
        }
    }

    #[test]
    fn test_example_result_draws_colored_boxes() {
        let file = staged(white_png(120, 100), "image/png");
        let background = decode(&file).unwrap();
        let annotated = AnnotatedImage::render(&background, &example_result(), &RenderStyle::default());

        assert_eq!((annotated.width(), annotated.height()), (120, 100));
        assert_eq!(annotated.overlays.len(), 2);
        assert_eq!(
            annotated.overlays[0],
            BoxOverlay {
                x: 10,
                y: 10,
                width: 40,
                height: 50,
                color: GREEN,
                label: None,
            }
        );
        assert_eq!(annotated.overlays[1].color, RED);

        let image = &annotated.image;
        // Edges of the compliant box.
        assert_eq!(*image.get_pixel(10, 10), GREEN);
        assert_eq!(*image.get_pixel(30, 10), GREEN);
        assert_eq!(*image.get_pixel(10, 35), GREEN);
        assert_eq!(*image.get_pixel(49, 35), GREEN);
        // Edges of the violation box.
        assert_eq!(*image.get_pixel(60, 50), RED);
        assert_eq!(*image.get_pixel(80, 79), RED);
        // Interiors stay unfilled.
        assert_eq!(*image.get_pixel(30, 35), WHITE);
        assert_eq!(*image.get_pixel(80, 50), WHITE);
        assert_eq!(*image.get_pixel(115, 95), WHITE);
    }

    #[test]
    fn test_one_overlay_per_detection_colored_by_label_only() {
        let result = DetectionResult {
            detections: vec![
                detection([0.0, 0.0, 5.0, 5.0], "Hardhat", 0.1),
                detection([1.0, 1.0, 6.0, 6.0], "hardhat", 0.99),
                detection([2.0, 2.0, 7.0, 7.0], "Person", 0.5),
                detection([3.0, 3.0, 8.0, 8.0], "Hardhat", 1.0),
            ],
            summary: example_result().summary,
        };
        let style = RenderStyle::default();
        let overlays = plan_overlays(&result, &style, (100, 100));

        assert_eq!(overlays.len(), 4);
        let colors: Vec<_> = overlays.iter().map(|o| o.color).collect();
        assert_eq!(colors, vec![GREEN, RED, RED, GREEN]);
        assert!(overlays.iter().all(|o| o.label.is_none()));
    }

    #[test]
    fn test_rerender_does_not_keep_previous_boxes() {
        let file = staged(white_png(120, 100), "image/png");
        let background = decode(&file).unwrap();
        let style = RenderStyle::default();

        let first = AnnotatedImage::render(&background, &example_result(), &style);
        assert_eq!(*first.image.get_pixel(10, 10), GREEN);

        let next = DetectionResult {
            detections: vec![detection([70.0, 5.0, 110.0, 40.0], "Hardhat", 0.7)],
            summary: example_result().summary,
        };
        let second = AnnotatedImage::render(&background, &next, &style);

        assert_eq!(second.overlays.len(), 1);
        assert_eq!(*second.image.get_pixel(10, 10), WHITE);
        assert_eq!(*second.image.get_pixel(60, 50), WHITE);
        assert_eq!(*second.image.get_pixel(70, 20), GREEN);
    }

    #[test]
    fn test_surface_uses_decoded_dimensions() {
        // Declared as JPEG, actually PNG: decoding follows the bytes.
        let file = staged(white_png(33, 17), "image/jpeg");
        let background = decode(&file).unwrap();
        let empty = DetectionResult {
            detections: vec![],
            summary: example_result().summary,
        };
        let annotated = AnnotatedImage::render(&background, &empty, &RenderStyle::default());
        assert_eq!((annotated.width(), annotated.height()), (33, 17));
        assert!(annotated.image.pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn test_decode_error_on_corrupt_bytes() {
        let file = staged(Bytes::from_static(b"definitely not an image"), "image/png");
        assert!(matches!(decode(&file), Err(RenderError::Decode(_))));
    }

    #[test]
    fn test_boxes_outside_surface_are_clipped() {
        let file = staged(white_png(20, 20), "image/png");
        let background = decode(&file).unwrap();
        let result = DetectionResult {
            detections: vec![detection([-10.0, -10.0, 500.0, 500.0], "Hardhat", 0.5)],
            summary: example_result().summary,
        };
        let annotated = AnnotatedImage::render(&background, &result, &RenderStyle::default());
        assert_eq!((annotated.width(), annotated.height()), (20, 20));
        assert_eq!(*annotated.image.get_pixel(10, 10), WHITE);
    }

    #[test]
    fn test_extreme_coordinates_are_clamped_to_surface() {
        let file = staged(white_png(20, 20), "image/png");
        let background = decode(&file).unwrap();
        let result = DetectionResult {
            detections: vec![
                detection([-3e9, 5.0, 3e9, 15.0], "Hardhat", 0.5),
                detection([5.0, -1e12, 15.0, 1e12], "NO-Hardhat", 0.5),
                detection([f32::MIN, f32::MIN, f32::MAX, f32::MAX], "Hardhat", 0.5),
            ],
            summary: example_result().summary,
        };
        let style = RenderStyle::default();

        let overlays = plan_overlays(&result, &style, (20, 20));
        assert_eq!((overlays[0].x, overlays[0].width), (-5, 30));
        assert_eq!((overlays[1].y, overlays[1].height), (-5, 30));

        let annotated = AnnotatedImage::render(&background, &result, &style);
        assert_eq!((annotated.width(), annotated.height()), (20, 20));
        // Horizontal edges of the first box stay on their rows.
        assert_eq!(*annotated.image.get_pixel(10, 5), GREEN);
        // Vertical edges of the second box stay on their columns.
        assert_eq!(*annotated.image.get_pixel(15, 10), RED);
    }

    #[test]
    fn test_png_output_round_trips_dimensions() {
        let file = staged(white_png(40, 30), "image/png");
        let background = decode(&file).unwrap();
        let annotated = AnnotatedImage::render(&background, &example_result(), &RenderStyle::default());
        let png = annotated.to_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }

    #[test]
    fn test_style_without_font_has_no_labels() {
        let style = RenderStyle::from_config(&RenderConfig::default()).unwrap();
        assert!(style.labels.is_none());
        assert_eq!(style.compliant_label, "Hardhat");
        assert_eq!(style.stroke_width, 4);
    }

    #[test]
    fn test_invalid_font_bytes_rejected() {
        assert!(matches!(
            LabelStyle::from_font_bytes(vec![0, 1, 2, 3], 18.0),
            Err(RenderError::Font(_))
        ));
    }
}
