use crate::config::{HexColor, RenderConfig};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in source-image pixels, carried on the wire as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.x1, bbox.y1, bbox.x2, bbox.y2]
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_name: String,
    pub confidence: f32,
}

impl Detection {
    pub fn is_compliant(&self, compliant_label: &str) -> bool {
        self.class_name == compliant_label
    }

    pub fn label(&self) -> String {
        format!(
            "{} {:.0}%",
            self.class_name.replace('-', " "),
            self.confidence * 100.0
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DetectionSummary {
    pub total_persons: u32,
    pub wearing_hardhat: u32,
    pub missing_hardhat: u32,
    /// Percentage, 0 to 100.
    pub average_confidence: f64,
}

/// Everything the detection service reports for one image. Unknown fields in
/// the payload are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    pub summary: DetectionSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryCard {
    pub title: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub label: &'static str,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultView {
    pub cards: Vec<SummaryCard>,
    pub legend: Vec<LegendEntry>,
    pub detections: Vec<Detection>,
}

impl DetectionSummary {
    pub fn cards(&self) -> Vec<SummaryCard> {
        vec![
            SummaryCard {
                title: "Total Workers",
                value: self.total_persons.to_string(),
            },
            SummaryCard {
                title: "Compliant",
                value: self.wearing_hardhat.to_string(),
            },
            SummaryCard {
                title: "Violations",
                value: self.missing_hardhat.to_string(),
            },
            SummaryCard {
                title: "Average Confidence",
                value: format!("{}%", format_number(self.average_confidence)),
            },
        ]
    }
}

impl ResultView {
    pub fn new(result: &DetectionResult, render: &RenderConfig) -> Self {
        Self {
            cards: result.summary.cards(),
            legend: legend(render.violation_color, render.compliant_color),
            detections: result.detections.clone(),
        }
    }
}

fn legend(violation: HexColor, compliant: HexColor) -> Vec<LegendEntry> {
    vec![
        LegendEntry {
            label: "No Hard Hat",
            color: violation.to_hex(),
        },
        LegendEntry {
            label: "Helmet",
            color: compliant.to_hex(),
        },
    ]
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        value.to_string()
    }
}
