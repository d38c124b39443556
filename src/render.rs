//! Result rendering.
//!
//! Pure functions from a `PredictionResult` to display rows and text. Rows
//! keep the order the backend returned; nothing is re-sorted.

use std::fmt::Write as _;

use serde::Serialize;

use crate::detect::{convert_to_hectare, Catalog, Detection, FertilizerRecord, PredictionResult};

pub const NO_DETECTIONS: &str = "No weeds detected in this image";

const HIGH_THRESHOLD: f64 = 90.0;
const MEDIUM_THRESHOLD: f64 = 75.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    /// Tier for a percent-scale confidence.
    pub fn for_percent(percent: f64) -> Self {
        if percent >= HIGH_THRESHOLD {
            ConfidenceTier::High
        } else if percent >= MEDIUM_THRESHOLD {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceTier::High => "High",
            ConfidenceTier::Medium => "Medium",
            ConfidenceTier::Low => "Low",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionRow {
    /// 1-based.
    pub index: usize,
    pub label: String,
    pub confidence_text: String,
    pub tier: ConfidenceTier,
    pub bbox_text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub highest_confidence: Option<f64>,
    pub average_confidence: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FertilizerRow {
    pub name: String,
    pub quantity_per_hectare: String,
    pub frequency: String,
    pub kind: Option<String>,
    /// Catalog product, if one matches the treatment name.
    pub product: Option<String>,
    pub price_inr: Option<u32>,
}

pub fn detection_rows(detections: &[Detection]) -> Vec<DetectionRow> {
    detections
        .iter()
        .enumerate()
        .map(|(i, detection)| {
            let percent = detection.confidence.percent();
            DetectionRow {
                index: i + 1,
                label: detection.label.clone(),
                confidence_text: format!("{percent:.1}%"),
                tier: ConfidenceTier::for_percent(percent),
                bbox_text: detection
                    .bbox
                    .map(|bbox| {
                        let coords: Vec<String> =
                            bbox.0.iter().map(|c| format!("{:.0}", c)).collect();
                        format!("[{}]", coords.join(", "))
                    })
                    .unwrap_or_else(|| "N/A".to_string()),
            }
        })
        .collect()
}

pub fn summarize(detections: &[Detection]) -> Summary {
    if detections.is_empty() {
        return Summary {
            total: 0,
            highest_confidence: None,
            average_confidence: None,
        };
    }
    let percents: Vec<f64> = detections.iter().map(|d| d.confidence.percent()).collect();
    let highest = percents.iter().copied().fold(f64::MIN, f64::max);
    let average = percents.iter().sum::<f64>() / percents.len() as f64;
    Summary {
        total: detections.len(),
        highest_confidence: Some(highest),
        average_confidence: Some((average * 10.0).round() / 10.0),
    }
}

pub fn render_detection_table(detections: &[Detection]) -> String {
    if detections.is_empty() {
        return NO_DETECTIONS.to_string();
    }
    let rows = detection_rows(detections);
    let with_bbox = detections.iter().any(|d| d.bbox.is_some());
    let label_width = rows
        .iter()
        .map(|row| row.label.chars().count())
        .max()
        .unwrap_or(0)
        .max("Label".len());

    let mut out = String::new();
    let _ = write!(out, "{:<4}{:<label_width$}  {:<11}{:<7}", "#", "Label", "Confidence", "Tier");
    if with_bbox {
        out.push_str(" Bounding Box");
    }
    out = out.trim_end().to_string();
    out.push('\n');
    for row in &rows {
        let mut line = format!(
            "{:<4}{:<label_width$}  {:<11}{:<7}",
            row.index,
            row.label,
            row.confidence_text,
            row.tier.as_str()
        );
        if with_bbox {
            line.push(' ');
            line.push_str(&row.bbox_text);
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }

    let summary = summarize(detections);
    let _ = write!(out, "Total detections: {}", summary.total);
    if let Some(highest) = summary.highest_confidence {
        let _ = write!(out, "    Highest confidence: {highest:.1}%");
    }
    out
}

pub fn fertilizer_rows(fertilizers: &[FertilizerRecord], catalog: &Catalog) -> Vec<FertilizerRow> {
    fertilizers
        .iter()
        .map(|record| {
            let product = catalog.best_match(&record.name);
            FertilizerRow {
                name: record.name.clone(),
                quantity_per_hectare: convert_to_hectare(&record.quantity),
                frequency: record.frequency.clone(),
                kind: record.kind.clone(),
                product: product.map(|p| p.name.clone()),
                price_inr: product.map(|p| p.price_inr),
            }
        })
        .collect()
}

/// `None` when there is nothing to recommend.
pub fn render_fertilizers(fertilizers: &[FertilizerRecord], catalog: &Catalog) -> Option<String> {
    if fertilizers.is_empty() {
        return None;
    }
    let mut out = String::from("Fertilizer recommendations\n");
    for (i, row) in fertilizer_rows(fertilizers, catalog).iter().enumerate() {
        let _ = write!(out, "{}. {}", i + 1, row.name);
        if let Some(kind) = &row.kind {
            let _ = write!(out, " ({kind})");
        }
        let _ = write!(
            out,
            "\n   Quantity: {}\n   Frequency: {}\n",
            row.quantity_per_hectare, row.frequency
        );
        if let (Some(product), Some(price)) = (&row.product, row.price_inr) {
            let _ = writeln!(out, "   Available: {product} at Rs {price}");
        }
    }
    Some(out.trim_end().to_string())
}

/// Full text report: detection table, then fertilizers when present.
pub fn render_report(result: &PredictionResult, catalog: &Catalog) -> String {
    let mut out = render_detection_table(&result.detections);
    if let Some(fertilizers) = render_fertilizers(&result.fertilizers, catalog) {
        out.push_str("\n\n");
        out.push_str(&fertilizers);
    }
    if !result.result_image_url.is_empty() {
        let _ = write!(out, "\n\nAnnotated image: {}", result.result_image_url);
    }
    out
}
