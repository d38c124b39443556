use serde::{Deserialize, Serialize};

use super::fertilizer::{dedup_treatments, FertilizerRecord};

/// Detection confidence on the canonical percent scale (`0.0..=100.0`).
///
/// Backends disagree on scale: some send `93.4`, some send `0.934`.
/// Conversion happens once, in [`Confidence::from_wire`]; everything past the
/// wire boundary sees percent.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    pub fn from_percent(percent: f64) -> Self {
        if percent.is_nan() {
            return Self(0.0);
        }
        Self(percent.clamp(0.0, 100.0))
    }

    /// Values in `0.0..=1.0` are fractions and get scaled; anything larger is
    /// already a percentage.
    pub fn from_wire(raw: f64) -> Self {
        if raw.is_nan() {
            return Self(0.0);
        }
        if raw <= 1.0 {
            Self::from_percent(raw * 100.0)
        } else {
            Self::from_percent(raw)
        }
    }

    pub fn percent(self) -> f64 {
        self.0
    }

    pub fn fraction(self) -> f64 {
        self.0 / 100.0
    }
}

/// Pixel-space box `[x1, y1, x2, y2]` in source image coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox(pub [f32; 4]);

impl BoundingBox {
    pub fn x1(&self) -> f32 {
        self.0[0]
    }

    pub fn y1(&self) -> f32 {
        self.0[1]
    }

    pub fn x2(&self) -> f32 {
        self.0[2]
    }

    pub fn y2(&self) -> f32 {
        self.0[3]
    }

    pub fn width(&self) -> f32 {
        (self.x2() - self.x1()).abs()
    }

    pub fn height(&self) -> f32 {
        (self.y2() - self.y1()).abs()
    }
}

/// Treatment recommended by the backend for one detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    pub name: String,
    pub quantity: String,
    pub frequency: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// One recognized weed instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment: Option<Treatment>,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: Confidence) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox: None,
            treatment: None,
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_treatment(mut self, treatment: Treatment) -> Self {
        self.treatment = Some(treatment);
        self
    }
}

/// Outcome of one successful submission.
///
/// `fertilizers` is derived from `detections` at construction and never
/// edited independently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub detections: Vec<Detection>,
    pub result_image_url: String,
    pub original_image_url: String,
    pub fertilizers: Vec<FertilizerRecord>,
}

impl PredictionResult {
    pub fn new(
        detections: Vec<Detection>,
        result_image_url: impl Into<String>,
        original_image_url: impl Into<String>,
    ) -> Self {
        let fertilizers = dedup_treatments(&detections);
        Self {
            detections,
            result_image_url: result_image_url.into(),
            original_image_url: original_image_url.into(),
            fertilizers,
        }
    }

    pub fn from_wire(wire: WirePrediction) -> Self {
        let detections = wire
            .detections
            .into_iter()
            .map(WireDetection::into_detection)
            .collect();
        Self::new(detections, wire.result_image_url, wire.original_image_url)
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Detection record as the backend sends it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WireDetection {
    pub label: String,
    pub confidence: f64,
    #[serde(default)]
    pub bbox: Option<[f32; 4]>,
    #[serde(default)]
    pub fertilizer: Option<String>,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl WireDetection {
    pub fn into_detection(self) -> Detection {
        let treatment = match self.fertilizer {
            Some(name) if !name.trim().is_empty() => Some(Treatment {
                name: name.trim().to_string(),
                quantity: self.quantity.unwrap_or_else(|| "N/A".to_string()),
                frequency: self.frequency.unwrap_or_else(|| "N/A".to_string()),
                kind: self.kind.filter(|kind| !kind.trim().is_empty()),
            }),
            _ => None,
        };
        Detection {
            label: self.label,
            confidence: Confidence::from_wire(self.confidence),
            bbox: self.bbox.map(BoundingBox),
            treatment,
        }
    }
}

/// Success body of `POST /predict`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WirePrediction {
    pub detections: Vec<WireDetection>,
    #[serde(default)]
    pub result_image_url: String,
    #[serde(default)]
    pub original_image_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKEND_RESPONSE: &str = r#"{
        "detections": [
            {
                "label": "Parthenium",
                "confidence": 93.41,
                "bbox": [12.4, 40.0, 220.9, 301.2],
                "fertilizer": "Glyphosate 41% SL",
                "quantity": "1 L per acre",
                "frequency": "Once before sowing"
            },
            {
                "label": "Cynodon",
                "confidence": 0.71,
                "fertilizer": "Not found",
                "quantity": "N/A",
                "frequency": "N/A"
            },
            { "label": "Amaranthus", "confidence": 80 }
        ],
        "result_image_url": "http://localhost:5000/result/result_field.jpg",
        "original_image_url": "http://localhost:5000/uploads/field.jpg"
    }"#;

    #[test]
    fn parses_backend_response_into_canonical_result() {
        let wire: WirePrediction = serde_json::from_str(BACKEND_RESPONSE).unwrap();
        let result = PredictionResult::from_wire(wire);

        assert_eq!(result.detections.len(), 3);
        assert_eq!(result.detections[0].label, "Parthenium");
        assert!((result.detections[0].confidence.percent() - 93.41).abs() < 1e-9);
        assert_eq!(
            result.detections[0].bbox,
            Some(BoundingBox([12.4, 40.0, 220.9, 301.2]))
        );
        assert!((result.detections[1].confidence.percent() - 71.0).abs() < 1e-9);
        assert!(result.detections[2].treatment.is_none());
        assert_eq!(result.fertilizers.len(), 2);
        assert_eq!(
            result.result_image_url,
            "http://localhost:5000/result/result_field.jpg"
        );
    }

    #[test]
    fn fraction_and_percent_scales_agree() {
        assert_eq!(Confidence::from_wire(0.5), Confidence::from_wire(50.0));
        assert_eq!(Confidence::from_wire(1.0).percent(), 100.0);
        assert_eq!(Confidence::from_wire(250.0).percent(), 100.0);
        assert_eq!(Confidence::from_wire(-3.0).percent(), 0.0);
        assert_eq!(Confidence::from_wire(f64::NAN).percent(), 0.0);
    }

    #[test]
    fn blank_fertilizer_means_no_treatment() {
        let wire = WireDetection {
            label: "Cyperus".to_string(),
            confidence: 88.0,
            bbox: None,
            fertilizer: Some("   ".to_string()),
            quantity: Some("2 kg per acre".to_string()),
            frequency: None,
            kind: None,
        };
        assert!(wire.into_detection().treatment.is_none());
    }

    #[test]
    fn missing_detections_field_is_rejected() {
        let parsed: Result<WirePrediction, _> =
            serde_json::from_str(r#"{"error": "No image uploaded"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn bbox_dimensions() {
        let bbox = BoundingBox([10.0, 20.0, 110.0, 70.0]);
        assert_eq!(bbox.width(), 100.0);
        assert_eq!(bbox.height(), 50.0);
    }
}
