mod catalog;
mod fertilizer;
mod result;

pub use catalog::{Catalog, Product};
pub use fertilizer::{convert_to_hectare, dedup_treatments, FertilizerRecord, ACRES_PER_HECTARE};
pub use result::{
    BoundingBox, Confidence, Detection, PredictionResult, Treatment, WireDetection,
    WirePrediction,
};
