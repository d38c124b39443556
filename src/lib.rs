//! Weed Vision client toolkit
//!
//! This crate implements the client side of an agricultural weed detection
//! service. A field image is picked from disk or captured from a camera,
//! submitted to an external object-detection backend, and the returned
//! detections are rendered together with fertilizer recommendations.
//!
//! # Architecture
//!
//! Data flows in one direction:
//!
//! 1. **Capture**: `capture::ImageArtifact` from a file, or a still from a
//!    `capture::CameraSession`.
//! 2. **Submission**: `submit::SubmissionClient` posts the image either to a
//!    local endpoint (multipart) or to the predict proxy (base64 JSON).
//! 3. **Rendering**: `render` turns a `detect::PredictionResult` into tables
//!    and a summary. Pure functions, no I/O.
//!
//! `app::App` owns the current image, result and camera session. The
//! `relay` module is the server half: the predict proxy and SMS relay edge
//! functions, served from one listener.
//!
//! # Module Structure
//!
//! - `detect`: Detection data model, fertilizer dedup, unit conversion, catalog matching
//! - `capture`: Image artifacts and the camera session state machine
//! - `submit`: Submission client and transport selection
//! - `render`: Detection table, confidence tiers, summary
//! - `health`: Backend health check and poller
//! - `notify`: SMS and share message formatting, SMS relay client
//! - `relay`: Edge-function HTTP server (predict proxy, SMS relay)
//! - `app`: Application-state controller
//! - `config`: Client and relay configuration (file, then env)
//! - `prefs`: Persisted theme and language
//! - `geo`: Distance ranking for nearby shops
//! - `multipart`: multipart/form-data writer and parser
//! - `ui`: Stage spinners for the CLI

use thiserror::Error;

pub mod app;
pub mod capture;
pub mod config;
pub mod detect;
pub mod geo;
pub mod health;
pub mod multipart;
pub mod notify;
pub mod prefs;
pub mod relay;
pub mod render;
pub mod submit;
pub mod ui;

pub use app::{App, AppError, FeedbackKind};
pub use capture::{
    CameraDevice, CameraError, CameraSession, CameraState, FacingConstraint, FacingMode, Frame,
    ImageArtifact, MediaStream, SyntheticCamera, SyntheticConfig,
};
pub use config::{BackendMode, RelayConfig, WeedVisionConfig};
pub use detect::{
    convert_to_hectare, dedup_treatments, BoundingBox, Catalog, Confidence, Detection,
    FertilizerRecord, PredictionResult, Product, Treatment,
};
pub use health::{BackendStatus, CheckOutcome, HealthCheck, HealthPoller, HttpHealthCheck};
pub use notify::{format_sms, normalize_phone, share_text, whatsapp_url, SmsRelayClient};
pub use prefs::{Language, Preferences, Theme};
pub use relay::{RelayHandle, RelayServer};
pub use render::{ConfidenceTier, DetectionRow, Summary};
pub use submit::{SubmissionClient, SubmissionError, Submitter};

/// Input rejected before any network call or state change.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("the selected file is empty")]
    EmptyImage,
    #[error("please select an image file (got '{mime_type}')")]
    NotAnImage { mime_type: String },
    #[error("unsupported file type '{extension}'; supported: JPG, PNG, WEBP")]
    UnsupportedExtension { extension: String },
    #[error("could not read {path}: {reason}")]
    Unreadable { path: String, reason: String },
    #[error("please enter a valid 10-digit mobile number")]
    InvalidPhone,
    #[error("please enter a message")]
    EmptyMessage,
}
