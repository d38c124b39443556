//! Application state controller.
//!
//! `App` is the single owner of the selected image, the latest result and
//! the camera session. Front ends (the CLI, tests) drive it through methods
//! and read state back through accessors; nothing here is global.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::{
    CameraDevice, CameraError, CameraSession, CameraState, FacingMode, ImageArtifact,
};
use crate::config::WeedVisionConfig;
use crate::detect::PredictionResult;
use crate::submit::{SubmissionError, Submitter};
use crate::InputError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("no image selected")]
    NoImage,
    #[error("a submission is already in progress")]
    Busy,
    #[error("no camera is open")]
    NoCamera,
    #[error("please write something before submitting")]
    EmptyFeedback,
}

impl AppError {
    /// Text for a toast.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Submission(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Suggestion,
    Feedback,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FeedbackEntry {
    pub kind: FeedbackKind,
    pub text: String,
}

/// Handed out by `begin_submission`; must be returned to
/// `complete_submission` with the outcome.
#[derive(Debug)]
pub struct SubmissionTicket {
    generation: u64,
    image: ImageArtifact,
}

impl SubmissionTicket {
    pub fn image(&self) -> &ImageArtifact {
        &self.image
    }
}

pub struct App {
    config: WeedVisionConfig,
    image: Option<ImageArtifact>,
    result: Option<PredictionResult>,
    camera: Option<CameraSession>,
    /// Generation of the submission currently waiting, if any.
    in_flight: Option<u64>,
    generation: u64,
    feedback: Vec<FeedbackEntry>,
}

impl App {
    pub fn new(config: WeedVisionConfig) -> Self {
        Self {
            config,
            image: None,
            result: None,
            camera: None,
            in_flight: None,
            generation: 0,
            feedback: Vec::new(),
        }
    }

    pub fn config(&self) -> &WeedVisionConfig {
        &self.config
    }

    pub fn image(&self) -> Option<&ImageArtifact> {
        self.image.as_ref()
    }

    pub fn result(&self) -> Option<&PredictionResult> {
        self.result.as_ref()
    }

    pub fn is_processing(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn camera_state(&self) -> CameraState {
        self.camera
            .as_ref()
            .map(CameraSession::state)
            .unwrap_or(CameraState::Closed)
    }

    pub fn camera_facing(&self) -> Option<FacingMode> {
        self.camera
            .as_ref()
            .filter(|camera| camera.is_active())
            .map(CameraSession::facing)
    }

    pub fn feedback(&self) -> &[FeedbackEntry] {
        &self.feedback
    }

    /// Replace the current image. Any previous result belongs to the old
    /// image and is dropped, and a submission still in flight for it will
    /// be discarded when it completes.
    pub fn select_image(&mut self, image: ImageArtifact) {
        log::debug!("selected {} ({} bytes)", image.filename(), image.len());
        self.image = Some(image);
        self.result = None;
        self.forget_in_flight();
    }

    /// Load and select a file. On error the current state is untouched.
    pub fn select_path(&mut self, path: &Path) -> Result<(), AppError> {
        let image = ImageArtifact::from_path(path)?;
        self.select_image(image);
        Ok(())
    }

    pub fn begin_submission(&mut self) -> Result<SubmissionTicket, AppError> {
        if self.in_flight.is_some() {
            return Err(AppError::Busy);
        }
        let image = self.image.clone().ok_or(AppError::NoImage)?;
        self.in_flight = Some(self.generation);
        Ok(SubmissionTicket {
            generation: self.generation,
            image,
        })
    }

    /// Store the outcome of a submission. Returns `Ok(None)` when the
    /// state was reset while the request was out; the outcome is dropped.
    pub fn complete_submission(
        &mut self,
        ticket: SubmissionTicket,
        outcome: Result<PredictionResult, SubmissionError>,
    ) -> Result<Option<&PredictionResult>, AppError> {
        if ticket.generation != self.generation {
            log::debug!(
                "discarding result for generation {} (now {})",
                ticket.generation,
                self.generation
            );
            return Ok(None);
        }
        if self.in_flight == Some(ticket.generation) {
            self.in_flight = None;
        }
        let result = outcome?;
        self.result = Some(result);
        Ok(self.result.as_ref())
    }

    /// Submit the current image and wait for the outcome.
    pub fn submit_current(
        &mut self,
        submitter: &dyn Submitter,
    ) -> Result<Option<&PredictionResult>, AppError> {
        let ticket = self.begin_submission()?;
        let outcome = submitter.submit(ticket.image());
        self.complete_submission(ticket, outcome)
    }

    /// Back to the empty state. A submission still in flight is forgotten.
    pub fn reset(&mut self) {
        self.image = None;
        self.result = None;
        self.forget_in_flight();
        self.close_camera();
    }

    fn forget_in_flight(&mut self) {
        self.in_flight = None;
        self.generation += 1;
    }

    /// Open `device`, replacing any session already open.
    pub fn open_camera(
        &mut self,
        device: Box<dyn CameraDevice>,
        preferred: FacingMode,
    ) -> Result<CameraState, AppError> {
        self.close_camera();
        let mut session = CameraSession::new(device);
        let state = session.open(preferred)?;
        self.camera = Some(session);
        Ok(state)
    }

    pub fn poll_camera(&mut self) -> CameraState {
        match self.camera.as_mut() {
            Some(camera) => camera.poll_ready(),
            None => CameraState::Closed,
        }
    }

    /// Capture a still, release the camera and select the still.
    pub fn capture_from_camera(&mut self) -> Result<&ImageArtifact, AppError> {
        let camera = self.camera.as_mut().ok_or(AppError::NoCamera)?;
        let image = camera.capture_and_close()?;
        self.camera = None;
        self.select_image(image);
        self.image.as_ref().ok_or(AppError::NoImage)
    }

    pub fn switch_camera(&mut self) -> Result<CameraState, AppError> {
        let camera = self.camera.as_mut().ok_or(AppError::NoCamera)?;
        Ok(camera.switch()?)
    }

    pub fn close_camera(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            camera.close();
        }
    }

    /// Record feedback locally. Blank text is rejected.
    pub fn submit_feedback(&mut self, kind: FeedbackKind, text: &str) -> Result<(), AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::EmptyFeedback);
        }
        log::info!("{:?} received ({} chars)", kind, text.chars().count());
        self.feedback.push(FeedbackEntry {
            kind,
            text: text.to_string(),
        });
        Ok(())
    }
}
