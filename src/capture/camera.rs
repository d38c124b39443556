use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use thiserror::Error;

use super::ImageArtifact;

/// JPEG quality for captured stills.
pub const JPEG_QUALITY: u8 = 90;

/// Filename attached to captured stills.
pub const CAPTURE_FILENAME: &str = "captured-image.jpg";

/// Camera orientation selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FacingMode {
    /// Rear camera.
    Environment,
    /// Front camera.
    User,
}

impl FacingMode {
    pub fn opposite(self) -> Self {
        match self {
            FacingMode::Environment => FacingMode::User,
            FacingMode::User => FacingMode::Environment,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FacingMode::Environment => "environment",
            FacingMode::User => "user",
        }
    }
}

impl std::str::FromStr for FacingMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "environment" | "rear" | "back" => Ok(FacingMode::Environment),
            "user" | "front" => Ok(FacingMode::User),
            other => Err(anyhow::anyhow!(
                "unknown facing mode '{}'; expected environment or user",
                other
            )),
        }
    }
}

/// Constraint passed to the device when requesting a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FacingConstraint {
    Preferred(FacingMode),
    Any,
}

/// Device-access failures. Each maps to one user-actionable message; none
/// are retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied; enable it in your browser or system settings")]
    PermissionDenied,
    #[error("no camera found on this device")]
    NotFound,
    #[error("camera requires a secure context; open the app over https://")]
    InsecureContext,
    #[error("camera access is not supported on this platform")]
    Unsupported,
    #[error("requested camera constraint was rejected: {0}")]
    ConstraintRejected(String),
    #[error("camera is not ready yet")]
    NotReady,
    #[error("capture failed: {0}")]
    Capture(String),
}

/// One decoded video frame, RGB8, row-major.
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// A live stream holding the OS-level camera lock until `stop` is called.
pub trait MediaStream: Send {
    /// Facing mode of the device actually opened, when the device reports it.
    fn facing(&self) -> Option<FacingMode>;

    /// True once metadata is loaded and frames can be read.
    fn is_ready(&self) -> bool;

    /// Current frame at native resolution.
    fn frame(&mut self) -> Result<Frame, CameraError>;

    /// Stop all tracks and release the device. Must be idempotent.
    fn stop(&mut self);
}

/// Source of media streams.
pub trait CameraDevice: Send {
    fn name(&self) -> &str;

    /// False when the platform has no camera API at all.
    fn is_supported(&self) -> bool {
        true
    }

    /// False when camera access is refused for an insecure origin.
    fn is_secure_context(&self) -> bool {
        true
    }

    fn open_stream(
        &mut self,
        constraint: FacingConstraint,
    ) -> Result<Box<dyn MediaStream>, CameraError>;
}

/// Observable session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraState {
    Closed,
    Opening,
    Ready,
}

enum Slot {
    Closed,
    Opening(Box<dyn MediaStream>),
    Ready(Box<dyn MediaStream>),
}

/// Camera lifecycle: `Closed → Opening → Ready → Closed`.
///
/// The session owns at most one stream. Every path out of `Opening`/`Ready`
/// (close, capture-then-close, switch, re-open, drop) stops the stream.
pub struct CameraSession {
    device: Box<dyn CameraDevice>,
    slot: Slot,
    facing: FacingMode,
}

impl CameraSession {
    pub fn new(device: Box<dyn CameraDevice>) -> Self {
        Self {
            device,
            slot: Slot::Closed,
            facing: FacingMode::Environment,
        }
    }

    pub fn state(&self) -> CameraState {
        match self.slot {
            Slot::Closed => CameraState::Closed,
            Slot::Opening(_) => CameraState::Opening,
            Slot::Ready(_) => CameraState::Ready,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.slot, Slot::Closed)
    }

    /// Facing mode last requested through `open` or `switch`.
    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    /// Release any existing stream, then request a new one.
    ///
    /// The preferred facing mode is tried first; if the device rejects it
    /// or has no such camera, any camera is accepted instead.
    pub fn open(&mut self, preferred: FacingMode) -> Result<CameraState, CameraError> {
        self.release();

        if !self.device.is_supported() {
            return Err(CameraError::Unsupported);
        }
        if !self.device.is_secure_context() {
            return Err(CameraError::InsecureContext);
        }

        let stream = match self
            .device
            .open_stream(FacingConstraint::Preferred(preferred))
        {
            Ok(stream) => stream,
            Err(CameraError::ConstraintRejected(reason)) => {
                log::info!(
                    "camera: preferred facing '{}' rejected ({}); falling back to any camera",
                    preferred.as_str(),
                    reason
                );
                self.device.open_stream(FacingConstraint::Any)?
            }
            Err(CameraError::NotFound) => {
                log::info!(
                    "camera: no '{}' camera; falling back to any camera",
                    preferred.as_str()
                );
                self.device.open_stream(FacingConstraint::Any)?
            }
            Err(err) => return Err(err),
        };

        self.facing = preferred;
        self.slot = Slot::Opening(stream);
        log::info!("camera: opening {} ({})", self.device.name(), preferred.as_str());
        Ok(self.poll_ready())
    }

    /// Metadata-loaded / playback-started callback.
    pub fn on_ready(&mut self) -> CameraState {
        self.slot = match std::mem::replace(&mut self.slot, Slot::Closed) {
            Slot::Opening(stream) => {
                log::debug!("camera: ready");
                Slot::Ready(stream)
            }
            other => other,
        };
        self.state()
    }

    /// Advance `Opening → Ready` if the stream reports it is ready.
    pub fn poll_ready(&mut self) -> CameraState {
        let ready = match &self.slot {
            Slot::Opening(stream) => stream.is_ready(),
            _ => false,
        };
        if ready {
            self.on_ready()
        } else {
            self.state()
        }
    }

    /// Encode the current frame as a JPEG still.
    ///
    /// Only valid in `Ready`. User-facing streams are mirrored so the still
    /// matches the on-screen preview; a stream that doesn't report its
    /// facing mode is taken to be the one requested. State is left
    /// unchanged.
    pub fn capture(&mut self) -> Result<ImageArtifact, CameraError> {
        let stream = match &mut self.slot {
            Slot::Ready(stream) => stream,
            _ => return Err(CameraError::NotReady),
        };
        let facing = stream.facing().unwrap_or(self.facing);
        let frame = stream.frame()?;
        encode_still(frame, facing == FacingMode::User)
    }

    /// Capture, then close whatever the capture outcome.
    ///
    /// Outside `Ready` this fails with `NotReady` and the session is kept,
    /// so an early press doesn't tear down a camera that is still starting.
    pub fn capture_and_close(&mut self) -> Result<ImageArtifact, CameraError> {
        if self.state() != CameraState::Ready {
            return Err(CameraError::NotReady);
        }
        let result = self.capture();
        self.close();
        result
    }

    /// Stop all tracks. Valid from any state.
    pub fn close(&mut self) {
        if self.release() {
            log::info!("camera: closed {}", self.device.name());
        }
    }

    /// Close and re-open with the opposite facing mode.
    pub fn switch(&mut self) -> Result<CameraState, CameraError> {
        let next = self.facing.opposite();
        self.open(next)
    }

    fn release(&mut self) -> bool {
        match std::mem::replace(&mut self.slot, Slot::Closed) {
            Slot::Opening(mut stream) | Slot::Ready(mut stream) => {
                stream.stop();
                true
            }
            Slot::Closed => false,
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}

fn encode_still(frame: Frame, mirror: bool) -> Result<ImageArtifact, CameraError> {
    let expected = frame.width as usize * frame.height as usize * 3;
    if frame.width == 0 || frame.height == 0 || frame.pixels.len() != expected {
        return Err(CameraError::Capture(format!(
            "frame of {}x{} carries {} bytes, expected {}",
            frame.width,
            frame.height,
            frame.pixels.len(),
            expected
        )));
    }
    let image = RgbImage::from_raw(frame.width, frame.height, frame.pixels)
        .ok_or_else(|| CameraError::Capture("frame buffer too small".to_string()))?;
    let image = if mirror {
        image::imageops::flip_horizontal(&image)
    } else {
        image
    };

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&image)
        .map_err(|e| CameraError::Capture(e.to_string()))?;
    ImageArtifact::new(jpeg, "image/jpeg", CAPTURE_FILENAME)
        .map_err(|e| CameraError::Capture(e.to_string()))
}
