//! Image acquisition.
//!
//! Two sources produce an `ImageArtifact`:
//! - A file picked from disk (`ImageArtifact::from_path`)
//! - A still captured from a live camera (`CameraSession::capture`)
//!
//! Validation happens here, at construction: an artifact that exists is
//! non-empty and carries an `image/*` MIME type. Nothing downstream
//! re-checks.

mod camera;
mod synthetic;
#[cfg(feature = "camera-v4l2")]
mod v4l2;

pub use camera::{
    CameraDevice, CameraError, CameraSession, CameraState, FacingConstraint, FacingMode, Frame,
    MediaStream, CAPTURE_FILENAME, JPEG_QUALITY,
};
pub use synthetic::{CameraEvent, SyntheticCamera, SyntheticConfig, SyntheticLog};
#[cfg(feature = "camera-v4l2")]
pub use v4l2::{V4l2Camera, V4l2Config};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;

use crate::InputError;

/// A single image ready for submission.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    bytes: Vec<u8>,
    mime_type: String,
    filename: String,
}

impl std::fmt::Debug for ImageArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageArtifact")
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .field("filename", &self.filename)
            .finish()
    }
}

impl ImageArtifact {
    pub fn new(
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
        filename: impl Into<String>,
    ) -> Result<Self, InputError> {
        let mime_type = mime_type.into().trim().to_lowercase();
        if !mime_type.starts_with("image/") {
            return Err(InputError::NotAnImage { mime_type });
        }
        if bytes.is_empty() {
            return Err(InputError::EmptyImage);
        }
        Ok(Self {
            bytes,
            mime_type,
            filename: filename.into(),
        })
    }

    /// Load an image from disk, inferring the MIME type from the extension.
    pub fn from_path(path: &Path) -> Result<Self, InputError> {
        let mime_type = mime_for_path(path)?;
        let bytes = std::fs::read(path).map_err(|e| InputError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.jpg".to_string());
        Self::new(bytes, mime_type, filename)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>`
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// MIME type for a file path, or `UnsupportedExtension`.
pub fn mime_for_path(path: &Path) -> Result<&'static str, InputError> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    mime_for_extension(&extension).ok_or(InputError::UnsupportedExtension { extension })
}

/// Camera device for a URI: `stub://<name>` is the synthetic device, any
/// other value is a V4L2 node path (feature `camera-v4l2`).
pub fn open_device(uri: &str) -> anyhow::Result<Box<dyn CameraDevice>> {
    if uri.starts_with("stub://") {
        return Ok(Box::new(SyntheticCamera::from_uri(uri)?));
    }
    device_for_path(uri)
}

#[cfg(feature = "camera-v4l2")]
fn device_for_path(path: &str) -> anyhow::Result<Box<dyn CameraDevice>> {
    Ok(Box::new(V4l2Camera::from_path(path)))
}

#[cfg(not(feature = "camera-v4l2"))]
fn device_for_path(path: &str) -> anyhow::Result<Box<dyn CameraDevice>> {
    Err(anyhow::anyhow!(
        "camera device '{}' needs the camera-v4l2 feature; only stub:// devices are built in",
        path
    ))
}

pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    match extension.trim_start_matches('.').to_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}
