//! V4L2 camera device.
//!
//! Opens a local device node (e.g. `/dev/video0`) and reads frames through
//! memory-mapped buffers. V4L2 knows nothing about which way a camera
//! faces, so preferred-facing constraints are rejected and the session
//! falls back to `FacingConstraint::Any`; the requested mode then decides
//! mirroring.
//!
//! Drivers are asked for RGB3. Devices that insist on YUYV or MJPG are
//! converted to RGB8 on capture.

use std::io;

use ouroboros::self_referencing;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;

use super::camera::{CameraDevice, CameraError, FacingConstraint, FacingMode, Frame, MediaStream};

const BUFFER_COUNT: u32 = 4;

#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    /// Preferred frame width; the driver may pick another.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

pub struct V4l2Camera {
    config: V4l2Config,
}

impl V4l2Camera {
    pub fn new(config: V4l2Config) -> Self {
        Self { config }
    }

    pub fn from_path(path: &str) -> Self {
        Self::new(V4l2Config {
            device: path.to_string(),
            ..V4l2Config::default()
        })
    }
}

impl CameraDevice for V4l2Camera {
    fn name(&self) -> &str {
        &self.config.device
    }

    fn open_stream(
        &mut self,
        constraint: FacingConstraint,
    ) -> Result<Box<dyn MediaStream>, CameraError> {
        if let FacingConstraint::Preferred(mode) = constraint {
            return Err(CameraError::ConstraintRejected(format!(
                "{} does not report a facing mode ('{}' requested)",
                self.config.device,
                mode.as_str()
            )));
        }
        let stream = V4l2Stream::open(&self.config)?;
        Ok(Box::new(stream))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PixelFormat {
    Rgb3,
    Yuyv,
    Mjpg,
}

impl PixelFormat {
    fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb3),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"MJPG" => Some(PixelFormat::Mjpg),
            _ => None,
        }
    }
}

#[self_referencing]
struct Streaming {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

struct V4l2Stream {
    device: String,
    streaming: Option<Streaming>,
    format: PixelFormat,
    width: u32,
    height: u32,
}

impl V4l2Stream {
    fn open(config: &V4l2Config) -> Result<Self, CameraError> {
        let mut device = v4l::Device::with_path(&config.device)
            .map_err(|err| open_error(&config.device, err))?;

        let mut format = device
            .format()
            .map_err(|err| open_error(&config.device, err))?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");
        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "camera: failed to set format on {}: {}",
                    config.device,
                    err
                );
                device
                    .format()
                    .map_err(|err| open_error(&config.device, err))?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            CameraError::Capture(format!(
                "{} delivers unsupported pixel format {}",
                config.device, format.fourcc
            ))
        })?;

        let streaming = StreamingBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT)
            },
        }
        .try_build()
        .map_err(|err| open_error(&config.device, err))?;

        log::info!(
            "camera: {} streaming {}x{} {:?}",
            config.device,
            format.width,
            format.height,
            pixel_format
        );
        Ok(Self {
            device: config.device.clone(),
            streaming: Some(streaming),
            format: pixel_format,
            width: format.width,
            height: format.height,
        })
    }
}

impl MediaStream for V4l2Stream {
    fn facing(&self) -> Option<FacingMode> {
        None
    }

    fn is_ready(&self) -> bool {
        self.streaming.is_some()
    }

    fn frame(&mut self) -> Result<Frame, CameraError> {
        let streaming = self
            .streaming
            .as_mut()
            .ok_or_else(|| CameraError::Capture("stream already stopped".to_string()))?;
        let (format, width, height) = (self.format, self.width, self.height);
        let device = &self.device;
        streaming.with_mut(|fields| {
            let (buf, meta) = fields
                .stream
                .next()
                .map_err(|err| CameraError::Capture(format!("{device}: {err}")))?;
            let used = (meta.bytesused as usize).min(buf.len());
            let data = if used == 0 { buf } else { &buf[..used] };
            decode_frame(format, width, height, data)
        })
    }

    fn stop(&mut self) {
        if self.streaming.take().is_some() {
            log::debug!("camera: released {}", self.device);
        }
    }
}

/// EACCES and ENOENT get their own messages; anything else is reported
/// with the OS text.
fn open_error(device: &str, err: io::Error) -> CameraError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => CameraError::PermissionDenied,
        io::ErrorKind::NotFound => CameraError::NotFound,
        _ => CameraError::Capture(format!("{device}: {err}")),
    }
}

fn decode_frame(
    format: PixelFormat,
    width: u32,
    height: u32,
    data: &[u8],
) -> Result<Frame, CameraError> {
    let pixels = width as usize * height as usize;
    match format {
        PixelFormat::Rgb3 => {
            let needed = pixels * 3;
            if data.len() < needed {
                return Err(short_buffer(data.len(), needed));
            }
            Ok(Frame {
                width,
                height,
                pixels: data[..needed].to_vec(),
            })
        }
        PixelFormat::Yuyv => {
            let needed = pixels * 2;
            if data.len() < needed {
                return Err(short_buffer(data.len(), needed));
            }
            Ok(Frame {
                width,
                height,
                pixels: yuyv_to_rgb(&data[..needed]),
            })
        }
        PixelFormat::Mjpg => {
            let decoded = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
                .map_err(|err| CameraError::Capture(format!("MJPG frame: {err}")))?
                .to_rgb8();
            Ok(Frame {
                width: decoded.width(),
                height: decoded.height(),
                pixels: decoded.into_raw(),
            })
        }
    }
}

fn short_buffer(got: usize, needed: usize) -> CameraError {
    CameraError::Capture(format!("frame buffer holds {got} bytes, expected {needed}"))
}

/// BT.601 YUYV 4:2:2 to packed RGB8.
fn yuyv_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 2 * 3);
    for chunk in data.chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    rgb
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e),
        clamp(298 * c - 100 * d - 208 * e),
        clamp(298 * c + 516 * d),
    ]
}
