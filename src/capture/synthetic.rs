//! Synthetic camera device.
//!
//! Produces a deterministic horizontal gradient at a fixed resolution. Used
//! by tests and by the CLI for `stub://` devices. Every stream open and stop
//! is recorded in a shared `SyntheticLog`, so the single-stream invariant of
//! `CameraSession` is observable from outside.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::camera::{
    CameraDevice, CameraError, FacingConstraint, FacingMode, Frame, MediaStream,
};

/// Behaviour knobs for the synthetic device.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Number of `is_ready` calls answered with `false` before the stream
    /// reports ready. Zero means ready immediately.
    pub ready_after_polls: u32,
    /// Reject `FacingConstraint::Preferred` so callers must fall back.
    pub reject_preferred: bool,
    /// Facing mode reported for streams opened with `FacingConstraint::Any`.
    pub fallback_facing: FacingMode,
    /// When false, streams answer `facing()` with `None`, like a USB
    /// webcam that knows nothing about its orientation.
    pub report_facing: bool,
    /// Fail every open with this error.
    pub fail_with: Option<CameraError>,
    pub supported: bool,
    pub secure_context: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "stub://field_camera".to_string(),
            width: 640,
            height: 480,
            ready_after_polls: 0,
            reject_preferred: false,
            fallback_facing: FacingMode::Environment,
            report_facing: true,
            fail_with: None,
            supported: true,
            secure_context: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraEvent {
    Opened(u32),
    Stopped(u32),
}

#[derive(Debug, Default)]
struct LogInner {
    events: Vec<CameraEvent>,
    constraints: Vec<FacingConstraint>,
    next_id: u32,
    active: u32,
}

/// Shared record of everything the synthetic device did.
#[derive(Clone, Debug, Default)]
pub struct SyntheticLog {
    inner: Arc<Mutex<LogInner>>,
}

impl SyntheticLog {
    pub fn events(&self) -> Vec<CameraEvent> {
        self.lock().events.clone()
    }

    /// Every constraint passed to `open_stream`, in order.
    pub fn constraints(&self) -> Vec<FacingConstraint> {
        self.lock().constraints.clone()
    }

    /// Streams opened and not yet stopped.
    pub fn active_streams(&self) -> u32 {
        self.lock().active
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogInner> {
        // A panic while holding the lock only happens in a failing test; keep
        // reporting what was recorded.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct SyntheticCamera {
    config: SyntheticConfig,
    log: SyntheticLog,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            log: SyntheticLog::default(),
        }
    }

    /// Build from a `stub://<name>` device URI.
    pub fn from_uri(uri: &str) -> Result<Self> {
        if !uri.starts_with("stub://") {
            return Err(anyhow!(
                "unsupported camera device '{}'; only stub:// devices are available",
                uri
            ));
        }
        Ok(Self::new(SyntheticConfig {
            name: uri.to_string(),
            ..SyntheticConfig::default()
        }))
    }

    pub fn log(&self) -> SyntheticLog {
        self.log.clone()
    }
}

impl CameraDevice for SyntheticCamera {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_supported(&self) -> bool {
        self.config.supported
    }

    fn is_secure_context(&self) -> bool {
        self.config.secure_context
    }

    fn open_stream(
        &mut self,
        constraint: FacingConstraint,
    ) -> Result<Box<dyn MediaStream>, CameraError> {
        let mut inner = self.log.lock();
        inner.constraints.push(constraint);

        if let Some(err) = &self.config.fail_with {
            return Err(err.clone());
        }
        let facing = match constraint {
            FacingConstraint::Preferred(_) if self.config.reject_preferred => {
                return Err(CameraError::ConstraintRejected(
                    "device does not honour facing constraints".to_string(),
                ));
            }
            FacingConstraint::Preferred(mode) => mode,
            FacingConstraint::Any => self.config.fallback_facing,
        };

        inner.next_id += 1;
        inner.active += 1;
        let id = inner.next_id;
        inner.events.push(CameraEvent::Opened(id));

        Ok(Box::new(SyntheticStream {
            id,
            facing: self.config.report_facing.then_some(facing),
            width: self.config.width,
            height: self.config.height,
            ready_after_polls: self.config.ready_after_polls,
            polls: AtomicU32::new(0),
            stopped: false,
            log: self.log.clone(),
        }))
    }
}

struct SyntheticStream {
    id: u32,
    facing: Option<FacingMode>,
    width: u32,
    height: u32,
    ready_after_polls: u32,
    polls: AtomicU32,
    stopped: bool,
    log: SyntheticLog,
}

impl MediaStream for SyntheticStream {
    fn facing(&self) -> Option<FacingMode> {
        self.facing
    }

    fn is_ready(&self) -> bool {
        if self.stopped {
            return false;
        }
        let previous = self.polls.fetch_add(1, Ordering::SeqCst);
        previous >= self.ready_after_polls
    }

    fn frame(&mut self) -> Result<Frame, CameraError> {
        if self.stopped {
            return Err(CameraError::Capture("stream already stopped".to_string()));
        }
        let mut pixels = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        let span = self.width.saturating_sub(1).max(1);
        for _y in 0..self.height {
            for x in 0..self.width {
                let value = (x * 255 / span) as u8;
                pixels.extend_from_slice(&[value, value, value]);
            }
        }
        Ok(Frame {
            width: self.width,
            height: self.height,
            pixels,
        })
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let mut inner = self.log.lock();
        inner.active = inner.active.saturating_sub(1);
        inner.events.push(CameraEvent::Stopped(self.id));
    }
}
