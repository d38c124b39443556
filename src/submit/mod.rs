//! Submission client.
//!
//! Sends exactly one image to a detection endpoint and returns a parsed
//! `PredictionResult` or a typed `SubmissionError`. Transport is chosen by
//! configuration, never by inspecting the runtime host:
//!
//! - `BackendMode::Local`: multipart POST straight to the co-located backend
//! - `BackendMode::Proxied`: base64 JSON POST to the predict proxy function
//!
//! There is no retry. A dormant backend can take tens of seconds to answer
//! the first request; callers show elapsed time (`ui::Ui::stage`) instead.

mod reply;

pub use reply::{interpret_reply, SubmissionError};

use std::time::{Duration, Instant};

use serde_json::json;

use crate::capture::ImageArtifact;
use crate::config::{BackendMode, WeedVisionConfig};
use crate::detect::PredictionResult;
use crate::multipart::MultipartBody;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Anything that can turn an image into a prediction.
pub trait Submitter {
    fn submit(&self, image: &ImageArtifact) -> Result<PredictionResult, SubmissionError>;
}

#[derive(Clone, Debug)]
enum Transport {
    Local { endpoint: String },
    Proxied { url: String, key: Option<String> },
}

/// HTTP submission client.
pub struct SubmissionClient {
    transport: Transport,
    agent: ureq::Agent,
}

impl SubmissionClient {
    pub fn local(endpoint: impl Into<String>, read_timeout: Duration) -> Self {
        Self::with_transport(
            Transport::Local {
                endpoint: endpoint.into(),
            },
            read_timeout,
        )
    }

    pub fn proxied(url: impl Into<String>, key: Option<String>, read_timeout: Duration) -> Self {
        Self::with_transport(
            Transport::Proxied {
                url: url.into(),
                key,
            },
            read_timeout,
        )
    }

    pub fn from_config(cfg: &WeedVisionConfig) -> Self {
        match cfg.backend_mode {
            BackendMode::Local => Self::local(cfg.local_endpoint.clone(), cfg.request_timeout),
            BackendMode::Proxied => Self::proxied(
                cfg.proxy_url.clone().unwrap_or_default(),
                cfg.proxy_key.clone(),
                cfg.request_timeout,
            ),
        }
    }

    fn with_transport(transport: Transport, read_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(read_timeout)
            .build();
        Self { transport, agent }
    }

    pub fn mode(&self) -> BackendMode {
        match self.transport {
            Transport::Local { .. } => BackendMode::Local,
            Transport::Proxied { .. } => BackendMode::Proxied,
        }
    }

    pub fn endpoint(&self) -> &str {
        match &self.transport {
            Transport::Local { endpoint } => endpoint,
            Transport::Proxied { url, .. } => url,
        }
    }

    fn post_local(
        &self,
        endpoint: &str,
        image: &ImageArtifact,
    ) -> Result<PredictionResult, SubmissionError> {
        let mut body = MultipartBody::new();
        // The backend reads `file`; older builds read `image`.
        body.add_file("file", image.filename(), image.mime_type(), image.bytes());
        body.add_file("image", image.filename(), image.mime_type(), image.bytes());
        let (content_type, bytes) = body.finish();
        let response = self
            .agent
            .post(endpoint)
            .set("Content-Type", &content_type)
            .send_bytes(&bytes);
        reply::read_reply(response)
    }

    fn post_proxied(
        &self,
        url: &str,
        key: Option<&str>,
        image: &ImageArtifact,
    ) -> Result<PredictionResult, SubmissionError> {
        let payload = json!({
            "base64": image.to_base64(),
            "filename": image.filename(),
            "mimeType": image.mime_type(),
        });
        let mut request = self.agent.post(url).set("Content-Type", "application/json");
        if let Some(key) = key {
            request = request
                .set("Authorization", &format!("Bearer {key}"))
                .set("apikey", key);
        }
        reply::read_reply(request.send_string(&payload.to_string()))
    }
}

impl Submitter for SubmissionClient {
    fn submit(&self, image: &ImageArtifact) -> Result<PredictionResult, SubmissionError> {
        let started = Instant::now();
        log::info!(
            "submitting {} ({} bytes, {}) via {:?} backend",
            image.filename(),
            image.len(),
            image.mime_type(),
            self.mode()
        );
        let outcome = match &self.transport {
            Transport::Local { endpoint } => self.post_local(endpoint, image),
            Transport::Proxied { url, key } => self.post_proxied(url, key.as_deref(), image),
        };
        match &outcome {
            Ok(result) => log::info!(
                "prediction received: {} detections in {:.1}s",
                result.detections.len(),
                started.elapsed().as_secs_f64()
            ),
            Err(err) => log::warn!(
                "prediction failed after {:.1}s: {}",
                started.elapsed().as_secs_f64(),
                err
            ),
        }
        outcome
    }
}
