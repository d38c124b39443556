use serde_json::Value;
use thiserror::Error;

use crate::detect::{PredictionResult, WirePrediction};

const PREVIEW_CHARS: usize = 200;

/// Why a submission produced no result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    /// Nothing came back: DNS, refused connection, reset, timeout.
    #[error("could not reach the detection backend: {0}")]
    Connection(String),
    /// Non-2xx with a JSON body.
    #[error("detection backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    /// Body was not JSON, typically an HTML error page from a sleeping host.
    #[error("detection backend returned a non-JSON response (HTTP {status})")]
    NotJson { status: u16, preview: String },
    /// JSON, but not the prediction shape.
    #[error("detection backend returned an unexpected response: {0}")]
    Malformed(String),
}

impl SubmissionError {
    /// Message suitable for a toast.
    pub fn user_message(&self) -> String {
        match self {
            SubmissionError::Connection(_) => {
                "Failed to reach the detection server. Check your connection and make sure the backend is running.".to_string()
            }
            SubmissionError::Status { message, .. } => message.clone(),
            SubmissionError::NotJson { .. } => {
                "The detection server is starting up or returned an error page. Please try again in a minute.".to_string()
            }
            SubmissionError::Malformed(_) => {
                "The detection server returned an unexpected response.".to_string()
            }
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            SubmissionError::Status { status, .. } | SubmissionError::NotJson { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

pub(super) fn read_reply(
    result: Result<ureq::Response, ureq::Error>,
) -> Result<PredictionResult, SubmissionError> {
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(transport)) => {
            return Err(SubmissionError::Connection(transport.to_string()))
        }
    };
    let status = response.status();
    let body = response
        .into_string()
        .map_err(|e| SubmissionError::Connection(format!("reading response body: {e}")))?;
    interpret_reply(status, &body)
}

/// Classify a completed HTTP exchange.
///
/// Content type is not trusted; the body decides whether it is JSON.
pub fn interpret_reply(status: u16, body: &str) -> Result<PredictionResult, SubmissionError> {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => {
            return Err(SubmissionError::NotJson {
                status,
                preview: preview(body),
            })
        }
    };

    if !(200..300).contains(&status) {
        return Err(SubmissionError::Status {
            status,
            message: error_message(&value).unwrap_or_else(|| default_status_message(status)),
        });
    }

    if value.get("detections").is_none() {
        if let Some(message) = error_message(&value) {
            return Err(SubmissionError::Status { status, message });
        }
    }

    let wire: WirePrediction =
        serde_json::from_value(value).map_err(|e| SubmissionError::Malformed(e.to_string()))?;
    Ok(PredictionResult::from_wire(wire))
}

fn error_message(value: &Value) -> Option<String> {
    for key in ["error", "message", "detail"] {
        match value.get(key) {
            Some(Value::String(text)) if !text.trim().is_empty() => {
                return Some(text.trim().to_string())
            }
            Some(Value::Object(inner)) => {
                if let Some(Value::String(text)) = inner.get("message") {
                    return Some(text.trim().to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn default_status_message(status: u16) -> String {
    match status {
        400 => "The detection server rejected the image.".to_string(),
        404 => "Detection endpoint not found.".to_string(),
        413 => "The image is too large.".to_string(),
        500..=599 => format!("The detection server failed (HTTP {status})."),
        _ => format!("Detection request failed (HTTP {status})."),
    }
}

fn preview(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_body_is_parsed() {
        let body = r#"{"detections":[{"label":"Parthenium","confidence":91.2}],
            "result_image_url":"r","original_image_url":"o"}"#;
        let result = interpret_reply(200, body).unwrap();
        assert_eq!(result.detections.len(), 1);
        assert_eq!(result.result_image_url, "r");
    }

    #[test]
    fn error_body_carries_backend_message() {
        let err = interpret_reply(400, r#"{"error": "No image uploaded"}"#).unwrap_err();
        assert_eq!(
            err,
            SubmissionError::Status {
                status: 400,
                message: "No image uploaded".to_string()
            }
        );
        assert_eq!(err.user_message(), "No image uploaded");
    }

    #[test]
    fn proxy_envelope_is_a_status_error() {
        let body = r#"{"error":"Upstream returned a non-JSON response","upstream_status":503,
            "upstream_content_type":"text/html","upstream_body_preview":"<html>"}"#;
        let err = interpret_reply(503, body).unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(err.user_message().contains("non-JSON"));
    }

    #[test]
    fn json_without_message_gets_default_text() {
        let err = interpret_reply(502, "{}").unwrap_err();
        assert_eq!(
            err,
            SubmissionError::Status {
                status: 502,
                message: "The detection server failed (HTTP 502).".to_string()
            }
        );
    }

    #[test]
    fn html_page_is_not_json() {
        let err =
            interpret_reply(200, "<html>\n  <body>Service waking up</body>\n</html>").unwrap_err();
        match err {
            SubmissionError::NotJson { status, preview } => {
                assert_eq!(status, 200);
                assert_eq!(preview, "<html> <body>Service waking up</body> </html>");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn wrong_shape_is_malformed() {
        let err = interpret_reply(200, r#"{"detections": "none"}"#).unwrap_err();
        assert!(matches!(err, SubmissionError::Malformed(_)));
    }

    #[test]
    fn success_status_with_error_body_is_reported() {
        let err = interpret_reply(200, r#"{"error": "model not loaded"}"#).unwrap_err();
        assert_eq!(err.user_message(), "model not loaded");
    }
}
