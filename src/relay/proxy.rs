use std::io::Read;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use super::http::{HttpRequest, HttpResponse, MAX_BODY_BYTES};
use crate::multipart::{self, MultipartBody};

const DEFAULT_FILENAME: &str = "upload.jpg";
const DEFAULT_MIME: &str = "image/jpeg";
const PREVIEW_CHARS: usize = 500;
const MISSING_IMAGE: &str = "Missing image file (expected field 'file' or 'image').";

#[derive(Debug, PartialEq)]
pub(super) struct UploadedImage {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
}

pub(super) fn handle(
    request: &HttpRequest,
    agent: &ureq::Agent,
    predict_url: &str,
) -> HttpResponse {
    let image = match extract_image(request) {
        Ok(Some(image)) => image,
        Ok(None) => return HttpResponse::error(400, MISSING_IMAGE),
        Err(message) => return HttpResponse::error(400, &message),
    };
    log::info!(
        "forwarding {} ({} bytes, {}) to {}",
        image.filename,
        image.bytes.len(),
        image.mime_type,
        predict_url
    );
    forward(agent, predict_url, &image)
}

/// Pull the image out of a multipart or JSON request body.
pub(super) fn extract_image(request: &HttpRequest) -> Result<Option<UploadedImage>, String> {
    let content_type = request.content_type();
    if content_type
        .to_lowercase()
        .starts_with("multipart/form-data")
    {
        let parts = multipart::parse(content_type, &request.body)
            .map_err(|e| format!("Invalid multipart body: {e}"))?;
        let part = ["file", "image"].iter().find_map(|field| {
            parts
                .iter()
                .find(|part| part.name == *field && !part.data.is_empty())
        });
        return Ok(part.map(|part| UploadedImage {
            bytes: part.data.clone(),
            filename: part
                .filename
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_FILENAME.to_string()),
            mime_type: part
                .content_type
                .clone()
                .unwrap_or_else(|| DEFAULT_MIME.to_string()),
        }));
    }

    if request.body.is_empty() {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_slice(&request.body).map_err(|_| "Invalid JSON body".to_string())?;
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let (encoded, data_url_mime) = match (field("dataUrl"), field("base64")) {
        (Some(data_url), _) => {
            let (mime, payload) = split_data_url(data_url)?;
            (payload, mime)
        }
        (None, Some(raw)) => (raw, None),
        (None, None) => return Ok(None),
    };
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|_| "Invalid base64 image data".to_string())?;
    if bytes.is_empty() {
        return Ok(None);
    }

    Ok(Some(UploadedImage {
        bytes,
        filename: field("filename").unwrap_or(DEFAULT_FILENAME).to_string(),
        mime_type: field("mimeType")
            .map(str::to_string)
            .or(data_url_mime)
            .unwrap_or_else(|| DEFAULT_MIME.to_string()),
    }))
}

/// `data:image/png;base64,AAAA` -> (`Some("image/png")`, `AAAA`).
fn split_data_url(data_url: &str) -> Result<(Option<String>, &str), String> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| "Invalid data URL".to_string())?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| "Invalid data URL".to_string())?;
    if !meta.ends_with(";base64") {
        return Err("Data URL must be base64 encoded".to_string());
    }
    let mime = meta.trim_end_matches(";base64");
    Ok(((!mime.is_empty()).then(|| mime.to_string()), payload))
}

fn forward(agent: &ureq::Agent, predict_url: &str, image: &UploadedImage) -> HttpResponse {
    let mut body = MultipartBody::new();
    body.add_file("file", &image.filename, &image.mime_type, &image.bytes);
    body.add_file("image", &image.filename, &image.mime_type, &image.bytes);
    let (content_type, bytes) = body.finish();

    let response = match agent
        .post(predict_url)
        .set("Content-Type", &content_type)
        .send_bytes(&bytes)
    {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(err)) => {
            log::warn!("detection backend unreachable: {}", err);
            return HttpResponse::error(502, &format!("Failed to reach detection backend: {err}"));
        }
    };

    let status = response.status();
    let upstream_type = response.header("Content-Type").unwrap_or("").to_string();
    let mut upstream_body = Vec::new();
    if let Err(err) = response
        .into_reader()
        .take(MAX_BODY_BYTES as u64)
        .read_to_end(&mut upstream_body)
    {
        return HttpResponse::error(
            502,
            &format!("Failed to read detection backend response: {err}"),
        );
    }
    relay_upstream(status, &upstream_type, upstream_body)
}

/// JSON bodies pass through untouched. Anything else is wrapped so the
/// client always receives JSON.
pub(super) fn relay_upstream(status: u16, content_type: &str, body: Vec<u8>) -> HttpResponse {
    if serde_json::from_slice::<Value>(&body).is_ok() {
        let content_type = if content_type.is_empty() {
            "application/json"
        } else {
            content_type
        };
        return HttpResponse::raw(status, content_type, body);
    }

    let text = String::from_utf8_lossy(&body);
    let preview: String = text.chars().take(PREVIEW_CHARS).collect();
    let relay_status = if (200..300).contains(&status) { 502 } else { status };
    log::warn!(
        "detection backend returned non-JSON ({}, HTTP {})",
        if content_type.is_empty() { "no content type" } else { content_type },
        status
    );
    HttpResponse::json(
        relay_status,
        &json!({
            "error": "Detection backend returned a non-JSON response",
            "upstream_status": status,
            "upstream_content_type": content_type,
            "upstream_body_preview": preview,
        }),
    )
}
