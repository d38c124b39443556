//! Minimal `multipart/form-data` encoding and parsing.
//!
//! Only what the predict path needs: file parts and text fields, one level
//! deep, no nested multiparts, no transfer encodings.

use anyhow::{anyhow, Result};
use rand::RngCore;

/// Builder for an outgoing multipart body.
pub struct MultipartBody {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        let suffix: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        Self::with_boundary(format!("----weedvision{suffix}"))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            body: Vec::new(),
        }
    }

    pub fn add_file(&mut self, field: &str, filename: &str, mime_type: &str, bytes: &[u8]) {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                escape_quoted(field),
                escape_quoted(filename)
            )
            .as_bytes(),
        );
        self.body
            .extend_from_slice(format!("Content-Type: {mime_type}\r\n\r\n").as_bytes());
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
    }

    pub fn add_text(&mut self, field: &str, value: &str) {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                escape_quoted(field)
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
    }

    /// Close the body. Returns `(content_type, bytes)`.
    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            self.body,
        )
    }
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}

/// One parsed part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Extract the boundary parameter from a `multipart/form-data` content type.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let kind = params.next()?.trim();
    if !kind.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// Split a multipart body into parts.
pub fn parse(content_type: &str, body: &[u8]) -> Result<Vec<Part>> {
    let boundary = boundary_from_content_type(content_type)
        .ok_or_else(|| anyhow!("missing multipart boundary"))?;
    let delimiter = format!("--{boundary}").into_bytes();

    let mut parts = Vec::new();
    let mut cursor = find(body, &delimiter, 0).ok_or_else(|| anyhow!("no multipart parts"))?;
    loop {
        cursor += delimiter.len();
        if body[cursor..].starts_with(b"--") {
            break;
        }
        cursor = skip_crlf(body, cursor);
        let next = find(body, &delimiter, cursor)
            .ok_or_else(|| anyhow!("unterminated multipart part"))?;
        // Part content ends with CRLF before the next delimiter.
        let mut end = next;
        if end >= cursor + 2 && &body[end - 2..end] == b"\r\n" {
            end -= 2;
        }
        parts.push(parse_part(&body[cursor..end])?);
        cursor = next;
    }
    Ok(parts)
}

fn parse_part(raw: &[u8]) -> Result<Part> {
    let split = find(raw, b"\r\n\r\n", 0).ok_or_else(|| anyhow!("multipart part without headers"))?;
    let headers = String::from_utf8_lossy(&raw[..split]);
    let data = raw[split + 4..].to_vec();

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;
    for line in headers.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim().to_lowercase().as_str() {
            "content-disposition" => {
                for param in value.split(';').skip(1) {
                    if let Some((k, v)) = param.split_once('=') {
                        let v = v.trim().trim_matches('"').to_string();
                        match k.trim().to_lowercase().as_str() {
                            "name" => name = Some(v),
                            "filename" => filename = Some(v),
                            _ => {}
                        }
                    }
                }
            }
            "content-type" => content_type = Some(value.trim().to_string()),
            _ => {}
        }
    }

    Ok(Part {
        name: name.ok_or_else(|| anyhow!("multipart part without a name"))?,
        filename,
        content_type,
        data,
    })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

fn skip_crlf(body: &[u8], cursor: usize) -> usize {
    if body[cursor..].starts_with(b"\r\n") {
        cursor + 2
    } else {
        cursor
    }
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
