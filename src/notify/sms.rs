use std::fmt::Write as _;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::detect::Detection;
use crate::InputError;

const COUNTRY_PREFIX: &str = "+91";
const SMS_HEADER: &str = "🌱 Weed Detection Results:\n";
const SMS_FOOTER: &str = "\n\n🚜 Weed Vision AI - Kisan ka Saathi";

/// Strip everything but digits; exactly ten must remain.
pub fn normalize_phone(input: &str) -> Result<String, InputError> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 10 {
        return Err(InputError::InvalidPhone);
    }
    Ok(format!("{COUNTRY_PREFIX}{digits}"))
}

pub fn format_sms(detections: &[Detection]) -> String {
    let mut body = String::from(SMS_HEADER);
    for (i, detection) in detections.iter().enumerate() {
        if i > 0 {
            body.push('\n');
        }
        let _ = write!(
            body,
            "{}. {} ({:.0}%)",
            i + 1,
            detection.label,
            detection.confidence.percent()
        );
        if let Some(treatment) = &detection.treatment {
            let _ = write!(
                body,
                "\n   💊 {}: {} - {}",
                treatment.name, treatment.quantity, treatment.frequency
            );
        }
    }
    body.push_str(SMS_FOOTER);
    body
}

#[derive(Debug, Error)]
pub enum SmsError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("could not reach the SMS relay: {0}")]
    Connection(String),
    #[error("SMS relay returned HTTP {status}: {message}")]
    Relay { status: u16, message: String },
}

#[derive(Deserialize)]
struct RelayReply {
    #[serde(default)]
    success: bool,
    sid: Option<String>,
    error: Option<String>,
}

/// Client for the relay's `/send-sms` function.
pub struct SmsRelayClient {
    url: String,
    key: Option<String>,
    agent: ureq::Agent,
}

impl SmsRelayClient {
    pub fn new(url: impl Into<String>, key: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        Self {
            url: url.into(),
            key,
            agent,
        }
    }

    /// Validate, then send. Returns the provider message id when known.
    pub fn send(&self, phone: &str, message: &str) -> Result<Option<String>, SmsError> {
        let to = normalize_phone(phone)?;
        if message.trim().is_empty() {
            return Err(InputError::EmptyMessage.into());
        }

        let payload = json!({ "to": to, "message": message });
        let mut request = self.agent.post(&self.url).set("Content-Type", "application/json");
        if let Some(key) = &self.key {
            request = request
                .set("Authorization", &format!("Bearer {key}"))
                .set("apikey", key);
        }
        let response = match request.send_string(&payload.to_string()) {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => return Err(SmsError::Connection(err.to_string())),
        };
        let status = response.status();
        let body = response
            .into_string()
            .map_err(|e| SmsError::Connection(e.to_string()))?;
        let reply: Option<RelayReply> = serde_json::from_str(&body).ok();

        match reply {
            Some(reply) if (200..300).contains(&status) && reply.success => {
                log::info!("sms queued for {}", mask_phone(&to));
                Ok(reply.sid)
            }
            Some(reply) => Err(SmsError::Relay {
                status,
                message: reply
                    .error
                    .unwrap_or_else(|| "Failed to send SMS".to_string()),
            }),
            None => Err(SmsError::Relay {
                status,
                message: "SMS relay returned a non-JSON response".to_string(),
            }),
        }
    }
}

/// `+91XXXXXX1234` for logs.
fn mask_phone(phone: &str) -> String {
    let visible = phone.len().saturating_sub(4);
    phone
        .char_indices()
        .map(|(i, c)| if i >= 3 && i < visible { 'X' } else { c })
        .collect()
}
