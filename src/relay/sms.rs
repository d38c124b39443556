use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use zeroize::Zeroizing;

use super::http::{HttpRequest, HttpResponse};
use crate::config::TwilioCredentials;

const NOT_CONFIGURED: &str = "SMS service not configured";
const MISSING_FIELDS: &str = "Missing 'to' or 'message' field";
const SEND_FAILED: &str = "Failed to send SMS";

pub(super) fn handle(
    request: &HttpRequest,
    agent: &ureq::Agent,
    twilio: Option<&TwilioCredentials>,
) -> HttpResponse {
    let Some(creds) = twilio else {
        log::error!("sms requested but provider credentials are missing");
        return HttpResponse::error(500, NOT_CONFIGURED);
    };

    let Some((to, message)) = parse_body(&request.body) else {
        return HttpResponse::error(400, MISSING_FIELDS);
    };
    send(agent, creds, &to, &message)
}

/// `(to, message)` when both are present and non-empty.
fn parse_body(body: &[u8]) -> Option<(String, String)> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };
    Some((field("to")?, field("message")?))
}

fn send(agent: &ureq::Agent, creds: &TwilioCredentials, to: &str, message: &str) -> HttpResponse {
    let credentials = Zeroizing::new(format!(
        "{}:{}",
        creds.account_sid,
        creds.auth_token.as_str()
    ));
    let authorization = Zeroizing::new(format!(
        "Basic {}",
        STANDARD.encode(credentials.as_bytes())
    ));

    let result = agent
        .post(&creds.messages_url())
        .set("Authorization", authorization.as_str())
        .send_form(&[("To", to), ("From", creds.from_number.as_str()), ("Body", message)]);
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(err)) => {
            log::error!("sms provider unreachable: {}", err);
            return HttpResponse::error(502, SEND_FAILED);
        }
    };

    let status = response.status();
    let reply: Value = match response.into_string().map(|body| serde_json::from_str(&body)) {
        Ok(Ok(value)) => value,
        _ => {
            log::error!("sms provider returned an unreadable reply (HTTP {})", status);
            return HttpResponse::error(502, SEND_FAILED);
        }
    };

    if !(200..300).contains(&status) {
        let message = reply
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(SEND_FAILED);
        log::error!("sms provider rejected message (HTTP {}): {}", status, message);
        return HttpResponse::error(status, message);
    }

    let sid = reply.get("sid").cloned().unwrap_or(Value::Null);
    log::info!("sms sent: {}", sid);
    HttpResponse::json(200, &json!({ "success": true, "sid": sid }))
}
