//! Relay server end to end: predict proxy, SMS relay, CORS and limits.

mod common;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{dead_url, FakeServer, Reply, PREDICTION_JSON};
use serde_json::{json, Value};
use weed_vision::config::TwilioCredentials;
use weed_vision::multipart::{self, MultipartBody};
use weed_vision::notify::SmsError;
use weed_vision::{
    ImageArtifact, RelayConfig, RelayHandle, RelayServer, SmsRelayClient, SubmissionClient,
    Submitter,
};
use zeroize::Zeroizing;

fn start_relay(backend_url: String, twilio: Option<TwilioCredentials>) -> RelayHandle {
    RelayServer::new(RelayConfig {
        addr: "127.0.0.1:0".to_string(),
        backend_url,
        twilio,
    })
    .spawn()
    .expect("relay")
}

fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(10))
        .build()
}

/// Status and body, whatever the status.
fn call(result: Result<ureq::Response, ureq::Error>) -> (u16, String, Value) {
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(err) => panic!("transport error: {err}"),
    };
    let status = response.status();
    let content_type = response.header("Content-Type").unwrap_or("").to_string();
    let body = response.into_string().expect("body");
    let value = serde_json::from_str(&body).unwrap_or(Value::Null);
    (status, content_type, value)
}

fn multipart_upload(field: &str) -> (String, Vec<u8>) {
    let mut body = MultipartBody::new();
    body.add_file(field, "plot.png", "image/png", b"\x89PNG-bytes");
    body.finish()
}

#[test]
fn multipart_upload_is_forwarded_and_json_relayed() {
    let backend = FakeServer::start(|_| Reply::json(200, PREDICTION_JSON));
    let relay = start_relay(backend.url(), None);
    let (content_type, body) = multipart_upload("image");

    let (status, reply_type, value) = call(
        agent()
            .post(&format!("http://{}/predict-proxy", relay.addr))
            .set("Content-Type", &content_type)
            .send_bytes(&body),
    );
    assert_eq!(status, 200);
    assert_eq!(reply_type, "application/json");
    assert_eq!(value["detections"].as_array().map(Vec::len), Some(3));

    let forwarded = &backend.requests()[0];
    assert_eq!(forwarded.path, "/predict");
    let parts = multipart::parse(
        forwarded.header("content-type").expect("content type"),
        &forwarded.body,
    )
    .expect("forwarded multipart");
    let names: Vec<_> = parts.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["file", "image"]);
    assert_eq!(parts[0].filename.as_deref(), Some("plot.png"));
    assert_eq!(parts[0].data, b"\x89PNG-bytes".to_vec());

    relay.stop().expect("stop relay");
}

#[test]
fn proxied_client_round_trips_through_relay() {
    let backend = FakeServer::start(|_| Reply::json(200, PREDICTION_JSON));
    let relay = start_relay(backend.url(), None);
    let client = SubmissionClient::proxied(
        format!("http://{}/functions/v1/predict-proxy", relay.addr),
        Some("anon".to_string()),
        Duration::from_secs(10),
    );
    let image = ImageArtifact::new(vec![1, 2, 3, 4], "image/webp", "leaf.webp").expect("image");

    let result = client.submit(&image).expect("prediction through relay");
    assert_eq!(result.detections[0].label, "Parthenium");

    let parts = multipart::parse(
        backend.requests()[0].header("content-type").expect("content type"),
        &backend.requests()[0].body,
    )
    .expect("multipart");
    assert_eq!(parts[0].data, vec![1, 2, 3, 4]);
    assert_eq!(parts[0].content_type.as_deref(), Some("image/webp"));
    relay.stop().expect("stop relay");
}

#[test]
fn json_data_url_is_accepted() {
    let backend = FakeServer::start(|_| Reply::json(200, PREDICTION_JSON));
    let relay = start_relay(backend.url(), None);
    let payload = json!({
        "dataUrl": format!("data:image/jpeg;base64,{}", STANDARD.encode([0xFF, 0xD8])),
        "filename": "snap.jpg",
    });

    let (status, _, _) = call(
        agent()
            .post(&format!("http://{}/predict-proxy", relay.addr))
            .set("Content-Type", "application/json")
            .send_string(&payload.to_string()),
    );
    assert_eq!(status, 200);
    assert_eq!(backend.requests().len(), 1);
    relay.stop().expect("stop relay");
}

#[test]
fn missing_image_is_400() {
    let backend = FakeServer::start(|_| Reply::json(200, PREDICTION_JSON));
    let relay = start_relay(backend.url(), None);
    let (content_type, body) = multipart_upload("attachment");

    let (status, _, value) = call(
        agent()
            .post(&format!("http://{}/predict-proxy", relay.addr))
            .set("Content-Type", &content_type)
            .send_bytes(&body),
    );
    assert_eq!(status, 400);
    assert_eq!(
        value["error"],
        "Missing image file (expected field 'file' or 'image')."
    );
    assert!(backend.requests().is_empty());
    relay.stop().expect("stop relay");
}

#[test]
fn html_upstream_gets_json_envelope() {
    let backend = FakeServer::start(|_| Reply::html(200, "<html>cold start</html>"));
    let relay = start_relay(backend.url(), None);
    let (content_type, body) = multipart_upload("file");

    let (status, reply_type, value) = call(
        agent()
            .post(&format!("http://{}/predict-proxy", relay.addr))
            .set("Content-Type", &content_type)
            .send_bytes(&body),
    );
    assert_eq!(status, 502);
    assert_eq!(reply_type, "application/json");
    assert_eq!(value["upstream_status"], 200);
    assert_eq!(value["upstream_content_type"], "text/html; charset=utf-8");
    assert_eq!(value["upstream_body_preview"], "<html>cold start</html>");
    relay.stop().expect("stop relay");
}

#[test]
fn upstream_error_json_keeps_status() {
    let backend = FakeServer::start(|_| Reply::json(500, r#"{"error":"model crashed"}"#));
    let relay = start_relay(backend.url(), None);
    let (content_type, body) = multipart_upload("file");

    let (status, _, value) = call(
        agent()
            .post(&format!("http://{}/predict-proxy", relay.addr))
            .set("Content-Type", &content_type)
            .send_bytes(&body),
    );
    assert_eq!(status, 500);
    assert_eq!(value["error"], "model crashed");
    relay.stop().expect("stop relay");
}

#[test]
fn unreachable_backend_is_502() {
    let relay = start_relay(dead_url(), None);
    let (content_type, body) = multipart_upload("file");

    let (status, _, value) = call(
        agent()
            .post(&format!("http://{}/predict-proxy", relay.addr))
            .set("Content-Type", &content_type)
            .send_bytes(&body),
    );
    assert_eq!(status, 502);
    assert!(value["error"]
        .as_str()
        .unwrap_or("")
        .starts_with("Failed to reach detection backend"));
    relay.stop().expect("stop relay");
}

#[test]
fn preflight_and_health_carry_cors_headers() {
    let relay = start_relay(dead_url(), None);

    let response = agent()
        .request("OPTIONS", &format!("http://{}/send-sms", relay.addr))
        .call()
        .expect("preflight");
    assert_eq!(response.status(), 200);
    assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));
    assert_eq!(
        response.header("Access-Control-Allow-Headers"),
        Some("authorization, x-client-info, apikey, content-type")
    );

    let (status, _, value) = call(
        agent()
            .get(&format!("http://{}/health", relay.addr))
            .call(),
    );
    assert_eq!(status, 200);
    assert_eq!(value, json!({"status": "ok"}));

    let (status, _, _) = call(agent().get(&format!("http://{}/nope", relay.addr)).call());
    assert_eq!(status, 404);
    relay.stop().expect("stop relay");
}

#[test]
fn oversized_body_is_413() {
    let relay = start_relay(dead_url(), None);
    let mut stream = TcpStream::connect(relay.addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("timeout");
    let head = format!(
        "POST /predict-proxy HTTP/1.1\r\nHost: relay\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
        20 * 1024 * 1024
    );
    stream.write_all(head.as_bytes()).expect("write head");

    let mut reply = String::new();
    stream.read_to_string(&mut reply).expect("read reply");
    assert!(reply.starts_with("HTTP/1.1 413"), "got {reply}");
    relay.stop().expect("stop relay");
}

#[test]
fn sms_without_credentials_is_500() {
    let relay = start_relay(dead_url(), None);
    let (status, _, value) = call(
        agent()
            .post(&format!("http://{}/send-sms", relay.addr))
            .set("Content-Type", "application/json")
            .send_string(r#"{"to":"+919876543210","message":"hello"}"#),
    );
    assert_eq!(status, 500);
    assert_eq!(value["error"], "SMS service not configured");
    relay.stop().expect("stop relay");
}

fn twilio(api_base: String) -> TwilioCredentials {
    TwilioCredentials {
        account_sid: "AC123".to_string(),
        auth_token: Zeroizing::new("tok".to_string()),
        from_number: "+15550001111".to_string(),
        api_base,
    }
}

#[test]
fn sms_is_forwarded_as_form_with_basic_auth() {
    let provider = FakeServer::start(|_| Reply::json(201, r#"{"sid":"SM42","status":"queued"}"#));
    let relay = start_relay(dead_url(), Some(twilio(provider.url())));

    let (status, _, value) = call(
        agent()
            .post(&format!("http://{}/send-sms", relay.addr))
            .set("Content-Type", "application/json")
            .send_string(r#"{"to":"+919876543210","message":"2 weeds found"}"#),
    );
    assert_eq!(status, 200);
    assert_eq!(value, json!({"success": true, "sid": "SM42"}));

    let request = &provider.requests()[0];
    assert_eq!(request.path, "/2010-04-01/Accounts/AC123/Messages.json");
    assert_eq!(
        request.header("authorization"),
        Some(format!("Basic {}", STANDARD.encode("AC123:tok")).as_str())
    );
    let form: Vec<(String, String)> = url::form_urlencoded::parse(&request.body)
        .into_owned()
        .collect();
    assert!(form.contains(&("To".to_string(), "+919876543210".to_string())));
    assert!(form.contains(&("From".to_string(), "+15550001111".to_string())));
    assert!(form.contains(&("Body".to_string(), "2 weeds found".to_string())));
    relay.stop().expect("stop relay");
}

#[test]
fn sms_provider_error_is_relayed() {
    let provider = FakeServer::start(|_| {
        Reply::json(400, r#"{"code":21211,"message":"The 'To' number is not valid."}"#)
    });
    let relay = start_relay(dead_url(), Some(twilio(provider.url())));

    let (status, _, value) = call(
        agent()
            .post(&format!("http://{}/send-sms", relay.addr))
            .set("Content-Type", "application/json")
            .send_string(r#"{"to":"+91000","message":"hi"}"#),
    );
    assert_eq!(status, 400);
    assert_eq!(value["error"], "The 'To' number is not valid.");

    let (status, _, value) = call(
        agent()
            .post(&format!("http://{}/send-sms", relay.addr))
            .set("Content-Type", "application/json")
            .send_string(r#"{"to":"+919876543210"}"#),
    );
    assert_eq!(status, 400);
    assert_eq!(value["error"], "Missing 'to' or 'message' field");
    relay.stop().expect("stop relay");
}

#[test]
fn sms_client_goes_through_relay() {
    let provider = FakeServer::start(|_| Reply::json(201, r#"{"sid":"SM7"}"#));
    let relay = start_relay(dead_url(), Some(twilio(provider.url())));
    let client = SmsRelayClient::new(
        format!("http://{}/functions/v1/send-sms", relay.addr),
        Some("anon".to_string()),
    );

    assert!(matches!(
        client.send("12345", "hello"),
        Err(SmsError::Input(_))
    ));
    assert!(provider.requests().is_empty());

    let sid = client.send("98765 43210", "hello").expect("sms sent");
    assert_eq!(sid.as_deref(), Some("SM7"));
    let form: Vec<(String, String)> = url::form_urlencoded::parse(&provider.requests()[0].body)
        .into_owned()
        .collect();
    assert!(form.contains(&("To".to_string(), "+919876543210".to_string())));
    relay.stop().expect("stop relay");
}
