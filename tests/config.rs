use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use weed_vision::{BackendMode, RelayConfig, WeedVisionConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "WEEDVISION_CONFIG",
        "WEEDVISION_BACKEND_MODE",
        "WEEDVISION_LOCAL_ENDPOINT",
        "WEEDVISION_PROXY_URL",
        "WEEDVISION_PROXY_KEY",
        "WEEDVISION_HEALTH_URL",
        "WEEDVISION_HEALTH_INTERVAL_SECS",
        "WEEDVISION_REQUEST_TIMEOUT_SECS",
        "WEEDVISION_SMS_RELAY_URL",
        "WEEDVISION_PREFS_PATH",
        "WEEDVISION_RELAY_ADDR",
        "FLASK_BACKEND_URL",
        "TWILIO_ACCOUNT_SID",
        "TWILIO_AUTH_TOKEN",
        "TWILIO_PHONE_NUMBER",
        "TWILIO_API_BASE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "backend": {
            "mode": "proxied",
            "local_endpoint": "http://10.0.0.5:5000/predict",
            "proxy_url": "https://example.supabase.co/functions/v1/predict-proxy",
            "proxy_key": "file-key",
            "request_timeout_secs": 90
        },
        "health": {
            "url": "https://backend.example.com",
            "interval_secs": 45
        },
        "sms_relay_url": "https://example.supabase.co/functions/v1/send-sms",
        "prefs_path": "/tmp/weedvision-prefs.json"
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("WEEDVISION_CONFIG", file.path());
    std::env::set_var("WEEDVISION_PROXY_KEY", "env-key");
    std::env::set_var("WEEDVISION_HEALTH_INTERVAL_SECS", "15");

    let cfg = WeedVisionConfig::load().expect("load config");

    assert_eq!(cfg.backend_mode, BackendMode::Proxied);
    assert_eq!(cfg.local_endpoint, "http://10.0.0.5:5000/predict");
    assert_eq!(
        cfg.proxy_url.as_deref(),
        Some("https://example.supabase.co/functions/v1/predict-proxy")
    );
    assert_eq!(cfg.proxy_key.as_deref(), Some("env-key"));
    assert_eq!(cfg.request_timeout, Duration::from_secs(90));
    assert_eq!(cfg.health_endpoint(), "https://backend.example.com/health");
    assert_eq!(cfg.health_interval, Duration::from_secs(15));
    assert_eq!(
        cfg.sms_relay_url.as_deref(),
        Some("https://example.supabase.co/functions/v1/send-sms")
    );
    assert_eq!(cfg.prefs_path.to_str(), Some("/tmp/weedvision-prefs.json"));

    clear_env();
}

#[test]
fn toml_config_is_read_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
sms_relay_url = "http://127.0.0.1:8787/send-sms"

[backend]
mode = "local"
local_endpoint = "http://127.0.0.1:5000/predict"

[relay]
addr = "0.0.0.0:9000"
backend_url = "http://detector:5000"
"#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("WEEDVISION_CONFIG", file.path());

    let cfg = WeedVisionConfig::load().expect("load config");
    assert_eq!(cfg.backend_mode, BackendMode::Local);
    assert_eq!(cfg.local_endpoint, "http://127.0.0.1:5000/predict");

    let relay = RelayConfig::load().expect("load relay config");
    assert_eq!(relay.addr, "0.0.0.0:9000");
    assert_eq!(relay.predict_url(), "http://detector:5000/predict");
    assert!(relay.twilio.is_none());

    clear_env();
}

#[test]
fn proxied_mode_without_url_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    std::env::set_var("WEEDVISION_BACKEND_MODE", "proxied");
    assert!(WeedVisionConfig::load().is_err());

    std::env::set_var("WEEDVISION_PROXY_URL", "ftp://example.com/predict");
    assert!(WeedVisionConfig::load().is_err());

    std::env::set_var("WEEDVISION_PROXY_URL", "https://example.com/predict-proxy");
    assert!(WeedVisionConfig::load().is_ok());

    std::env::set_var("WEEDVISION_HEALTH_INTERVAL_SECS", "soon");
    assert!(WeedVisionConfig::load().is_err());

    clear_env();
}

#[test]
fn relay_credentials_from_env() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    clear_env();

    std::env::set_var("WEEDVISION_RELAY_ADDR", "127.0.0.1:0");
    std::env::set_var("FLASK_BACKEND_URL", "https://weed-vision-ai.onrender.com/");
    std::env::set_var("TWILIO_ACCOUNT_SID", "AC999");
    std::env::set_var("TWILIO_AUTH_TOKEN", "secret-token");
    std::env::set_var("TWILIO_PHONE_NUMBER", "+15550002222");

    let relay = RelayConfig::load().expect("relay config");
    assert_eq!(relay.predict_url(), "https://weed-vision-ai.onrender.com/predict");
    let twilio = relay.twilio.as_ref().expect("credentials");
    assert_eq!(
        twilio.messages_url(),
        "https://api.twilio.com/2010-04-01/Accounts/AC999/Messages.json"
    );
    assert!(!format!("{relay:?}").contains("secret-token"));

    std::env::remove_var("TWILIO_PHONE_NUMBER");
    let relay = RelayConfig::load().expect("relay config");
    assert!(relay.twilio.is_none());

    clear_env();
}
