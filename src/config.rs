use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use zeroize::Zeroizing;

const DEFAULT_LOCAL_ENDPOINT: &str = "http://localhost:5000/predict";
const DEFAULT_HEALTH_URL: &str = "http://localhost:5000";
const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 180;
const DEFAULT_PREFS_PATH: &str = "weedvision_prefs.json";
const DEFAULT_RELAY_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_RELAY_BACKEND_URL: &str = "http://localhost:5000";
const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Where submissions go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Multipart POST straight to a co-located backend.
    #[default]
    Local,
    /// Base64 JSON POST to the predict proxy.
    Proxied,
}

impl FromStr for BackendMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "local" => Ok(BackendMode::Local),
            "proxied" | "proxy" => Ok(BackendMode::Proxied),
            other => Err(anyhow!(
                "unknown backend mode '{}'; expected 'local' or 'proxied'",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    backend: Option<BackendConfigFile>,
    health: Option<HealthConfigFile>,
    sms_relay_url: Option<String>,
    prefs_path: Option<PathBuf>,
    relay: Option<RelayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct BackendConfigFile {
    mode: Option<BackendMode>,
    local_endpoint: Option<String>,
    proxy_url: Option<String>,
    proxy_key: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct HealthConfigFile {
    url: Option<String>,
    interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RelayConfigFile {
    addr: Option<String>,
    backend_url: Option<String>,
    twilio_account_sid: Option<String>,
    twilio_auth_token: Option<String>,
    twilio_phone_number: Option<String>,
    twilio_api_base: Option<String>,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct WeedVisionConfig {
    pub backend_mode: BackendMode,
    pub local_endpoint: String,
    pub proxy_url: Option<String>,
    /// Public anon key sent as `Authorization: Bearer` and `apikey`.
    pub proxy_key: Option<String>,
    pub request_timeout: Duration,
    /// Base URL; `/health` is appended.
    pub health_url: String,
    pub health_interval: Duration,
    pub sms_relay_url: Option<String>,
    pub prefs_path: PathBuf,
}

impl Default for WeedVisionConfig {
    fn default() -> Self {
        Self::from_file(ConfigFile::default())
    }
}

impl WeedVisionConfig {
    pub fn load() -> Result<Self> {
        let file_cfg = load_config_file()?;
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> Self {
        let backend = file.backend.unwrap_or_default();
        let health = file.health.unwrap_or_default();
        Self {
            backend_mode: backend.mode.unwrap_or_default(),
            local_endpoint: backend
                .local_endpoint
                .unwrap_or_else(|| DEFAULT_LOCAL_ENDPOINT.to_string()),
            proxy_url: backend.proxy_url,
            proxy_key: backend.proxy_key,
            request_timeout: Duration::from_secs(
                backend
                    .request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            health_url: health
                .url
                .unwrap_or_else(|| DEFAULT_HEALTH_URL.to_string()),
            health_interval: Duration::from_secs(
                health.interval_secs.unwrap_or(DEFAULT_HEALTH_INTERVAL_SECS),
            ),
            sms_relay_url: file.sms_relay_url,
            prefs_path: file
                .prefs_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PREFS_PATH)),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(mode) = env_value("WEEDVISION_BACKEND_MODE") {
            self.backend_mode = mode.parse()?;
        }
        if let Some(endpoint) = env_value("WEEDVISION_LOCAL_ENDPOINT") {
            self.local_endpoint = endpoint;
        }
        if let Some(url) = env_value("WEEDVISION_PROXY_URL") {
            self.proxy_url = Some(url);
        }
        if let Some(key) = env_value("WEEDVISION_PROXY_KEY") {
            self.proxy_key = Some(key);
        }
        if let Some(url) = env_value("WEEDVISION_HEALTH_URL") {
            self.health_url = url;
        }
        if let Some(interval) = env_value("WEEDVISION_HEALTH_INTERVAL_SECS") {
            let seconds: u64 = interval.parse().map_err(|_| {
                anyhow!("WEEDVISION_HEALTH_INTERVAL_SECS must be an integer number of seconds")
            })?;
            self.health_interval = Duration::from_secs(seconds);
        }
        if let Some(timeout) = env_value("WEEDVISION_REQUEST_TIMEOUT_SECS") {
            let seconds: u64 = timeout.parse().map_err(|_| {
                anyhow!("WEEDVISION_REQUEST_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.request_timeout = Duration::from_secs(seconds);
        }
        if let Some(url) = env_value("WEEDVISION_SMS_RELAY_URL") {
            self.sms_relay_url = Some(url);
        }
        if let Some(path) = env_value("WEEDVISION_PREFS_PATH") {
            self.prefs_path = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        check_url("local endpoint", &self.local_endpoint)?;
        check_url("health url", &self.health_url)?;
        match (&self.backend_mode, &self.proxy_url) {
            (BackendMode::Proxied, None) => {
                return Err(anyhow!(
                    "backend mode 'proxied' requires a proxy url (WEEDVISION_PROXY_URL)"
                ))
            }
            (_, Some(url)) => check_url("proxy url", url)?,
            _ => {}
        }
        if let Some(url) = &self.sms_relay_url {
            check_url("sms relay url", url)?;
        }
        if self.health_interval.is_zero() {
            return Err(anyhow!("health interval must be greater than zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(anyhow!("request timeout must be greater than zero"));
        }
        Ok(())
    }

    /// Full URL of the health endpoint.
    pub fn health_endpoint(&self) -> String {
        format!("{}/health", self.health_url.trim_end_matches('/'))
    }
}

/// SMS provider credentials. The auth token is wiped on drop.
#[derive(Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: Zeroizing<String>,
    pub from_number: String,
    pub api_base: String,
}

impl fmt::Debug for TwilioCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwilioCredentials")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("from_number", &self.from_number)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TwilioCredentials {
    pub fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base.trim_end_matches('/'),
            self.account_sid
        )
    }
}

/// Relay server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub addr: String,
    /// Upstream detection backend; `/predict` is appended.
    pub backend_url: String,
    /// `None` when any credential is missing; `/send-sms` then answers 500.
    pub twilio: Option<TwilioCredentials>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_RELAY_ADDR.to_string(),
            backend_url: DEFAULT_RELAY_BACKEND_URL.to_string(),
            twilio: None,
        }
    }
}

impl RelayConfig {
    pub fn load() -> Result<Self> {
        let file = load_config_file()?.relay.unwrap_or_default();

        let addr = env_value("WEEDVISION_RELAY_ADDR")
            .or(file.addr)
            .unwrap_or_else(|| DEFAULT_RELAY_ADDR.to_string());
        let backend_url = env_value("FLASK_BACKEND_URL")
            .or(file.backend_url)
            .unwrap_or_else(|| DEFAULT_RELAY_BACKEND_URL.to_string());
        let sid = env_value("TWILIO_ACCOUNT_SID").or(file.twilio_account_sid);
        let token = env_value("TWILIO_AUTH_TOKEN").or(file.twilio_auth_token);
        let from = env_value("TWILIO_PHONE_NUMBER").or(file.twilio_phone_number);
        let api_base = env_value("TWILIO_API_BASE")
            .or(file.twilio_api_base)
            .unwrap_or_else(|| DEFAULT_TWILIO_API_BASE.to_string());

        let twilio = match (sid, token, from) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioCredentials {
                account_sid,
                auth_token: Zeroizing::new(auth_token),
                from_number,
                api_base,
            }),
            (None, None, None) => None,
            _ => {
                log::warn!("incomplete SMS provider credentials; /send-sms is disabled");
                None
            }
        };

        let cfg = Self {
            addr,
            backend_url,
            twilio,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.addr
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("invalid relay address '{}'", self.addr))?;
        check_url("backend url", &self.backend_url)?;
        if let Some(twilio) = &self.twilio {
            check_url("sms provider api base", &twilio.api_base)?;
        }
        Ok(())
    }

    pub fn predict_url(&self) -> String {
        format!("{}/predict", self.backend_url.trim_end_matches('/'))
    }
}

fn load_config_file() -> Result<ConfigFile> {
    match env_value("WEEDVISION_CONFIG") {
        Some(path) => read_config_file(Path::new(&path)),
        None => Ok(ConfigFile::default()),
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn check_url(what: &str, value: &str) -> Result<()> {
    let url = url::Url::parse(value).with_context(|| format!("invalid {what} '{value}'"))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(anyhow!("{what} must use http or https, got '{other}'")),
    }
}
