//! Backend health badge.
//!
//! The detection backend sleeps when idle and takes a while to wake. The
//! badge distinguishes a backend that answers `/health` (online), one that
//! answers something (starting) and one that does not answer at all
//! (offline).

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const TICK: Duration = Duration::from_millis(25);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    Checking,
    Online,
    Starting,
    Offline,
}

impl BackendStatus {
    pub fn label(self) -> &'static str {
        match self {
            BackendStatus::Checking => "Checking...",
            BackendStatus::Online => "Online",
            BackendStatus::Starting => "Starting...",
            BackendStatus::Offline => "Offline",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    /// 2xx with a healthy JSON body.
    Healthy,
    /// The backend answered, but not healthy.
    Unhealthy,
    /// No usable answer: transport error, timeout or unparseable body.
    Failed,
}

pub trait HealthCheck: Send {
    fn check(&mut self) -> CheckOutcome;
    /// Fallback reachability check; any HTTP response counts.
    fn ping(&mut self) -> bool;
}

pub fn evaluate(checker: &mut dyn HealthCheck) -> BackendStatus {
    match checker.check() {
        CheckOutcome::Healthy => BackendStatus::Online,
        CheckOutcome::Unhealthy => BackendStatus::Starting,
        CheckOutcome::Failed => {
            if checker.ping() {
                BackendStatus::Starting
            } else {
                BackendStatus::Offline
            }
        }
    }
}

/// `{"status":"ok"}` or `{"ok":true}`.
pub fn is_healthy_body(value: &Value) -> bool {
    value.get("status").and_then(Value::as_str) == Some("ok")
        || value.get("ok").and_then(Value::as_bool) == Some(true)
}

/// Health check against `<base>/health`.
pub struct HttpHealthCheck {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpHealthCheck {
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(CHECK_TIMEOUT).build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }
}

impl HealthCheck for HttpHealthCheck {
    fn check(&mut self) -> CheckOutcome {
        let response = match self.agent.get(&self.health_url()).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                log::debug!("health check answered HTTP {}", status);
                return CheckOutcome::Unhealthy;
            }
            Err(ureq::Error::Transport(err)) => {
                log::debug!("health check failed: {}", err);
                return CheckOutcome::Failed;
            }
        };
        let body = match response.into_string() {
            Ok(body) => body,
            Err(_) => return CheckOutcome::Failed,
        };
        match serde_json::from_str::<Value>(&body) {
            Ok(value) if is_healthy_body(&value) => CheckOutcome::Healthy,
            Ok(_) => CheckOutcome::Unhealthy,
            Err(_) => CheckOutcome::Failed,
        }
    }

    fn ping(&mut self) -> bool {
        match self.agent.get(&self.base_url).call() {
            Ok(_) | Err(ureq::Error::Status(..)) => true,
            Err(ureq::Error::Transport(_)) => false,
        }
    }
}

/// Background poller: checks at start, then every `interval`.
pub struct HealthPoller;

impl HealthPoller {
    pub fn spawn<F>(
        mut checker: Box<dyn HealthCheck>,
        interval: Duration,
        on_status: F,
    ) -> PollerHandle
    where
        F: Fn(BackendStatus) + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let refresh = Arc::new(AtomicBool::new(false));
        let latest = Arc::new(Mutex::new(BackendStatus::Checking));

        let shutdown_thread = shutdown.clone();
        let refresh_thread = refresh.clone();
        let latest_thread = latest.clone();
        let join = std::thread::spawn(move || {
            let publish = |status: BackendStatus| {
                if let Ok(mut slot) = latest_thread.lock() {
                    *slot = status;
                }
                on_status(status);
            };
            while !shutdown_thread.load(Ordering::SeqCst) {
                publish(BackendStatus::Checking);
                let status = evaluate(checker.as_mut());
                if shutdown_thread.load(Ordering::SeqCst) {
                    break;
                }
                log::debug!("backend status: {:?}", status);
                publish(status);

                let next = Instant::now() + interval;
                while Instant::now() < next {
                    if shutdown_thread.load(Ordering::SeqCst)
                        || refresh_thread.swap(false, Ordering::SeqCst)
                    {
                        break;
                    }
                    std::thread::sleep(TICK.min(interval));
                }
            }
        });

        PollerHandle {
            shutdown,
            refresh,
            latest,
            join: Some(join),
        }
    }
}

pub struct PollerHandle {
    shutdown: Arc<AtomicBool>,
    refresh: Arc<AtomicBool>,
    latest: Arc<Mutex<BackendStatus>>,
    join: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Check again now instead of waiting for the interval.
    pub fn refresh(&self) {
        self.refresh.store(true, Ordering::SeqCst);
    }

    pub fn status(&self) -> BackendStatus {
        self.latest
            .lock()
            .map(|status| *status)
            .unwrap_or(BackendStatus::Checking)
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("health poller thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
