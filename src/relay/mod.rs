//! Edge-function relay.
//!
//! Serves the two functions the browser client cannot perform itself:
//!
//! - `POST /predict-proxy`: forwards an image to the detection backend
//! - `POST /send-sms`: sends a message through the SMS provider
//!
//! plus `GET /health`. Every response carries permissive CORS headers and
//! `OPTIONS` preflights always succeed. Each accepted connection is handled
//! on its own thread so a slow upstream does not stall the listener.

mod http;
mod proxy;
mod sms;

pub use self::http::{HttpResponse, MAX_BODY_BYTES};

use crate::config::{RelayConfig, TwilioCredentials};
use anyhow::{anyhow, Result};
use self::http::{HttpRequest, Incoming};
use serde_json::json;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(180);

/// State shared by every connection.
struct RelayContext {
    predict_url: String,
    twilio: Option<TwilioCredentials>,
    agent: ureq::Agent,
}

#[derive(Debug)]
pub struct RelayHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl RelayHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("relay server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct RelayServer {
    cfg: RelayConfig,
}

impl RelayServer {
    pub fn new(cfg: RelayConfig) -> Self {
        Self { cfg }
    }

    pub fn spawn(self) -> Result<RelayHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        if self.cfg.twilio.is_none() {
            log::warn!("SMS provider not configured; /send-sms will answer 500");
        }
        let ctx = Arc::new(RelayContext {
            predict_url: self.cfg.predict_url(),
            twilio: self.cfg.twilio.clone(),
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(15))
                .timeout_read(UPSTREAM_TIMEOUT)
                .build(),
        });

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_relay(listener, ctx, shutdown_thread) {
                log::error!("relay stopped: {}", err);
            }
        });
        log::info!("relay listening on {}", addr);

        Ok(RelayHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_relay(
    listener: TcpListener,
    ctx: Arc<RelayContext>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let ctx = ctx.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &ctx) {
                        log::warn!("relay request from {} failed: {}", peer, err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(20));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, ctx: &RelayContext) -> Result<()> {
    stream.set_nonblocking(false)?;
    let response = match http::read_request(&mut stream)? {
        Incoming::TooLarge => HttpResponse::error(413, "Request body too large"),
        Incoming::Request(request) => {
            let response = route(&request, ctx);
            log::info!(
                "{} {} -> {}",
                request.method,
                request.path,
                response.status
            );
            response
        }
    };
    http::write_response(&mut stream, &response)
}

fn route(request: &HttpRequest, ctx: &RelayContext) -> HttpResponse {
    if request.method == "OPTIONS" {
        return HttpResponse::empty(200);
    }
    // Deployed functions live under /functions/v1/.
    let path = request
        .path
        .strip_prefix("/functions/v1")
        .unwrap_or(&request.path);
    match (request.method.as_str(), path) {
        ("GET", "/health") => HttpResponse::json(200, &json!({ "status": "ok" })),
        ("POST", "/predict-proxy") => proxy::handle(request, &ctx.agent, &ctx.predict_url),
        ("POST", "/send-sms") => sms::handle(request, &ctx.agent, ctx.twilio.as_ref()),
        (_, "/health" | "/predict-proxy" | "/send-sms") => {
            HttpResponse::error(405, "method_not_allowed")
        }
        _ => HttpResponse::error(404, "not_found"),
    }
}
