//! weedvision_relay - edge-function relay for Weed Vision
//!
//! This daemon:
//! 1. Forwards images posted to /predict-proxy to the detection backend
//! 2. Sends SMS posted to /send-sms through the SMS provider
//! 3. Answers CORS preflights so browsers can call both

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::mpsc;

use weed_vision::{RelayConfig, RelayServer};

#[derive(Parser, Debug)]
#[command(
    name = "weedvision_relay",
    version,
    about = "Predict proxy and SMS relay for Weed Vision clients"
)]
struct Args {
    /// Listen address (overrides WEEDVISION_RELAY_ADDR)
    #[arg(long, value_name = "ADDR")]
    addr: Option<String>,

    /// Detection backend base URL (overrides FLASK_BACKEND_URL)
    #[arg(long, value_name = "URL")]
    backend_url: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = RelayConfig::load()?;
    if let Some(addr) = args.addr {
        cfg.addr = addr;
    }
    if let Some(url) = args.backend_url {
        cfg.backend_url = url;
    }
    cfg.validate()?;

    let backend = cfg.predict_url();
    let sms_enabled = cfg.twilio.is_some();
    let handle = RelayServer::new(cfg).spawn()?;
    log::info!("forwarding predictions to {}", backend);
    log::info!(
        "sms relay {}",
        if sms_enabled { "enabled" } else { "disabled (no provider credentials)" }
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("weedvision_relay on {}; waiting for shutdown signal (Ctrl-C)...", handle.addr);
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping relay...");
    handle.stop()?;

    Ok(())
}
