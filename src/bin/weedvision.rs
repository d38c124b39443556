//! weedvision - command-line client for the Weed Vision detection service
//!
//! Picks or captures a field image, submits it to the configured backend
//! and prints the detections with fertilizer recommendations.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use weed_vision::geo::{self, LatLon};
use weed_vision::render;
use weed_vision::ui::Ui;
use weed_vision::{
    format_sms, share_text, whatsapp_url, App, BackendMode, BackendStatus, Catalog, FacingMode,
    HealthCheck, HealthPoller, HttpHealthCheck, Language, PredictionResult, Preferences,
    SmsRelayClient, SubmissionClient, Theme, WeedVisionConfig,
};

const CAMERA_READY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "weedvision", version, about = "Weed detection client")]
struct Args {
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, env = "WEEDVISION_UI", default_value = "auto", value_name = "MODE")]
    ui: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit an image file for detection
    Detect {
        /// JPG, PNG or WEBP image
        path: PathBuf,
        #[command(flatten)]
        submit: SubmitArgs,
    },
    /// Capture a still from a camera device and optionally submit it
    Capture {
        /// Camera device: stub://<name>, or a V4L2 node such as /dev/video0
        #[arg(long, default_value = "stub://field_camera")]
        device: String,
        /// Preferred facing mode (environment|user)
        #[arg(long, default_value = "environment")]
        facing: FacingMode,
        /// Where to write the captured JPEG
        #[arg(long, default_value = "captured-image.jpg", value_name = "PATH")]
        output: PathBuf,
        /// Submit the still after capturing
        #[arg(long)]
        detect: bool,
        #[command(flatten)]
        submit: SubmitArgs,
    },
    /// Check backend health once, or keep watching
    Health {
        #[arg(long)]
        watch: bool,
    },
    /// Send a saved result by SMS through the relay
    Sms {
        /// 10-digit mobile number
        #[arg(long)]
        phone: String,
        /// Result JSON written by `detect --save`
        #[arg(long, value_name = "PATH")]
        result: PathBuf,
        /// Print the message instead of sending it
        #[arg(long)]
        dry_run: bool,
    },
    /// Print a share message and WhatsApp link for a saved result
    Share {
        #[arg(long, value_name = "PATH")]
        result: PathBuf,
        /// en|hi|mr; defaults to the saved preference
        #[arg(long)]
        lang: Option<Language>,
    },
    /// Show or update saved preferences
    Prefs {
        #[arg(long)]
        theme: Option<Theme>,
        #[arg(long)]
        lang: Option<Language>,
    },
    /// Rank nearby shops from an Overpass API response
    Shops {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Overpass JSON response
        #[arg(long, value_name = "PATH")]
        overpass: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct SubmitArgs {
    /// Backend mode (local|proxied); overrides WEEDVISION_BACKEND_MODE
    #[arg(long)]
    mode: Option<BackendMode>,
    /// Print the raw result as JSON
    #[arg(long)]
    json: bool,
    /// Save the result as JSON for `sms` and `share`
    #[arg(long, value_name = "PATH")]
    save: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = Ui::detect(Some(&args.ui));
    let config = WeedVisionConfig::load()?;

    match args.command {
        Command::Detect { path, submit } => {
            let mut app = App::new(with_mode(config, submit.mode)?);
            app.select_path(&path).map_err(|e| anyhow!(e.user_message()))?;
            run_submission(&ui, &mut app, &submit)
        }
        Command::Capture {
            device,
            facing,
            output,
            detect,
            submit,
        } => {
            let mut app = App::new(with_mode(config, submit.mode)?);
            capture_still(&ui, &mut app, &device, facing, &output)?;
            if detect {
                run_submission(&ui, &mut app, &submit)?;
            }
            Ok(())
        }
        Command::Health { watch } => run_health(&config, watch),
        Command::Sms {
            phone,
            result,
            dry_run,
        } => {
            let result = load_result(&result)?;
            let message = format_sms(&result.detections);
            if dry_run {
                println!("{message}");
                return Ok(());
            }
            let url = config
                .sms_relay_url
                .clone()
                .ok_or_else(|| anyhow!("WEEDVISION_SMS_RELAY_URL is not configured"))?;
            let client = SmsRelayClient::new(url, config.proxy_key.clone());
            let sid = {
                let _stage = ui.stage("Send SMS");
                client.send(&phone, &message)?
            };
            println!("SMS sent{}", sid.map(|s| format!(" ({s})")).unwrap_or_default());
            Ok(())
        }
        Command::Share { result, lang } => {
            let result = load_result(&result)?;
            let lang = match lang {
                Some(lang) => lang,
                None => Preferences::load(&config.prefs_path)?.language,
            };
            let text = share_text(&result.detections, lang);
            println!("{text}\n");
            println!("{}", whatsapp_url(&text));
            Ok(())
        }
        Command::Prefs { theme, lang } => {
            let mut prefs = Preferences::load(&config.prefs_path)?;
            if theme.is_some() || lang.is_some() {
                prefs.theme = theme.unwrap_or(prefs.theme);
                prefs.language = lang.unwrap_or(prefs.language);
                prefs.save(&config.prefs_path)?;
            }
            println!("{}", serde_json::to_string_pretty(&prefs)?);
            Ok(())
        }
        Command::Shops { lat, lon, overpass } => {
            let origin = LatLon { lat, lon };
            let elements = match overpass {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    geo::parse_overpass(&raw)?
                }
                None => Vec::new(),
            };
            for shop in geo::rank_shops(origin, &elements) {
                println!("{:>8}  {}  ({})", shop.distance_text(), shop.name, shop.address);
                println!("          {}", shop.maps_url);
            }
            Ok(())
        }
    }
}

fn with_mode(mut config: WeedVisionConfig, mode: Option<BackendMode>) -> Result<WeedVisionConfig> {
    if let Some(mode) = mode {
        config.backend_mode = mode;
        config.validate()?;
    }
    Ok(config)
}

fn run_submission(ui: &Ui, app: &mut App, args: &SubmitArgs) -> Result<()> {
    let client = SubmissionClient::from_config(app.config());
    log::info!("backend: {:?} at {}", client.mode(), client.endpoint());

    let outcome = {
        let stage = ui.stage("Analyzing image");
        match app.submit_current(&client) {
            Ok(result) => result.cloned(),
            Err(err) => {
                let message = err.user_message();
                stage.fail(&message);
                return Err(anyhow!(message));
            }
        }
    };
    let result = outcome.ok_or_else(|| anyhow!("submission was discarded"))?;

    if let Some(path) = &args.save {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("result saved to {}", path.display());
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", render::render_report(&result, &Catalog::builtin()));
    }
    Ok(())
}

fn capture_still(
    ui: &Ui,
    app: &mut App,
    device: &str,
    facing: FacingMode,
    output: &Path,
) -> Result<()> {
    let camera = weed_vision::capture::open_device(device)?;
    {
        let mut stage = ui.stage("Opening camera");
        let started = Instant::now();
        let mut state = app
            .open_camera(camera, facing)
            .map_err(|e| anyhow!(e.user_message()))?;
        while state != weed_vision::CameraState::Ready {
            if started.elapsed() > CAMERA_READY_TIMEOUT {
                app.close_camera();
                stage.fail("camera did not become ready");
                return Err(anyhow!("camera did not become ready"));
            }
            stage.note("Waiting for camera");
            std::thread::sleep(Duration::from_millis(50));
            state = app.poll_camera();
        }
    }

    let still = {
        let _stage = ui.stage("Capture still");
        app.capture_from_camera()
            .map_err(|e| anyhow!(e.user_message()))?
            .clone()
    };
    std::fs::write(output, still.bytes())
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("captured {} ({} bytes)", output.display(), still.len());
    Ok(())
}

fn run_health(config: &WeedVisionConfig, watch: bool) -> Result<()> {
    if !watch {
        let mut checker = HttpHealthCheck::new(config.health_url.clone());
        let status = weed_vision::health::evaluate(&mut checker as &mut dyn HealthCheck);
        println!("backend {}: {}", config.health_url, status.label());
        return match status {
            BackendStatus::Offline => Err(anyhow!("backend is offline")),
            _ => Ok(()),
        };
    }

    let (tx, rx) = std::sync::mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let url = config.health_url.clone();
    let handle = HealthPoller::spawn(
        Box::new(HttpHealthCheck::new(url.clone())),
        config.health_interval,
        move |status| {
            if status != BackendStatus::Checking {
                println!("backend {}: {}", url, status.label());
            }
        },
    );
    let _ = rx.recv();
    handle.stop()
}

fn load_result(path: &Path) -> Result<PredictionResult> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let result = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a saved detection result", path.display()))?;
    Ok(result)
}
