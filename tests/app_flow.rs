//! Whole client flow: pick a file, submit, render; plus the health badge.

mod common;

use std::time::Duration;

use common::{dead_url, FakeServer, Reply, PREDICTION_JSON};
use weed_vision::health::evaluate;
use weed_vision::render::{render_report, NO_DETECTIONS};
use weed_vision::{
    App, AppError, BackendStatus, Catalog, FacingMode, HttpHealthCheck, SubmissionClient,
    SyntheticCamera, SyntheticConfig, WeedVisionConfig,
};

fn config_for(backend: &FakeServer) -> WeedVisionConfig {
    WeedVisionConfig {
        local_endpoint: format!("{}/predict", backend.url()),
        request_timeout: Duration::from_secs(10),
        ..WeedVisionConfig::default()
    }
}

#[test]
fn file_to_report() {
    let backend = FakeServer::start(|_| Reply::json(200, PREDICTION_JSON));
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("north_plot.png");
    std::fs::write(&path, b"\x89PNG\r\n\x1a\nfake").expect("write image");

    let mut app = App::new(config_for(&backend));
    app.select_path(&path).expect("select");
    assert_eq!(app.image().map(|i| i.mime_type()), Some("image/png"));

    let client = SubmissionClient::from_config(app.config());
    let result = app
        .submit_current(&client)
        .expect("submission")
        .expect("not discarded")
        .clone();

    let report = render_report(&result, &Catalog::builtin());
    assert!(report.contains("Parthenium"));
    assert!(report.contains("93.4%"));
    assert!(report.contains("Total detections: 3"));
    assert!(report.contains("4.9 kg per hectare"));
    assert_eq!(
        backend.requests()[0]
            .header("content-type")
            .map(|ct| ct.starts_with("multipart/form-data")),
        Some(true)
    );
}

#[test]
fn empty_detections_render_fixed_message() {
    let backend = FakeServer::start(|_| {
        Reply::json(200, r#"{"detections":[],"result_image_url":"","original_image_url":""}"#)
    });
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("clean.jpg");
    std::fs::write(&path, [0xFF, 0xD8, 0xFF]).expect("write image");

    let mut app = App::new(config_for(&backend));
    app.select_path(&path).expect("select");
    let client = SubmissionClient::from_config(app.config());
    let result = app.submit_current(&client).expect("submission").cloned();
    let result = result.expect("not discarded");
    assert_eq!(render_report(&result, &Catalog::builtin()), NO_DETECTIONS);
}

#[test]
fn rejected_file_types_never_reach_the_backend() {
    let backend = FakeServer::start(|_| Reply::json(200, PREDICTION_JSON));
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "not an image").expect("write");

    let mut app = App::new(config_for(&backend));
    assert!(matches!(app.select_path(&path), Err(AppError::Input(_))));
    let client = SubmissionClient::from_config(app.config());
    assert!(matches!(app.submit_current(&client), Err(AppError::NoImage)));
    assert!(backend.requests().is_empty());
}

#[test]
fn captured_still_is_submitted() {
    let backend = FakeServer::start(|_| Reply::json(200, PREDICTION_JSON));
    let mut app = App::new(config_for(&backend));
    let camera = SyntheticCamera::new(SyntheticConfig {
        width: 64,
        height: 48,
        ..SyntheticConfig::default()
    });

    app.open_camera(Box::new(camera), FacingMode::Environment)
        .expect("open camera");
    let still = app.capture_from_camera().expect("capture");
    assert_eq!(still.filename(), "captured-image.jpg");

    let client = SubmissionClient::from_config(app.config());
    app.submit_current(&client).expect("submission");
    let parts = weed_vision::multipart::parse(
        backend.requests()[0].header("content-type").expect("content type"),
        &backend.requests()[0].body,
    )
    .expect("multipart");
    assert_eq!(parts[0].filename.as_deref(), Some("captured-image.jpg"));
    assert_eq!(parts[0].content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(&parts[0].data[..2], &[0xFF, 0xD8]);
}

#[test]
fn health_badge_states() {
    let healthy = FakeServer::start(|_| Reply::json(200, r#"{"status":"ok"}"#));
    assert_eq!(evaluate(&mut HttpHealthCheck::new(healthy.url())), BackendStatus::Online);
    assert_eq!(healthy.requests()[0].path, "/health");

    let also_healthy = FakeServer::start(|_| Reply::json(200, r#"{"ok":true}"#));
    assert_eq!(
        evaluate(&mut HttpHealthCheck::new(also_healthy.url())),
        BackendStatus::Online
    );

    let booting = FakeServer::start(|_| Reply::json(503, r#"{"status":"loading"}"#));
    assert_eq!(evaluate(&mut HttpHealthCheck::new(booting.url())), BackendStatus::Starting);

    // 2xx HTML fails the check, but the fallback ping gets an answer.
    let html = FakeServer::start(|_| Reply::html(200, "<html>hello</html>"));
    assert_eq!(evaluate(&mut HttpHealthCheck::new(html.url())), BackendStatus::Starting);
    assert_eq!(html.requests().len(), 2);

    assert_eq!(evaluate(&mut HttpHealthCheck::new(dead_url())), BackendStatus::Offline);
}
