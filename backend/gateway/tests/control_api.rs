//! Control-command behavior: active-view switching with persistence and the
//! legacy one-shot capture/reload commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use hudbridge_browser::fake::FakeDriver;
use hudbridge_config::{io as config_io, normalize, HudBridgeConfig, RawViewEntry};
use hudbridge_core::{keys, MemoryStateSink};
use hudbridge_gateway::control::apply_control_command;
use hudbridge_gateway::{build_router, GatewayState};
use hudbridge_renderer::RendererPool;

fn raw_config() -> HudBridgeConfig {
    let view = |id: &str| RawViewEntry {
        id: Some(id.to_string()),
        url: Some(format!("http://dash.local/vis/widgets.html#{id}")),
        ..Default::default()
    };
    HudBridgeConfig {
        views: vec![view("matrix"), view("clock")],
        ..Default::default()
    }
}

struct Harness {
    state: GatewayState,
    pool: Arc<RendererPool>,
    driver: Arc<FakeDriver>,
    sink: Arc<MemoryStateSink>,
}

fn harness(config_path: Option<PathBuf>) -> Harness {
    let (settings, report) = normalize(&raw_config());
    assert!(report.is_valid());
    let sink = Arc::new(MemoryStateSink::new());
    let driver = FakeDriver::new();
    let pool = RendererPool::new(settings.clone(), driver.clone(), sink.clone());
    let mut state = GatewayState::new(Arc::new(settings), Some(pool.clone()), sink.clone());
    if let Some(path) = config_path {
        state = state.with_config_path(path);
    }
    Harness {
        state,
        pool,
        driver,
        sink,
    }
}

#[tokio::test]
async fn active_view_switches_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hudbridge.yaml");
    config_io::write_config(&raw_config(), &path).await.unwrap();

    let h = harness(Some(path.clone()));
    assert_eq!(h.state.active_view_id(), Some("matrix".to_string()));

    apply_control_command(&h.state, keys::CONTROL_ACTIVE_VIEW, &json!("clock"))
        .await
        .expect("known view accepted");
    assert_eq!(h.state.active_view_id(), Some("clock".to_string()));

    // The switch survives a restart: the config file now carries it.
    let persisted = config_io::load_config(&path).await.unwrap();
    assert_eq!(persisted.default_view.as_deref(), Some("clock"));

    // Unknown views are rejected and change nothing.
    let err = apply_control_command(&h.state, keys::CONTROL_ACTIVE_VIEW, &json!("nope"))
        .await
        .expect_err("unknown view rejected");
    assert_eq!(err.code(), "unknown_view");
    assert_eq!(h.state.active_view_id(), Some("clock".to_string()));

    h.pool.shutdown().await;
}

#[tokio::test]
async fn capture_now_acks_and_forces_a_capture() {
    let h = harness(None);
    let view = h.pool.settings().view("matrix").unwrap().clone();
    h.pool.subscribe(&view).await.unwrap();
    assert!(h.pool.wait_for_frame("matrix", 900).await);

    let pages = h.driver.pages();
    let page = pages.first().expect("page open");
    let before = page.screenshots();

    apply_control_command(&h.state, keys::CONTROL_CAPTURE_NOW, &json!(true))
        .await
        .unwrap();
    // The one-shot key is acknowledged by resetting it.
    assert_eq!(h.sink.get(keys::CONTROL_CAPTURE_NOW), Some(json!(false)));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while page.screenshots() <= before {
        assert!(
            tokio::time::Instant::now() < deadline,
            "forced capture should run"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    h.pool.shutdown().await;
}

#[tokio::test]
async fn reload_now_acks_and_reloads_the_page() {
    let h = harness(None);
    let view = h.pool.settings().view("matrix").unwrap().clone();
    h.pool.subscribe(&view).await.unwrap();
    assert!(h.pool.wait_for_frame("matrix", 900).await);

    apply_control_command(&h.state, keys::CONTROL_RELOAD_NOW, &json!(true))
        .await
        .unwrap();
    assert_eq!(h.sink.get(keys::CONTROL_RELOAD_NOW), Some(json!(false)));

    let pages = h.driver.pages();
    let page = pages.first().expect("page open");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while page.reloads() == 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "forced reload should run"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    h.pool.shutdown().await;
}

#[tokio::test]
async fn control_endpoint_switches_views_and_rejects_unknown_keys() {
    let h = harness(None);
    let router = build_router(h.state.clone());

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/control/control.activeView")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("\"clock\""))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.state.active_view_id(), Some("clock".to_string()));

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/control/bogus")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("true"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/control/control.activeView")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("\"nope\""))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    h.pool.shutdown().await;
}
