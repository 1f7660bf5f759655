//! Router behavior exercised without a network listener.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use hudbridge_browser::fake::FakeDriver;
use hudbridge_config::{normalize, HudBridgeConfig, RawViewEntry};
use hudbridge_core::MemoryStateSink;
use hudbridge_gateway::{build_router, GatewayState};
use hudbridge_renderer::RendererPool;

struct Harness {
    router: Router,
    pool: Option<Arc<RendererPool>>,
}

fn harness(token: Option<&str>, with_pool: bool) -> Harness {
    let raw = HudBridgeConfig {
        auth_token: token.map(str::to_string),
        views: vec![
            RawViewEntry {
                id: Some("matrix".into()),
                url: Some("http://dash.local/vis/widgets.html#matrix".into()),
                ..Default::default()
            },
            RawViewEntry {
                id: Some("dark".into()),
                url: Some("http://dash.local/vis/widgets.html#dark".into()),
                enabled: Some(false),
                ..Default::default()
            },
        ],
        ..Default::default()
    };
    let (settings, report) = normalize(&raw);
    assert!(report.is_valid());

    let sink = Arc::new(MemoryStateSink::new());
    let pool = with_pool.then(|| {
        RendererPool::new(settings.clone(), FakeDriver::new(), sink.clone())
    });
    let state = GatewayState::new(Arc::new(settings), pool.clone(), sink);
    Harness {
        router: build_router(state),
        pool,
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_is_open() {
    let h = harness(Some("tok"), false);
    let response = h
        .router
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({ "ok": true }));
}

#[tokio::test]
async fn unknown_path_is_json_404() {
    let h = harness(None, false);
    let response = h
        .router
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "not_found");
}

#[tokio::test]
async fn wrong_method_is_json_405() {
    let h = harness(None, false);
    let response = h
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body_json(response).await["error"], "method_not_allowed");
}

#[tokio::test]
async fn status_requires_the_token() {
    let h = harness(Some("s3cret"), false);
    let response = h
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/status.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = h
        .router
        .oneshot(
            Request::builder()
                .uri("/status.json?token=s3cret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["status"]["activeViewId"], "matrix");
    // The auth token never leaks into status output.
    assert!(json["status"]["config"].get("authToken").is_none());
}

#[tokio::test]
async fn frame_for_unknown_view_is_404() {
    let h = harness(None, true);
    let response = h
        .router
        .oneshot(
            Request::builder()
                .uri("/frame/nope.png")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"], "unknown_view");
    assert_eq!(json["viewId"], "nope");
}

#[tokio::test]
async fn disabled_view_is_404() {
    let h = harness(None, true);
    let response = h
        .router
        .oneshot(
            Request::builder()
                .uri("/frame/dark.png")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn frame_without_pool_is_503() {
    let h = harness(None, false);
    let response = h
        .router
        .oneshot(
            Request::builder()
                .uri("/frame/matrix.png")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"], "renderer_not_ready");
}

#[tokio::test]
async fn cold_start_serves_png_then_revalidates() {
    let h = harness(None, true);

    let response = h
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/frame/matrix.png")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "image/png"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    let etag = response.headers()[header::ETAG].to_str().unwrap().to_string();
    assert_eq!(etag.len(), 42);
    assert!(etag.starts_with('"') && etag.ends_with('"'));

    // Revalidation with the fresh etag short-circuits to 304.
    let response = h
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/frame/matrix.png")
                .header(header::IF_NONE_MATCH, etag.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(response.headers()[header::ETAG].to_str().unwrap(), etag);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(bytes.is_empty());

    if let Some(pool) = &h.pool {
        pool.shutdown().await;
    }
}

#[tokio::test]
async fn legacy_frame_endpoint_falls_back_to_the_default_view() {
    let h = harness(None, true);
    let response = h
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/frame.png")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    if let Some(pool) = &h.pool {
        pool.shutdown().await;
    }
}
