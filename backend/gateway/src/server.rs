//! HTTP gateway: router, shared state, and listener.
//!
//! The WebSocket endpoint shares the listener; any unrouted path carrying an
//! upgrade request is handed to the WS handler, everything else falls through
//! to a JSON 404.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::info;

use hudbridge_config::Settings;
use hudbridge_core::StateSink;
use hudbridge_renderer::RendererPool;

use crate::responses::json_error;
use crate::{control, frame_api, status_api, ws_server};

/// Shared application state for all routes.
#[derive(Clone)]
pub struct GatewayState {
    pub settings: Arc<Settings>,
    pub pool: Option<Arc<RendererPool>>,
    pub state_sink: Arc<dyn StateSink>,
    /// Where the config file lives; active-view switches are persisted
    /// through it when set.
    pub(crate) config_path: Option<PathBuf>,
    /// The view served when a request omits the id; switchable at runtime via
    /// the host's `control.activeView` command.
    active_view: Arc<RwLock<Option<String>>>,
}

impl GatewayState {
    pub fn new(
        settings: Arc<Settings>,
        pool: Option<Arc<RendererPool>>,
        state_sink: Arc<dyn StateSink>,
    ) -> Self {
        let active_view = Arc::new(RwLock::new(settings.default_view_id()));
        Self {
            settings,
            pool,
            state_sink,
            config_path: None,
            active_view,
        }
    }

    /// Enable active-view persistence through the given config file.
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    pub fn active_view_id(&self) -> Option<String> {
        self.active_view.read().unwrap().clone()
    }

    pub fn set_active_view(&self, view_id: Option<String>) {
        *self.active_view.write().unwrap() = view_id;
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route(
            "/healthz",
            get(status_api::healthz).fallback(method_not_allowed),
        )
        .route(
            "/status.json",
            get(status_api::status_json).fallback(method_not_allowed),
        )
        .route(
            "/frame.png",
            get(frame_api::frame_by_query).fallback(method_not_allowed),
        )
        .route(
            "/frame/:file",
            get(frame_api::frame_by_path).fallback(method_not_allowed),
        )
        .route(
            "/control/:key",
            post(control::control_api).fallback(method_not_allowed),
        )
        .fallback(fallback_handler)
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

/// Start the gateway on the given listener.
pub async fn serve(listener: TcpListener, state: GatewayState) -> Result<()> {
    let app = build_router(state);
    info!(addr = %listener.local_addr()?, "gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn method_not_allowed() -> Response {
    json_error(StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed")
}

/// Unrouted paths: accept a WebSocket upgrade anywhere, JSON 404 otherwise.
async fn fallback_handler(
    State(state): State<GatewayState>,
    ws: Option<WebSocketUpgrade>,
    Query(query): Query<TokenQuery>,
    headers: axum::http::HeaderMap,
) -> Response {
    if let Some(ws) = ws {
        return ws_server::handle_upgrade(ws, state, headers, query.token);
    }
    json_error(StatusCode::NOT_FOUND, "not_found")
}
