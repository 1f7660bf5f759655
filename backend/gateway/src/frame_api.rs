//! The PNG frame endpoint with ETag revalidation and cold-start wait.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::debug;

use hudbridge_core::HudError;

use crate::auth;
use crate::responses::{error_response, json_error};
use crate::server::GatewayState;

/// How long a request may wait for a cold view's first frame.
const COLD_START_WAIT_MS: u64 = 900;

#[derive(Debug, Deserialize)]
pub struct FrameQuery {
    pub token: Option<String>,
    #[serde(rename = "viewId")]
    pub view_id: Option<String>,
}

/// `GET /frame/<urlencoded viewId>.png`
pub async fn frame_by_path(
    State(state): State<GatewayState>,
    Path(file): Path<String>,
    Query(query): Query<FrameQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(view_id) = file.strip_suffix(".png") else {
        return json_error(StatusCode::NOT_FOUND, "not_found");
    };
    serve_frame(state, Some(view_id.to_string()), query.token, headers).await
}

/// Legacy `GET /frame.png?viewId=…`, defaulting to the active view.
pub async fn frame_by_query(
    State(state): State<GatewayState>,
    Query(query): Query<FrameQuery>,
    headers: HeaderMap,
) -> Response {
    serve_frame(state, query.view_id, query.token, headers).await
}

async fn serve_frame(
    state: GatewayState,
    view_id: Option<String>,
    token: Option<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(err) = auth::check_token(&state.settings, &headers, token.as_deref()) {
        return error_response(&err);
    }

    let Some(view_id) = view_id.or_else(|| state.active_view_id()) else {
        return error_response(&HudError::UnknownView {
            view_id: String::new(),
        });
    };
    let Some(view) = state.settings.enabled_view(&view_id).cloned() else {
        return error_response(&HudError::UnknownView { view_id });
    };
    let Some(pool) = state.pool.clone() else {
        return error_response(&HudError::RendererNotReady);
    };

    if let Err(err) = pool.on_frame_request(&view).await {
        return error_response(&err);
    }

    let mut frame = pool.get_frame(&view_id).await;
    if frame.is_none() {
        debug!(view = %view_id, "cold start; waiting for first frame");
        if pool.wait_for_frame(&view_id, COLD_START_WAIT_MS).await {
            frame = pool.get_frame(&view_id).await;
        }
    }
    let Some(frame) = frame else {
        return error_response(&HudError::NoFrame { view_id });
    };

    let revalidated = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|inm| inm == frame.etag)
        .unwrap_or(false);
    if revalidated {
        return (
            StatusCode::NOT_MODIFIED,
            [
                (header::ETAG, frame.etag.clone()),
                (header::CACHE_CONTROL, "no-cache".to_string()),
            ],
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
            (header::ETAG, frame.etag.clone()),
        ],
        frame.png.clone(),
    )
        .into_response()
}
