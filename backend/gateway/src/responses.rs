//! Error-to-HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use hudbridge_core::HudError;

/// A bare JSON error body with the given status.
pub fn json_error(status: StatusCode, code: &str) -> Response {
    (status, Json(json!({ "error": code }))).into_response()
}

/// Map a runtime error to its structured HTTP response.
pub fn error_response(err: &HudError) -> Response {
    match err {
        HudError::UnknownView { view_id } => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown_view", "viewId": view_id })),
        )
            .into_response(),
        HudError::RendererNotReady => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "renderer_not_ready")
        }
        HudError::TooManyActiveViews {
            limit,
            active_views,
            requested,
        } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "too_many_active_views",
                "limit": limit,
                "activeViews": active_views,
                "requested": requested,
            })),
        )
            .into_response(),
        HudError::NoFrame { view_id } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "no_frame", "viewId": view_id })),
        )
            .into_response(),
        HudError::Unauthorized => json_error(StatusCode::UNAUTHORIZED, "unauthorized"),
        HudError::Browser(_) | HudError::Other(_) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    }
}
