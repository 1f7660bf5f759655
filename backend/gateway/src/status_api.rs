//! Health and status endpoints.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::auth;
use crate::responses::error_response;
use crate::server::{GatewayState, TokenQuery};

/// `GET /healthz` — liveness probe, intentionally unauthenticated.
pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// `GET /status.json`
pub async fn status_json(
    State(state): State<GatewayState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(err) = auth::check_token(&state.settings, &headers, query.token.as_deref()) {
        return error_response(&err);
    }

    let pool = match &state.pool {
        Some(pool) => Some(pool.status().await),
        None => None,
    };
    Json(json!({
        "ok": true,
        "status": {
            // `Settings` skips the auth token when serializing.
            "config": &*state.settings,
            "activeViewId": state.active_view_id(),
            "pool": pool,
        }
    }))
    .into_response()
}
