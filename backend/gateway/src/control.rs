//! Host adapter control commands.
//!
//! `control.*` state changes arrive from the host runtime, either directly
//! through `apply_control_command` or over `POST /control/<key>`.
//! `activeView` switches the default view and is written back through the
//! config file so the switch survives restarts; the legacy one-shot
//! `captureNow` / `reloadNow` commands apply to the active view's session
//! and are acknowledged by resetting the key.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use hudbridge_config::io as config_io;
use hudbridge_core::{keys, HudError};

use crate::auth;
use crate::responses::{error_response, json_error};
use crate::server::{GatewayState, TokenQuery};

const CONTROL_KEYS: [&str; 3] = [
    keys::CONTROL_ACTIVE_VIEW,
    keys::CONTROL_CAPTURE_NOW,
    keys::CONTROL_RELOAD_NOW,
];

/// `POST /control/<key>` — host-facing command entry point. The request body
/// is the JSON value for the key.
pub async fn control_api(
    State(state): State<GatewayState>,
    Path(key): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> Response {
    if let Err(err) = auth::check_token(&state.settings, &headers, query.token.as_deref()) {
        return error_response(&err);
    }
    if !CONTROL_KEYS.contains(&key.as_str()) {
        return json_error(StatusCode::NOT_FOUND, "not_found");
    }
    match apply_control_command(&state, &key, &value).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(err) => error_response(&err),
    }
}

pub async fn apply_control_command(
    state: &GatewayState,
    key: &str,
    value: &Value,
) -> Result<(), HudError> {
    match key {
        keys::CONTROL_ACTIVE_VIEW => {
            let Some(view_id) = value.as_str() else {
                return Err(HudError::Other(anyhow::anyhow!(
                    "control.activeView expects a view id string"
                )));
            };
            if state.settings.enabled_view(view_id).is_none() {
                warn!(view = view_id, "control.activeView names an unknown or disabled view");
                return Err(HudError::UnknownView {
                    view_id: view_id.to_string(),
                });
            }
            info!(view = view_id, "switching active view");
            state.set_active_view(Some(view_id.to_string()));
            if let Some(path) = &state.config_path {
                if let Err(err) = persist_active_view(path, view_id).await {
                    warn!(error = %format!("{err:#}"), "failed to persist active view");
                }
            }
            Ok(())
        }
        keys::CONTROL_CAPTURE_NOW => {
            if is_truthy(value) {
                if let (Some(pool), Some(view_id)) = (&state.pool, state.active_view_id()) {
                    if !pool.capture_now(&view_id).await {
                        debug!(view = %view_id, "captureNow for a view with no session");
                    }
                }
                state
                    .state_sink
                    .set_state(keys::CONTROL_CAPTURE_NOW, json!(false));
            }
            Ok(())
        }
        keys::CONTROL_RELOAD_NOW => {
            if is_truthy(value) {
                if let (Some(pool), Some(view_id)) = (&state.pool, state.active_view_id()) {
                    if !pool.reload_now(&view_id).await {
                        debug!(view = %view_id, "reloadNow for a view with no session");
                    }
                }
                state
                    .state_sink
                    .set_state(keys::CONTROL_RELOAD_NOW, json!(false));
            }
            Ok(())
        }
        other => {
            debug!(key = other, "ignoring unknown control key");
            Ok(())
        }
    }
}

/// Write the new default view back through the config file so it survives a
/// restart.
async fn persist_active_view(path: &std::path::Path, view_id: &str) -> anyhow::Result<()> {
    let raw = config_io::load_config(path).await?;
    let updated = config_io::apply_merge_patch(&raw, &json!({ "defaultView": view_id }))?;
    config_io::write_config(&updated, path).await?;
    Ok(())
}

fn is_truthy(value: &Value) -> bool {
    value.as_bool().unwrap_or(false) || value.as_str() == Some("true")
}
