//! Config normalization and validation.
//!
//! `normalize` turns the raw on-disk config into validated `Settings`,
//! clamping every knob into its documented range and collecting a report of
//! everything that had to be adjusted or dropped.

use thiserror::Error;
use tracing::warn;

use hudbridge_core::ViewConfig;

use crate::defaults::*;
use crate::schema::{HudBridgeConfig, Settings};

/// A config validation finding with field path and message.
#[derive(Debug, Error)]
#[error("config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// All errors and warnings found in one normalization pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Normalize a raw config into `Settings`, clamping ranges and dropping
/// invalid view entries.
pub fn normalize(raw: &HudBridgeConfig) -> (Settings, ValidationReport) {
    let mut report = ValidationReport::default();

    let listen_host = raw
        .listen_host
        .clone()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LISTEN_HOST.to_string());
    let listen_port = clamp_u16(raw.listen_port, 1, u16::MAX, DEFAULT_LISTEN_PORT);

    let auth_token = raw.auth_token.clone().filter(|t| !t.is_empty());

    let canvas_width = clamp_u32(raw.canvas_width, 1, 8192, DEFAULT_CANVAS_WIDTH);
    let canvas_height = clamp_u32(raw.canvas_height, 1, 8192, DEFAULT_CANVAS_HEIGHT);

    let capture_min_interval_ms = clamp_u64(
        raw.capture_min_interval_ms,
        50,
        60_000,
        DEFAULT_CAPTURE_MIN_INTERVAL_MS,
    );
    // Max interval must never drop below the min.
    let capture_max_interval_ms = clamp_u64(
        raw.capture_max_interval_ms,
        50,
        600_000,
        DEFAULT_CAPTURE_MAX_INTERVAL_MS,
    )
    .max(capture_min_interval_ms);

    let auto_reload_ms = clamp_u64(raw.auto_reload_ms, 0, 3_600_000, DEFAULT_AUTO_RELOAD_MS);

    let max_active_views =
        clamp_u64(raw.max_active_views, 1, 10, DEFAULT_MAX_ACTIVE_VIEWS as u64) as usize;
    let inactive_grace_ms =
        clamp_u64(raw.inactive_grace_ms, 0, 600_000, DEFAULT_INACTIVE_GRACE_MS);
    let close_page_after_inactive_ms = clamp_u64(
        raw.close_page_after_inactive_ms,
        0,
        3_600_000,
        DEFAULT_CLOSE_PAGE_AFTER_INACTIVE_MS,
    );
    let close_browser_after_inactive_ms = clamp_u64(
        raw.close_browser_after_inactive_ms,
        0,
        3_600_000,
        DEFAULT_CLOSE_BROWSER_AFTER_INACTIVE_MS,
    );

    let mut views = Vec::with_capacity(raw.views.len());
    for (i, entry) in raw.views.iter().enumerate() {
        let (Some(id), Some(url)) = (entry.id.clone(), entry.url.clone()) else {
            report.warn(format!("views[{i}]"), "entry missing id or url; dropped");
            continue;
        };
        if id.trim().is_empty() || url.trim().is_empty() {
            report.warn(format!("views[{i}]"), "entry has empty id or url; dropped");
            continue;
        }
        if views.iter().any(|v: &ViewConfig| v.id == id) {
            report.error(format!("views[{i}].id"), format!("duplicate view id '{id}'"));
            continue;
        }
        views.push(ViewConfig {
            id,
            url,
            name: entry.name.clone(),
            enabled: entry.enabled.unwrap_or(true),
            busy_fps: clamp_u32(entry.busy_fps, 1, 20, DEFAULT_BUSY_FPS),
        });
    }
    if views.iter().all(|v| !v.enabled) {
        report.warn("views", "no enabled views configured; every request will 404");
    }

    // `activeView` is the legacy spelling; `defaultView` wins when both set.
    let default_view = raw
        .default_view
        .clone()
        .or_else(|| raw.active_view.clone())
        .filter(|v| !v.trim().is_empty());
    if let Some(id) = &default_view {
        if !views.iter().any(|v| v.id == *id) {
            report.warn(
                "defaultView",
                format!("view '{id}' is not configured; falling back to first enabled view"),
            );
        }
    }

    let log_level = raw
        .log_level
        .clone()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

    for finding in &report.warnings {
        warn!(path = %finding.path, message = %finding.message, "config warning");
    }

    let settings = Settings {
        listen_host,
        listen_port,
        auth_token,
        canvas_width,
        canvas_height,
        capture_min_interval_ms,
        capture_max_interval_ms,
        auto_reload_ms,
        cache_bust_on_reload: raw.cache_bust_on_reload.unwrap_or(false),
        default_view,
        max_active_views,
        inactive_grace_ms,
        close_page_after_inactive_ms,
        close_browser_after_inactive_ms,
        views,
        log_level,
    };
    (settings, report)
}
