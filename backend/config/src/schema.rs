//! HudBridge runtime configuration schema.
//!
//! `HudBridgeConfig` is the raw on-disk form: every knob is optional and
//! numeric knobs are `f64` so out-of-range and non-finite inputs can be
//! clamped or defaulted during normalization instead of failing the parse.
//! `Settings` is the validated, typed form the rest of the system consumes.

use serde::{Deserialize, Serialize};

use hudbridge_core::ViewConfig;

// ---------------------------------------------------------------------------
// Raw config (as parsed from YAML / merge patches)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HudBridgeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_width: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_height: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_min_interval_ms: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_max_interval_ms: Option<f64>,

    /// Full-page reload period; 0 disables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_reload_ms: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_bust_on_reload: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_view: Option<String>,

    /// Legacy alias for `defaultView`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_view: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_active_views: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactive_grace_ms: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_page_after_inactive_ms: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_browser_after_inactive_ms: Option<f64>,

    #[serde(default)]
    pub views: Vec<RawViewEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawViewEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy_fps: Option<f64>,
}

// ---------------------------------------------------------------------------
// Validated settings
// ---------------------------------------------------------------------------

/// The validated, clamped configuration consumed by the renderer and gateway.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub listen_host: String,
    pub listen_port: u16,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub capture_min_interval_ms: u64,
    pub capture_max_interval_ms: u64,
    pub auto_reload_ms: u64,
    pub cache_bust_on_reload: bool,
    pub default_view: Option<String>,
    pub max_active_views: usize,
    pub inactive_grace_ms: u64,
    pub close_page_after_inactive_ms: u64,
    pub close_browser_after_inactive_ms: u64,
    pub views: Vec<ViewConfig>,
    pub log_level: String,
}

impl Settings {
    /// Look up a view by id.
    pub fn view(&self, id: &str) -> Option<&ViewConfig> {
        self.views.iter().find(|v| v.id == id)
    }

    /// Look up an *enabled* view by id.
    pub fn enabled_view(&self, id: &str) -> Option<&ViewConfig> {
        self.view(id).filter(|v| v.enabled)
    }

    /// Resolve the default view id: the configured one if it names an enabled
    /// view, else the first enabled view.
    pub fn default_view_id(&self) -> Option<String> {
        if let Some(id) = &self.default_view {
            if self.enabled_view(id).is_some() {
                return Some(id.clone());
            }
        }
        self.views.iter().find(|v| v.enabled).map(|v| v.id.clone())
    }
}
