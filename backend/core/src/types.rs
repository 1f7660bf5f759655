//! Shared domain types.

use serde::{Deserialize, Serialize};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn default_enabled() -> bool {
    true
}

fn default_busy_fps() -> u32 {
    10
}

/// A named dashboard view to render. Immutable for the lifetime of a session;
/// replaced wholesale when the configuration changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewConfig {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_busy_fps")]
    pub busy_fps: u32,
}

impl ViewConfig {
    /// Per-view capture floor derived from `busy_fps`. Overrides the global
    /// minimum interval for this view's session.
    pub fn capture_min_interval_ms(&self) -> u64 {
        (1000 / u64::from(self.busy_fps.clamp(1, 20))).max(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_fps_derives_capture_floor() {
        let mut view = ViewConfig {
            id: "a".into(),
            url: "http://host/vis/index.html".into(),
            name: None,
            enabled: true,
            busy_fps: 10,
        };
        assert_eq!(view.capture_min_interval_ms(), 100);

        view.busy_fps = 1;
        assert_eq!(view.capture_min_interval_ms(), 1000);

        // 20 fps would be 50 ms; anything faster clamps to the 50 ms floor.
        view.busy_fps = 20;
        assert_eq!(view.capture_min_interval_ms(), 50);
        view.busy_fps = 100;
        assert_eq!(view.capture_min_interval_ms(), 50);
    }

    #[test]
    fn view_defaults_apply_on_deserialize() {
        let view: ViewConfig =
            serde_json::from_str(r#"{"id":"a","url":"http://host/page"}"#).unwrap();
        assert!(view.enabled);
        assert_eq!(view.busy_fps, 10);
    }
}
