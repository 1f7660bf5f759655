//! Status reports serialized into `/status.json` and the WS `hello_ack`.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub view_id: String,
    pub page_open: bool,
    pub subscribers: usize,
    pub probe_ms: u64,
    pub last_capture_ts: i64,
    pub last_reload_ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub has_frame: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub browser_open: bool,
    pub active_views: Vec<String>,
    pub max_active_views: usize,
    pub sessions: Vec<SessionStatus>,
}
