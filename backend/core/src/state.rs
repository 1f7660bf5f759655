//! Host adapter state contract.
//!
//! The host runtime persists small state keys (connection flag, last capture
//! metadata) and feeds control commands back in. The renderer writes the
//! `info.*` keys after each published frame and on lifecycle transitions;
//! `control.*` keys arrive as commands from the host.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

/// State keys exchanged with the host adapter.
pub mod keys {
    pub const INFO_CONNECTION: &str = "info.connection";
    pub const INFO_LAST_CAPTURE_TS: &str = "info.lastCaptureTs";
    pub const INFO_LAST_ETAG: &str = "info.lastEtag";
    pub const INFO_LAST_ERROR: &str = "info.lastError";
    pub const CONTROL_ACTIVE_VIEW: &str = "control.activeView";
    pub const CONTROL_CAPTURE_NOW: &str = "control.captureNow";
    pub const CONTROL_RELOAD_NOW: &str = "control.reloadNow";
}

/// Sink for persisted host state.
///
/// Implementations must be cheap and non-blocking; the renderer calls this
/// from inside capture loops.
pub trait StateSink: Send + Sync {
    fn set_state(&self, key: &str, value: Value);
}

/// In-memory sink for tests and standalone runs.
#[derive(Default)]
pub struct MemoryStateSink {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStateSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().unwrap().get(key).cloned()
    }
}

impl StateSink for MemoryStateSink {
    fn set_state(&self, key: &str, value: Value) {
        self.values.lock().unwrap().insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_sink_stores_latest_value() {
        let sink = MemoryStateSink::new();
        sink.set_state(keys::INFO_CONNECTION, json!(true));
        sink.set_state(keys::INFO_CONNECTION, json!(false));
        assert_eq!(sink.get(keys::INFO_CONNECTION), Some(json!(false)));
        assert_eq!(sink.get(keys::INFO_LAST_ETAG), None);
    }
}
