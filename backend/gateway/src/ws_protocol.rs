//! WebSocket control protocol.
//!
//! Messages are UTF-8 JSON objects tagged by `type`. `setView` is the legacy
//! spelling of `subscribe` and behaves identically.

use serde::{Deserialize, Serialize};

use hudbridge_core::{Frame, HudError, PoolStatus};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Hello,
    Subscribe {
        #[serde(rename = "viewId")]
        view_id: String,
    },
    SetView {
        #[serde(rename = "viewId")]
        view_id: String,
    },
}

/// A frame notification as pushed to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FramePush {
    pub view_id: String,
    pub etag: String,
    pub ts: i64,
    pub url: String,
}

impl FramePush {
    pub fn new(view_id: &str, frame: &Frame) -> Self {
        Self {
            view_id: view_id.to_string(),
            etag: frame.etag.clone(),
            ts: frame.ts,
            url: format!("/frame/{}.png", urlencoding::encode(view_id)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    HelloAck {
        #[serde(rename = "activeViewId")]
        active_view_id: Option<String>,
        #[serde(rename = "subscribedViewId")]
        subscribed_view_id: Option<String>,
        pool: Option<PoolStatus>,
        #[serde(skip_serializing_if = "Option::is_none")]
        frame: Option<FramePush>,
    },
    Subscribed {
        #[serde(rename = "viewId")]
        view_id: String,
    },
    Frame(FramePush),
    Error {
        error: String,
        #[serde(rename = "viewId", skip_serializing_if = "Option::is_none")]
        view_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
        #[serde(rename = "activeViews", skip_serializing_if = "Option::is_none")]
        active_views: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        requested: Option<String>,
    },
}

impl ServerMessage {
    /// Build the structured `error` message for a runtime error.
    pub fn from_error(err: &HudError, view_id: Option<String>) -> Self {
        match err {
            HudError::TooManyActiveViews {
                limit,
                active_views,
                requested,
            } => ServerMessage::Error {
                error: err.code().to_string(),
                view_id,
                limit: Some(*limit),
                active_views: Some(active_views.clone()),
                requested: Some(requested.clone()),
            },
            HudError::UnknownView { view_id: id } => ServerMessage::Error {
                error: err.code().to_string(),
                view_id: Some(id.clone()),
                limit: None,
                active_views: None,
                requested: None,
            },
            _ => ServerMessage::Error {
                error: err.code().to_string(),
                view_id,
                limit: None,
                active_views: None,
                requested: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subscribe_and_legacy_set_view() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","viewId":"matrix"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Subscribe { view_id } if view_id == "matrix"));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"setView","viewId":"clock"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::SetView { view_id } if view_id == "clock"));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"hello"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Hello));
    }

    #[test]
    fn frame_push_wire_format() {
        let frame = Frame::new(vec![1, 2, 3], 1700);
        let push = FramePush::new("view a", &frame);
        let json = serde_json::to_value(ServerMessage::Frame(push)).unwrap();
        assert_eq!(json["type"], "frame");
        assert_eq!(json["viewId"], "view a");
        assert_eq!(json["ts"], 1700);
        assert_eq!(json["url"], "/frame/view%20a.png");
        assert_eq!(json["etag"].as_str().unwrap().len(), 42);
    }

    #[test]
    fn admission_error_wire_format() {
        let err = HudError::TooManyActiveViews {
            limit: 2,
            active_views: vec!["a".into(), "b".into()],
            requested: "c".into(),
        };
        let json = serde_json::to_value(ServerMessage::from_error(&err, Some("c".into()))).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"], "too_many_active_views");
        assert_eq!(json["limit"], 2);
        assert_eq!(json["activeViews"], serde_json::json!(["a", "b"]));
        assert_eq!(json["requested"], "c");
    }
}
