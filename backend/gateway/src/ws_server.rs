//! WebSocket control handler.
//!
//! Upgrades are accepted on any path; authentication mirrors HTTP. Each
//! connection holds at most one subscription, torn down when the socket
//! closes.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hudbridge_core::HudError;
use hudbridge_renderer::{FrameEvent, SubscriberId};

use crate::auth;
use crate::server::GatewayState;
use crate::ws_protocol::{ClientMessage, FramePush, ServerMessage};

/// Close code for failed authentication.
const CLOSE_UNAUTHORIZED: u16 = 4001;
/// Close code for unexpected handler failures.
const CLOSE_INTERNAL_ERROR: u16 = 1011;

pub fn handle_upgrade(
    ws: WebSocketUpgrade,
    state: GatewayState,
    headers: HeaderMap,
    token: Option<String>,
) -> Response {
    let authorized = auth::check_token(&state.settings, &headers, token.as_deref()).is_ok();
    ws.on_upgrade(move |socket| handle_connection(socket, state, authorized))
}

async fn handle_connection(socket: WebSocket, state: GatewayState, authorized: bool) {
    let (mut sender, mut receiver) = socket.split();

    if !authorized {
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_UNAUTHORIZED,
                reason: "unauthorized".into(),
            })))
            .await;
        return;
    }

    let subscriber_id: SubscriberId = Uuid::new_v4();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<FrameEvent>();

    // Serialize app messages onto the socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "failed to encode ws message");
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code: CLOSE_INTERNAL_ERROR,
                            reason: "internal_error".into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    // Turn published frames into push notifications.
    let push_tx = out_tx.clone();
    let frame_task = tokio::spawn(async move {
        while let Some(event) = frames_rx.recv().await {
            let push = FramePush::new(&event.view_id, &event.frame);
            if push_tx.send(ServerMessage::Frame(push)).is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let reply_tx = out_tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => {
                        handle_client_message(msg, subscriber_id, &frames_tx, &reply_tx, &recv_state)
                            .await;
                    }
                    Err(err) => {
                        warn!(error = %err, "ignoring invalid ws message");
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Whichever side finishes first tears the other down.
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }
    frame_task.abort();

    if let Some(pool) = &state.pool {
        if let Some(view_id) = pool.subscriptions().unregister(subscriber_id) {
            pool.unsubscribe_view(&view_id).await;
        }
    }
    info!("websocket connection closed");
}

async fn handle_client_message(
    msg: ClientMessage,
    subscriber_id: SubscriberId,
    frames_tx: &mpsc::UnboundedSender<FrameEvent>,
    reply_tx: &mpsc::UnboundedSender<ServerMessage>,
    state: &GatewayState,
) {
    match msg {
        ClientMessage::Hello => {
            let (pool_status, subscribed_view_id, frame) = match &state.pool {
                Some(pool) => {
                    let subscribed = pool.subscriptions().subscribed_view(subscriber_id);
                    let frame = match &subscribed {
                        Some(view_id) => pool
                            .get_frame(view_id)
                            .await
                            .map(|frame| FramePush::new(view_id, &frame)),
                        None => None,
                    };
                    (Some(pool.status().await), subscribed, frame)
                }
                None => (None, None, None),
            };
            let _ = reply_tx.send(ServerMessage::HelloAck {
                active_view_id: state.active_view_id(),
                subscribed_view_id,
                pool: pool_status,
                frame,
            });
        }
        ClientMessage::Subscribe { view_id } | ClientMessage::SetView { view_id } => {
            subscribe_view(state, subscriber_id, view_id, frames_tx, reply_tx).await;
        }
    }
}

async fn subscribe_view(
    state: &GatewayState,
    subscriber_id: SubscriberId,
    view_id: String,
    frames_tx: &mpsc::UnboundedSender<FrameEvent>,
    reply_tx: &mpsc::UnboundedSender<ServerMessage>,
) {
    let Some(pool) = state.pool.clone() else {
        let _ = reply_tx.send(ServerMessage::from_error(
            &HudError::RendererNotReady,
            Some(view_id),
        ));
        return;
    };
    let Some(view) = state.settings.enabled_view(&view_id).cloned() else {
        let _ = reply_tx.send(ServerMessage::from_error(
            &HudError::UnknownView {
                view_id: view_id.clone(),
            },
            None,
        ));
        return;
    };

    // Leaving the previous view happens before admission of the new one.
    if let Some(previous) = pool.subscriptions().subscribed_view(subscriber_id) {
        if previous == view_id {
            let _ = reply_tx.send(ServerMessage::Subscribed { view_id });
            return;
        }
        pool.subscriptions().unregister(subscriber_id);
        pool.unsubscribe_view(&previous).await;
        debug!(from = %previous, to = %view_id, "switching subscription");
    }

    match pool.subscribe(&view).await {
        Ok(()) => {
            pool.subscriptions()
                .register(subscriber_id, &view_id, frames_tx.clone());
            let _ = reply_tx.send(ServerMessage::Subscribed { view_id });
        }
        Err(err) => {
            let _ = reply_tx.send(ServerMessage::from_error(&err, Some(view_id)));
        }
    }
}
