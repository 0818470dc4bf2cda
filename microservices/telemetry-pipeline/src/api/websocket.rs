//! WebSocket handler for realtime pipeline events

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::AppState;

/// Frames sent to a single connection, never broadcast
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    Connected { message: String },
}

impl ControlFrame {
    pub fn welcome() -> Self {
        ControlFrame::Connected {
            message: "WebSocket is ready".to_string(),
        }
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Forward broadcaster events until either side goes away
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    // subscribe before the welcome so nothing published after it is missed
    let mut events = state.pipeline.broadcaster().subscribe();
    let metrics = state.pipeline.metrics();
    metrics.subscribers.inc();
    debug!(subscribers = metrics.subscribers.get(), "WebSocket subscriber connected");

    let mut open = match serde_json::to_string(&ControlFrame::welcome()) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(_) => true,
    };

    while open {
        tokio::select! {
            frame = events.recv() => {
                open = match frame {
                    Some(frame) => sender.send(Message::Text(frame.as_ref().into())).await.is_ok(),
                    None => false,
                };
            }
            incoming = receiver.next() => {
                open = !matches!(incoming, None | Some(Err(_)) | Some(Ok(Message::Close(_))));
            }
        }
    }

    metrics.subscribers.dec();
    debug!(subscribers = metrics.subscribers.get(), "WebSocket subscriber disconnected");
}
