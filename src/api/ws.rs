//! WebSocket endpoint for the support chat.
//!
//! The upgrade itself is unauthenticated; the first processed frame must be
//! an in-band `auth` frame, handled by the chat router. This task owns the
//! transport: it pumps the router's outbound queue into the socket and feeds
//! inbound text frames to the router, and unconditionally tears the channel
//! down when either side goes away.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;

use crate::chat::{FrameOutcome, ServerFrame};
use crate::AppState;

/// WebSocket endpoint for real-time chat
/// GET /ws
pub async fn chat_ws(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_chat_socket(socket, state))
}

fn encode(frame: &ServerFrame) -> String {
    // ServerFrame serialization cannot fail: plain structs, no non-string keys.
    serde_json::to_string(frame).unwrap_or_default()
}

async fn handle_chat_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (mut chan, mut outbound) = state.chat.connect();

    loop {
        tokio::select! {
            // Frames queued for this channel (history, live messages, errors)
            Some(frame) = outbound.recv() => {
                if sender.send(Message::Text(encode(&frame))).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if state.chat.handle_frame(&mut chan, &text).await == FrameOutcome::Close {
                            // Flush whatever the router queued (e.g. the auth
                            // error frame) before dropping the transport.
                            while let Ok(frame) = outbound.try_recv() {
                                if sender.send(Message::Text(encode(&frame))).await.is_err() {
                                    break;
                                }
                            }
                            let _ = sender.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // Runs on every exit path, transport errors included, so the registry
    // never keeps a dead channel.
    state.chat.disconnect(&chan);
}
