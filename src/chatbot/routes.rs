//! WebSocket endpoint for the site chat widget. One session per connection.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::session::{ChatEvent, ChatSession, Pacing};
use crate::leads::LeadSink;

const INPUT_QUEUE: usize = 32;

/// Shared state for the chat route.
#[derive(Clone)]
pub struct ChatRouteState {
    pub pacing: Pacing,
    pub sink: Option<Arc<dyn LeadSink>>,
}

/// Frames a widget can send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientFrame {
    Open,
    Close,
    Message { text: String },
    QuickReply { option: String },
    Sync,
}

pub fn chat_routes(state: ChatRouteState) -> Router {
    Router::new()
        .route("/ws/chat", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ChatRouteState>) -> impl IntoResponse {
    debug!("Chat client connecting");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: ChatRouteState) {
    let session = ChatSession::new(state.pacing, state.sink);
    let mut rx = session.subscribe();
    info!("Chat client connected");

    let sync = ChatEvent::Sync {
        view: session.view().await,
    };
    if send_event(&mut socket, &sync).await.is_err() {
        return;
    }

    // Inputs run one at a time on a worker so replies keep streaming out
    // while an input's delayed replies are still playing.
    let (input_tx, mut input_rx) = mpsc::channel::<ClientFrame>(INPUT_QUEUE);
    let (reply_tx, mut reply_rx) = mpsc::channel::<ChatEvent>(INPUT_QUEUE);
    let worker_session = session.clone();
    let worker = tokio::spawn(async move {
        while let Some(frame) = input_rx.recv().await {
            if let Some(reply) = handle_client_frame(frame, &worker_session).await {
                if reply_tx.send(reply).await.is_err() {
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if send_event(&mut socket, &event).await.is_err() {
                            debug!("Chat client disconnected during send");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "Chat client lagged, resyncing");
                        let sync = ChatEvent::Sync { view: session.view().await };
                        if send_event(&mut socket, &sync).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            Some(reply) = reply_rx.recv() => {
                if send_event(&mut socket, &reply).await.is_err() {
                    break;
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                        // Closing cancels pending replies, so it skips the queue.
                        Ok(ClientFrame::Close) => session.close().await,
                        Ok(frame) => {
                            if input_tx.try_send(frame).is_err() {
                                let busy = ChatEvent::Rejected {
                                    reason: "too many pending inputs".into(),
                                };
                                if send_event(&mut socket, &busy).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(rejected) => {
                            if send_event(&mut socket, &rejected).await.is_err() {
                                break;
                            }
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(error = %e, "Chat WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // Stops any replies still on their timers.
    session.close().await;
    worker.abort();
    info!("Chat client disconnected");
}

fn parse_frame(text: &str) -> Result<ClientFrame, ChatEvent> {
    serde_json::from_str::<ClientFrame>(text).map_err(|e| {
        debug!(error = %e, text = text, "Unrecognized chat frame");
        ChatEvent::Rejected {
            reason: format!("unrecognized frame: {e}"),
        }
    })
}

/// Apply one client frame. Returns an event meant for this client only.
async fn handle_client_frame(frame: ClientFrame, session: &ChatSession) -> Option<ChatEvent> {
    let result = match frame {
        ClientFrame::Open => {
            session.open().await;
            Ok(())
        }
        ClientFrame::Close => {
            session.close().await;
            Ok(())
        }
        ClientFrame::Message { text } => session.send_user_message(&text).await,
        ClientFrame::QuickReply { option } => session.select_quick_reply(&option).await,
        ClientFrame::Sync => {
            return Some(ChatEvent::Sync {
                view: session.view().await,
            });
        }
    };

    result.err().map(|e| ChatEvent::Rejected {
        reason: e.to_string(),
    })
}

async fn send_event(socket: &mut WebSocket, event: &ChatEvent) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "Failed to serialize chat event");
            Ok(())
        }
    }
}
