use super::handlers::apply_overrides;
use super::state::AppState;
use crate::error::RelayError;
use crate::relay::SessionEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Capture target descriptor; one session per socket.
    pub target: String,

    pub language: Option<String>,
    pub encoding: Option<String>,
    pub sample_rate: Option<u32>,
    pub interim_results: Option<bool>,
}

/// GET /ws?target=...
///
/// The persistent-socket transport: binary frames are audio chunks,
/// transcript/error/ended events come back as JSON text frames, and closing
/// the socket is an implicit stop.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay_socket(socket, state, params))
}

async fn relay_socket(mut socket: WebSocket, state: AppState, params: WsParams) {
    let mut options = apply_overrides(
        state.defaults.clone(),
        params.language,
        params.encoding,
        params.sample_rate,
        params.interim_results,
    );
    options.target = params.target;

    let session = match state.registry.start(options).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "websocket session rejected");
            // Same wire shape as in-session errors; no session exists yet,
            // so the id is empty.
            let frame = SessionEvent::Error {
                session_id: String::new(),
                message: e.to_string(),
            };
            if let Ok(json) = serde_json::to_string(&frame) {
                let _ = socket.send(Message::Text(json)).await;
            }
            return;
        }
    };

    let session_id = session.id().to_string();
    info!(session = %session_id, "websocket transport connected");

    let mut events = session.subscribe();
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Binary(payload))) => {
                    session.submit_chunk(payload.into()).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(session = %session_id, ?frame, "websocket closed by client");
                    break;
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Text(text))) => {
                    debug!(session = %session_id, %text, "ignoring text frame from client");
                }
                Some(Err(e)) => {
                    // A socket error is a transport failure, not a clean
                    // stop: the session ends as failed.
                    let err = RelayError::Transport(e.to_string());
                    error!(session = %session_id, error = %err, "websocket transport failed");
                    session.abort(err.to_string()).await;
                    break;
                }
                None => break,
            },
            event = events.recv() => match event {
                Ok(event) => {
                    let ended = matches!(event, SessionEvent::Ended { .. });
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            if ws_tx.send(Message::Text(json)).await.is_err() {
                                warn!(session = %session_id, "failed to push event frame");
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(session = %session_id, error = %e, "failed to encode event")
                        }
                    }
                    if ended {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(session = %session_id, skipped, "event subscriber lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    // Socket gone or session ended: implicit stop, idempotent either way.
    session.stop().await;
    info!(session = %session_id, "websocket transport disconnected");
}
