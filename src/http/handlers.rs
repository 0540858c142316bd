use super::state::AppState;
use crate::error::RelayError;
use crate::relay::{SessionOptions, SessionStats};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// Capture target descriptor (tab id, device name, ...).
    pub target: String,

    pub language: Option<String>,
    pub encoding: Option<String>,
    pub sample_rate: Option<u32>,
    pub interim_results: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub target: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub status: String,
    pub stats: Option<SessionStats>,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub session_id: String,

    /// Final results only, one per line.
    pub transcript: String,

    /// Transient in-progress fragment, overwritten by each interim result.
    pub interim: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(super) fn apply_overrides(
    mut options: SessionOptions,
    language: Option<String>,
    encoding: Option<String>,
    sample_rate: Option<u32>,
    interim_results: Option<bool>,
) -> SessionOptions {
    if let Some(language) = language {
        options.language = language;
    }
    if let Some(encoding) = encoding {
        options.encoding = encoding;
    }
    if let Some(rate) = sample_rate {
        options.sample_rate = rate;
    }
    if let Some(interim) = interim_results {
        options.interim_results = interim;
    }
    options
}

pub(super) fn error_status(err: &RelayError) -> StatusCode {
    match err {
        RelayError::Conflict(_) => StatusCode::CONFLICT,
        RelayError::SourceUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RelayError::UnknownSession(_) => StatusCode::NOT_FOUND,
        RelayError::Upstream(_) | RelayError::Transport(_) => StatusCode::BAD_GATEWAY,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions/start
/// Start a new relay session for a capture target
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let mut options = apply_overrides(
        state.defaults.clone(),
        req.language,
        req.encoding,
        req.sample_rate,
        req.interim_results,
    );
    options.target = req.target;

    match state.registry.start(options).await {
        Ok(session) => {
            info!(session = %session.id(), "session started over REST");
            (
                StatusCode::OK,
                Json(StartSessionResponse {
                    session_id: session.id().to_string(),
                    target: session.target().to_string(),
                    status: "streaming".to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to start session");
            (
                error_status(&e),
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// POST /sessions/:session_id/chunks
/// Submit one encoded audio chunk as a raw binary body
pub async fn submit_chunk(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    match state.registry.submit_chunk(&session_id, body).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => (
            error_status(&e),
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

/// POST /sessions/:session_id/stop
/// Idempotent: always succeeds once cleanup has been attempted
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!(session = %session_id, "stop requested over REST");

    state.registry.stop(&session_id).await;
    let stats = state.registry.stats(&session_id).await;

    (
        StatusCode::OK,
        Json(StopSessionResponse {
            session_id,
            status: "stopped".to_string(),
            stats,
        }),
    )
        .into_response()
}

/// GET /sessions/:session_id/status
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.registry.stats(&session_id).await {
        Some(stats) => (StatusCode::OK, Json(stats)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("unknown session {session_id}"),
            }),
        )
            .into_response(),
    }
}

/// GET /sessions/:session_id/transcript
/// Cumulative transcript accumulated so far (works for ended sessions too)
pub async fn get_session_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.registry.get(&session_id).await {
        Some(session) => {
            let transcript = session.transcript().await;
            let interim = session.interim().await;
            (
                StatusCode::OK,
                Json(TranscriptResponse {
                    session_id,
                    transcript,
                    interim,
                }),
            )
                .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("unknown session {session_id}"),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
