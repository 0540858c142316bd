use thiserror::Error;

/// Errors surfaced by the relay core to transports and callers.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A start request collided with a live session for the same target.
    /// Recoverable: stop the existing session or reuse it.
    #[error("target {0} already has an active session")]
    Conflict(String),

    /// The capture target descriptor cannot produce audio.
    #[error("capture source unavailable: {0}")]
    SourceUnavailable(String),

    /// The vendor transcription adapter failed to open or errored
    /// mid-stream. Never retried within a session.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Channel-level failure on the client-facing transport.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unknown session {0}")]
    UnknownSession(String),
}

/// Failures at the vendor transcription boundary.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("failed to open upstream stream: {0}")]
    Open(String),

    #[error("upstream write failed: {0}")]
    Write(String),

    #[error("upstream stream error: {0}")]
    Stream(String),
}
