use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle states of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Starting,
    Streaming,
    Stopping,
    Stopped,
    Failed,
}

impl SessionState {
    /// Terminal states never transition again; a new start mints a new
    /// session.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }
}

/// One encoded audio chunk on its way upstream. Consumed exactly once, then
/// discarded; there is no replay buffer.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub session_id: String,
    pub sequence: u64,
    pub payload: Bytes,
    pub captured_at: DateTime<Utc>,
}

/// A transcription result relayed back from the upstream recognizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    pub session_id: String,
    pub transcript: String,
    pub is_final: bool,
    /// Assigned in arrival order; interim updates may revisit the same
    /// logical position.
    pub result_index: u64,
}

/// Messages pushed to presentation sinks (websocket clients, pollers).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Transcript(TranscriptEvent),
    Error { session_id: String, message: String },
    Ended { session_id: String, state: SessionState },
}
