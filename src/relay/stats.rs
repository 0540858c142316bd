use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::SessionState;

/// Statistics about a relay session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    /// Capture target this session owns.
    pub target: String,

    pub state: SessionState,

    pub started_at: DateTime<Utc>,

    /// Set once the release sequence has run.
    pub stopped_at: Option<DateTime<Utc>>,

    /// Session duration in seconds (running total while streaming).
    pub duration_secs: f64,

    /// Chunks accepted and forwarded upstream.
    pub chunks_submitted: usize,

    /// Chunks dropped because the session was not streaming or the ingress
    /// queue was full.
    pub chunks_dropped: usize,

    /// Transcript events received from the recognizer (interim and final).
    pub transcript_events: usize,
}
