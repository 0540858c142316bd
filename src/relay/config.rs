use std::time::Duration;

/// Options for one relay session. The target comes from the client; the rest
/// defaults from server configuration with per-request overrides.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Capture target descriptor (tab id, device name, ...).
    pub target: String,

    /// Audio container/codec tag forwarded to the recognizer.
    pub encoding: String,

    /// Sample rate of the incoming chunks in Hz.
    pub sample_rate: u32,

    /// BCP-47 language code for the recognizer.
    pub language: String,

    /// Whether the recognizer should emit provisional results.
    pub interim_results: bool,

    /// Bounded ingress queue between transport and pump task; overflow drops
    /// the chunk rather than buffering without limit.
    pub queue_capacity: usize,

    /// Upper bound on the end-of-stream drain during stop.
    pub stop_grace: Duration,
}

impl SessionOptions {
    pub fn for_target(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            target: String::new(),
            encoding: "webm_opus".to_string(), // Chrome MediaRecorder default
            sample_rate: 48_000,
            language: "en-US".to_string(),
            interim_results: true,
            queue_capacity: 32,
            stop_grace: Duration::from_secs(5),
        }
    }
}
