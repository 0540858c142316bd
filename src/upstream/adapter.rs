use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::UpstreamError;

/// Stream parameters forwarded to the recognizer when a session opens.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub encoding: String,
    pub sample_rate: u32,
    pub language: String,
    pub interim_results: bool,
}

/// One recognition result, or a fatal mid-stream error.
#[derive(Debug, Clone)]
pub enum UpstreamEvent {
    Transcript { text: String, is_final: bool },
    Error(String),
}

/// A live upstream stream: the write half plus the result feed. Both halves
/// are exclusively owned by one session.
pub struct UpstreamHandle {
    pub sink: Box<dyn UpstreamSink>,
    pub events: mpsc::Receiver<UpstreamEvent>,
}

/// Write half of an upstream stream.
#[async_trait]
pub trait UpstreamSink: Send {
    /// Forward one encoded audio chunk.
    async fn write(&mut self, payload: &[u8]) -> Result<(), UpstreamError>;

    /// Signal end-of-audio so the recognizer flushes trailing results.
    async fn finish(&mut self) -> Result<(), UpstreamError>;

    /// Tear the stream down. Safe to call after `finish`.
    async fn close(&mut self) -> Result<(), UpstreamError>;
}

/// Factory for upstream streams; one implementation per operating mode.
#[async_trait]
pub trait UpstreamAdapter: Send + Sync {
    async fn open(&self, config: &UpstreamConfig) -> Result<UpstreamHandle, UpstreamError>;

    /// Adapter name for logging.
    fn name(&self) -> &str;
}
