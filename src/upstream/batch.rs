use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::adapter::{UpstreamAdapter, UpstreamConfig, UpstreamEvent, UpstreamHandle, UpstreamSink};
use crate::error::UpstreamError;

const RESULT_CHANNEL_CAPACITY: usize = 64;

/// Per-chunk mode: every chunk is transcribed independently over HTTP.
///
/// There is no continuity between chunks, so results are always final and
/// the transcript is a per-chunk concatenation rather than a coherent
/// running stream.
pub struct BatchSpeechAdapter {
    client: reqwest::Client,
    url: String,
    credential: String,
}

impl BatchSpeechAdapter {
    pub fn new(url: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            credential: credential.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl UpstreamAdapter for BatchSpeechAdapter {
    async fn open(&self, config: &UpstreamConfig) -> Result<UpstreamHandle, UpstreamError> {
        let (event_tx, event_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        info!(url = %self.url, "per-chunk transcription stream ready");

        Ok(UpstreamHandle {
            sink: Box::new(BatchSink {
                client: self.client.clone(),
                url: self.url.clone(),
                credential: self.credential.clone(),
                config: config.clone(),
                events: event_tx,
            }),
            events: event_rx,
        })
    }

    fn name(&self) -> &str {
        "speech-batch"
    }
}

struct BatchSink {
    client: reqwest::Client,
    url: String,
    credential: String,
    config: UpstreamConfig,
    events: mpsc::Sender<UpstreamEvent>,
}

#[async_trait]
impl UpstreamSink for BatchSink {
    /// One request per chunk; the response text is emitted as a final-only
    /// result.
    async fn write(&mut self, payload: &[u8]) -> Result<(), UpstreamError> {
        let body = json!({
            "audio": base64::engine::general_purpose::STANDARD.encode(payload),
            "encoding": self.config.encoding,
            "sample_rate_hertz": self.config.sample_rate,
            "language_code": self.config.language,
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Write(e.to_string()))?
            .error_for_status()
            .map_err(|e| UpstreamError::Write(e.to_string()))?;

        let parsed: BatchResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Stream(e.to_string()))?;

        debug!(bytes = payload.len(), "chunk transcribed");

        if !parsed.text.is_empty() {
            let _ = self
                .events
                .send(UpstreamEvent::Transcript {
                    text: parsed.text,
                    is_final: true,
                })
                .await;
        }

        Ok(())
    }

    /// Nothing buffered; each chunk already produced its result.
    async fn finish(&mut self) -> Result<(), UpstreamError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), UpstreamError> {
        Ok(())
    }
}
