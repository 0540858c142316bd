use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::adapter::{UpstreamAdapter, UpstreamConfig, UpstreamEvent, UpstreamHandle, UpstreamSink};
use crate::error::UpstreamError;

type WsWriteHalf = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

const RESULT_CHANNEL_CAPACITY: usize = 64;

/// Streaming-mode adapter: one persistent vendor websocket per session.
///
/// Protocol: a JSON config frame opens the stream, audio goes out as binary
/// frames, results come back as JSON text frames, and an empty text frame
/// marks end-of-audio.
pub struct WsSpeechAdapter {
    url: String,
    credential: String,
}

impl WsSpeechAdapter {
    pub fn new(url: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credential: credential.into(),
        }
    }
}

/// Result frame shape, matching `{ "transcript": ..., "isFinal": ... }` with
/// an optional error field.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VendorResult {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl UpstreamAdapter for WsSpeechAdapter {
    async fn open(&self, config: &UpstreamConfig) -> Result<UpstreamHandle, UpstreamError> {
        info!(url = %self.url, language = %config.language, "opening upstream speech socket");

        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| UpstreamError::Open(e.to_string()))?;
        let (mut write_half, mut read_half) = ws.split();

        // Handshake: stream parameters as the first text frame.
        let handshake = json!({
            "api_key": self.credential,
            "config": {
                "encoding": config.encoding,
                "sample_rate_hertz": config.sample_rate,
                "language_code": config.language,
            },
            "interim_results": config.interim_results,
        });
        write_half
            .send(Message::Text(handshake.to_string()))
            .await
            .map_err(|e| UpstreamError::Open(format!("handshake failed: {e}")))?;

        let (event_tx, event_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);

        // Reader task: decode result frames into upstream events until the
        // vendor closes the socket or the session drops the receiver.
        tokio::spawn(async move {
            while let Some(message) = read_half.next().await {
                let event = match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<VendorResult>(&text) {
                        Ok(result) => match result.error {
                            Some(error) => UpstreamEvent::Error(error),
                            None => UpstreamEvent::Transcript {
                                text: result.transcript,
                                is_final: result.is_final,
                            },
                        },
                        Err(e) => {
                            warn!(error = %e, "unparseable vendor frame");
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "vendor closed the stream");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => UpstreamEvent::Error(e.to_string()),
                };

                let fatal = matches!(event, UpstreamEvent::Error(_));
                if event_tx.send(event).await.is_err() || fatal {
                    break;
                }
            }
            debug!("vendor reader finished");
        });

        Ok(UpstreamHandle {
            sink: Box::new(WsSpeechSink {
                write_half,
                finished: false,
            }),
            events: event_rx,
        })
    }

    fn name(&self) -> &str {
        "speech-ws"
    }
}

struct WsSpeechSink {
    write_half: WsWriteHalf,
    finished: bool,
}

#[async_trait]
impl UpstreamSink for WsSpeechSink {
    async fn write(&mut self, payload: &[u8]) -> Result<(), UpstreamError> {
        self.write_half
            .send(Message::Binary(payload.to_vec()))
            .await
            .map_err(|e| UpstreamError::Write(e.to_string()))
    }

    /// Empty text frame is the vendor's end-of-audio marker.
    async fn finish(&mut self) -> Result<(), UpstreamError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.write_half
            .send(Message::Text(String::new()))
            .await
            .map_err(|e| UpstreamError::Write(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), UpstreamError> {
        self.write_half
            .close()
            .await
            .map_err(|e| UpstreamError::Stream(e.to_string()))
    }
}
