use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::relay::SessionOptions;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub relay: RelayConfig,
    pub upstream: UpstreamSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// Encoding tag forwarded to the recognizer ("webm_opus" for Chrome's
    /// MediaRecorder output).
    pub encoding: String,
    pub sample_rate: u32,
}

#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    pub queue_capacity: usize,
    pub stop_grace_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct UpstreamSettings {
    pub mode: UpstreamMode,
    pub url: String,
    pub language: String,
    pub interim_results: bool,

    /// Environment variable holding the vendor credential; resolved at
    /// startup, opaque to the relay core.
    pub credentials_env: String,
}

/// The two transcription operating modes. They produce materially different
/// transcripts and are never unified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamMode {
    /// Persistent vendor stream with interim and final results.
    Streaming,
    /// Independent transcription per chunk, final-only, no continuity.
    PerChunk,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Session defaults derived from server configuration; requests may
    /// override per field.
    pub fn session_defaults(&self) -> SessionOptions {
        SessionOptions {
            target: String::new(),
            encoding: self.audio.encoding.clone(),
            sample_rate: self.audio.sample_rate,
            language: self.upstream.language.clone(),
            interim_results: self.upstream.interim_results,
            queue_capacity: self.relay.queue_capacity,
            stop_grace: Duration::from_secs(self.relay.stop_grace_secs),
        }
    }
}
