//! Upstream transcription adapters
//!
//! The vendor recognizer is an opaque collaborator behind the
//! `UpstreamAdapter` contract: open a stream, write encoded audio, receive
//! `(text, is_final)` results, close. Two operating modes exist:
//! - `WsSpeechAdapter`: one persistent vendor websocket per session
//! - `BatchSpeechAdapter`: each chunk transcribed independently over HTTP,
//!   with no continuity between chunks

mod adapter;
mod batch;
mod speech;

pub use adapter::{UpstreamAdapter, UpstreamConfig, UpstreamEvent, UpstreamHandle, UpstreamSink};
pub use batch::BatchSpeechAdapter;
pub use speech::WsSpeechAdapter;
