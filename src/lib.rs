pub mod config;
pub mod error;
pub mod http;
pub mod relay;
pub mod upstream;

pub use config::{Config, UpstreamMode};
pub use error::{RelayError, UpstreamError};
pub use http::{create_router, AppState};
pub use relay::{
    AudioChunk, RelaySession, SessionEvent, SessionOptions, SessionRegistry, SessionState,
    SessionStats, TranscriptEvent,
};
pub use upstream::{
    BatchSpeechAdapter, UpstreamAdapter, UpstreamConfig, UpstreamEvent, UpstreamHandle,
    UpstreamSink, WsSpeechAdapter,
};
