//! Session-scoped audio relay
//!
//! This module is the core of the service: one `RelaySession` binds a single
//! capture target to a single upstream transcription stream, forwards encoded
//! chunks in submission order, demultiplexes transcript events back to
//! subscribers, and guarantees ordered teardown on stop, error, or
//! disconnect. The `SessionRegistry` owns every session and enforces the
//! one-session-per-target rule.

mod config;
mod event;
mod registry;
mod session;
mod stats;

pub use config::SessionOptions;
pub use event::{AudioChunk, SessionEvent, SessionState, TranscriptEvent};
pub use registry::SessionRegistry;
pub use session::RelaySession;
pub use stats::SessionStats;
