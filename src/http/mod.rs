//! HTTP API server for the browser extension
//!
//! Two transports present the same session contract:
//! - REST: POST /sessions/start, POST /sessions/:id/chunks (raw binary),
//!   POST /sessions/:id/stop, GET /sessions/:id/status,
//!   GET /sessions/:id/transcript, GET /health
//! - WebSocket: GET /ws?target=... with binary chunk frames in and JSON
//!   event frames out; socket close is an implicit stop

mod handlers;
mod routes;
mod state;
mod ws;

pub use routes::create_router;
pub use state::AppState;
