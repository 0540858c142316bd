use std::sync::Arc;

use crate::relay::{SessionOptions, SessionRegistry};

/// Shared application state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session registry shared by both transports.
    pub registry: Arc<SessionRegistry>,

    /// Server-side session defaults; requests may override per field.
    pub defaults: SessionOptions,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, defaults: SessionOptions) -> Self {
        Self { registry, defaults }
    }
}
