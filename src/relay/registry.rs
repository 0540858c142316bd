use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::config::SessionOptions;
use super::session::RelaySession;
use super::stats::SessionStats;
use crate::error::RelayError;
use crate::upstream::UpstreamAdapter;

/// Owns every relay session, keyed by capture target and by session id.
///
/// Terminal sessions stay queryable (status, transcript) until a new session
/// for the same target replaces them.
pub struct SessionRegistry {
    upstream: Arc<dyn UpstreamAdapter>,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    by_target: HashMap<String, Arc<RelaySession>>,
    by_id: HashMap<String, Arc<RelaySession>>,

    /// Targets with a start in flight; conflicts are detected against this
    /// set so the vendor handshake happens outside the lock.
    pending: HashSet<String>,
}

impl SessionRegistry {
    pub fn new(upstream: Arc<dyn UpstreamAdapter>) -> Self {
        Self {
            upstream,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Starts a session for the target in `options`.
    ///
    /// The target is reserved in `pending` before the vendor open and
    /// released after, so a second start against a live or mid-starting
    /// target fails with `Conflict` while the slow handshake never holds the
    /// lock against lookups or stops of unrelated sessions.
    pub async fn start(&self, options: SessionOptions) -> Result<Arc<RelaySession>, RelayError> {
        if options.target.trim().is_empty() {
            return Err(RelayError::SourceUnavailable(
                "empty capture target".to_string(),
            ));
        }

        let target = options.target.clone();
        {
            let mut inner = self.inner.write().await;

            if inner.pending.contains(&target) {
                return Err(RelayError::Conflict(target));
            }
            if let Some(existing) = inner.by_target.get(&target) {
                if !existing.state().is_terminal() {
                    return Err(RelayError::Conflict(target));
                }
            }
            inner.pending.insert(target.clone());
        }

        let result = RelaySession::start(options, Arc::clone(&self.upstream)).await;

        let mut inner = self.inner.write().await;
        inner.pending.remove(&target);
        let session = result?;

        if let Some(previous) = inner.by_target.insert(target, Arc::clone(&session)) {
            inner.by_id.remove(previous.id());
        }
        inner.by_id.insert(session.id().to_string(), Arc::clone(&session));

        info!(session = %session.id(), target = %session.target(), "session registered");
        Ok(session)
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<RelaySession>> {
        self.inner.read().await.by_id.get(session_id).cloned()
    }

    /// Routes a chunk to its session. Unknown ids are an error for REST
    /// callers; late chunks on a known session are silently dropped by the
    /// session itself.
    pub async fn submit_chunk(&self, session_id: &str, payload: Bytes) -> Result<(), RelayError> {
        match self.get(session_id).await {
            Some(session) => {
                session.submit_chunk(payload).await;
                Ok(())
            }
            None => Err(RelayError::UnknownSession(session_id.to_string())),
        }
    }

    /// Idempotent: stopping a terminal or unknown session is a no-op, so
    /// repeated stops always succeed once cleanup has been attempted.
    pub async fn stop(&self, session_id: &str) {
        match self.get(session_id).await {
            Some(session) => session.stop().await,
            None => debug!(session = %session_id, "stop for unknown session ignored"),
        }
    }

    pub async fn stats(&self, session_id: &str) -> Option<SessionStats> {
        match self.get(session_id).await {
            Some(session) => Some(session.stats().await),
            None => None,
        }
    }

    /// Stops every live session; used on server shutdown.
    pub async fn stop_all(&self) {
        let sessions: Vec<_> = self.inner.read().await.by_id.values().cloned().collect();
        for session in sessions {
            session.stop().await;
        }
    }
}
