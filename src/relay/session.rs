use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use super::config::SessionOptions;
use super::event::{AudioChunk, SessionEvent, SessionState, TranscriptEvent};
use super::stats::SessionStats;
use crate::error::RelayError;
use crate::upstream::{
    UpstreamAdapter, UpstreamConfig, UpstreamEvent, UpstreamHandle, UpstreamSink,
};

const EVENT_FANOUT_CAPACITY: usize = 64;

/// A relay session: one capture target bound to one upstream transcription
/// stream.
///
/// The session exclusively owns both handles. The source handle is the
/// bounded ingress channel fed by the transport; the upstream handle is the
/// vendor stream opened at start. A single pump task forwards chunks and
/// demultiplexes results, so outbound order is submission order by
/// construction.
pub struct RelaySession {
    id: String,
    target: String,
    options: SessionOptions,

    state_tx: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,

    /// Source handle; taken during the release sequence, after which any
    /// late chunk is dropped.
    chunk_tx: Mutex<Option<mpsc::Sender<AudioChunk>>>,

    /// Monotonic sequence stamped on each accepted chunk.
    sequence: AtomicU64,
    chunks_submitted: AtomicUsize,
    chunks_dropped: AtomicUsize,

    /// Transcript events seen, also used as the next result index.
    events_seen: AtomicUsize,

    started_at: DateTime<Utc>,
    stopped_at: Mutex<Option<DateTime<Utc>>>,

    /// Cumulative transcript: final results only, each followed by a record
    /// separator.
    finals: Mutex<String>,

    /// Transient in-progress slot, overwritten by each interim result and
    /// cleared by the next final.
    interim: Mutex<Option<String>>,

    /// Set by `abort`; makes the pump end the session as `Failed` instead of
    /// `Stopped`.
    abort_reason: Mutex<Option<String>>,

    events: broadcast::Sender<SessionEvent>,
    shutdown: watch::Sender<bool>,
}

impl RelaySession {
    /// Opens the upstream stream and spawns the pump task. Called by the
    /// registry with the conflict check already done.
    ///
    /// Upstream open is the only acquisition that can fail here; on failure
    /// the ingress channel is simply dropped and no session exists.
    pub(crate) async fn start(
        options: SessionOptions,
        adapter: Arc<dyn UpstreamAdapter>,
    ) -> Result<Arc<Self>, RelayError> {
        let id = format!("session-{}", uuid::Uuid::new_v4());
        let target = options.target.clone();
        info!(session = %id, %target, adapter = adapter.name(), "starting relay session");

        let (state_tx, state_rx) = watch::channel(SessionState::Starting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (chunk_tx, chunk_rx) = mpsc::channel(options.queue_capacity);
        let (events, _) = broadcast::channel(EVENT_FANOUT_CAPACITY);

        let upstream_config = UpstreamConfig {
            encoding: options.encoding.clone(),
            sample_rate: options.sample_rate,
            language: options.language.clone(),
            interim_results: options.interim_results,
        };

        let upstream = adapter.open(&upstream_config).await.map_err(|e| {
            warn!(session = %id, error = %e, "upstream open failed");
            RelayError::Upstream(e)
        })?;

        let session = Arc::new(Self {
            id,
            target,
            options,
            state_tx,
            state_rx,
            chunk_tx: Mutex::new(Some(chunk_tx)),
            sequence: AtomicU64::new(0),
            chunks_submitted: AtomicUsize::new(0),
            chunks_dropped: AtomicUsize::new(0),
            events_seen: AtomicUsize::new(0),
            started_at: Utc::now(),
            stopped_at: Mutex::new(None),
            finals: Mutex::new(String::new()),
            interim: Mutex::new(None),
            abort_reason: Mutex::new(None),
            events,
            shutdown: shutdown_tx,
        });

        // Both handles are bound; the session is live before the caller gets
        // it back.
        session.transition(SessionState::Streaming);
        info!(session = %session.id, "session streaming");

        let pump = Arc::clone(&session);
        tokio::spawn(pump.run(chunk_rx, upstream, shutdown_rx));

        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Subscribes a presentation sink to this session's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Accepts a chunk while streaming; in any other state the chunk is
    /// dropped. A drop is not an error: the encoder may emit a final chunk
    /// racing with a stop request.
    pub async fn submit_chunk(&self, payload: Bytes) {
        if self.state() != SessionState::Streaming {
            self.chunks_dropped.fetch_add(1, Ordering::SeqCst);
            debug!(session = %self.id, state = ?self.state(), "chunk dropped, session not streaming");
            return;
        }

        let tx = { self.chunk_tx.lock().await.clone() };
        let Some(tx) = tx else {
            self.chunks_dropped.fetch_add(1, Ordering::SeqCst);
            debug!(session = %self.id, "chunk dropped, source released");
            return;
        };

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let chunk = AudioChunk {
            session_id: self.id.clone(),
            sequence,
            payload,
            captured_at: Utc::now(),
        };

        match tx.try_send(chunk) {
            Ok(()) => {
                self.chunks_submitted.fetch_add(1, Ordering::SeqCst);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.chunks_dropped.fetch_add(1, Ordering::SeqCst);
                warn!(session = %self.id, seq = sequence, "ingress queue full, dropping chunk");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.chunks_dropped.fetch_add(1, Ordering::SeqCst);
                debug!(session = %self.id, seq = sequence, "ingress closed, dropping chunk");
            }
        }
    }

    /// Idempotent stop: refuses further chunks immediately, then waits for
    /// the release sequence to finish, bounded by the grace period plus a
    /// closing margin.
    pub async fn stop(&self) {
        if self.state().is_terminal() {
            debug!(session = %self.id, "stop on terminal session is a no-op");
            return;
        }

        info!(session = %self.id, "stop requested");
        self.shut_down().await;
    }

    /// Ends the session as `Failed` because the client-facing transport tore
    /// down uncleanly. Runs the same release sequence as `stop` but skips the
    /// result flush and carries `message` to subscribers.
    pub async fn abort(&self, message: impl Into<String>) {
        if self.state().is_terminal() {
            return;
        }

        let message = message.into();
        warn!(session = %self.id, %message, "session aborted");
        *self.abort_reason.lock().await = Some(message);
        self.shut_down().await;
    }

    async fn shut_down(&self) {
        self.transition(SessionState::Stopping);
        let _ = self.shutdown.send(true);

        let mut state_rx = self.state_rx.clone();
        let bound = self.options.stop_grace + Duration::from_secs(1);
        let done = timeout(bound, async {
            while !state_rx.borrow_and_update().is_terminal() {
                if state_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;

        if done.is_err() {
            warn!(session = %self.id, "stop wait timed out before release completed");
        }
    }

    /// Cumulative transcript: final results only, one per line.
    pub async fn transcript(&self) -> String {
        self.finals.lock().await.clone()
    }

    /// The transient in-progress fragment, if any.
    pub async fn interim(&self) -> Option<String> {
        self.interim.lock().await.clone()
    }

    pub async fn stats(&self) -> SessionStats {
        let stopped_at = *self.stopped_at.lock().await;
        let end = stopped_at.unwrap_or_else(Utc::now);
        let duration = end.signed_duration_since(self.started_at);

        SessionStats {
            session_id: self.id.clone(),
            target: self.target.clone(),
            state: self.state(),
            started_at: self.started_at,
            stopped_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            chunks_submitted: self.chunks_submitted.load(Ordering::SeqCst),
            chunks_dropped: self.chunks_dropped.load(Ordering::SeqCst),
            transcript_events: self.events_seen.load(Ordering::SeqCst),
        }
    }

    /// Pump task: forwards chunks in submission order and demultiplexes
    /// upstream results until a stop signal, source close, or upstream
    /// failure, then runs the release sequence.
    async fn run(
        self: Arc<Self>,
        mut chunk_rx: mpsc::Receiver<AudioChunk>,
        upstream: UpstreamHandle,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let UpstreamHandle {
            mut sink,
            mut events,
        } = upstream;

        let mut failure: Option<String> = None;

        loop {
            tokio::select! {
                maybe_chunk = chunk_rx.recv() => match maybe_chunk {
                    Some(chunk) => {
                        debug!(
                            session = %self.id,
                            seq = chunk.sequence,
                            bytes = chunk.payload.len(),
                            "forwarding chunk"
                        );
                        if let Err(e) = sink.write(&chunk.payload).await {
                            error!(session = %self.id, error = %e, "upstream write failed");
                            failure = Some(e.to_string());
                            break;
                        }
                    }
                    // Source handle already released by a teardown underway.
                    None => break,
                },
                maybe_event = events.recv() => match maybe_event {
                    Some(UpstreamEvent::Transcript { text, is_final }) => {
                        self.handle_result(text, is_final).await;
                    }
                    Some(UpstreamEvent::Error(message)) => {
                        error!(session = %self.id, %message, "upstream stream error");
                        failure = Some(message);
                        break;
                    }
                    None => {
                        failure = Some("upstream closed unexpectedly".to_string());
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let failure = match failure {
            Some(failure) => Some(failure),
            None => self.abort_reason.lock().await.take(),
        };

        self.teardown(chunk_rx, sink, events, failure).await;
    }

    /// Release sequence, in strict order: (1) refuse new chunks, (2) signal
    /// end-of-stream and drain trailing results under the grace period,
    /// (3) release the source handle, (4) close the upstream stream. Errors
    /// here are logged, never propagated, and never skip a later step.
    async fn teardown(
        &self,
        chunk_rx: mpsc::Receiver<AudioChunk>,
        mut sink: Box<dyn UpstreamSink>,
        mut events: mpsc::Receiver<UpstreamEvent>,
        failure: Option<String>,
    ) {
        self.transition(SessionState::Stopping);

        match sink.finish().await {
            Ok(()) if failure.is_none() => self.drain_results(&mut events).await,
            Ok(()) => {}
            Err(e) => warn!(session = %self.id, error = %e, "end-of-stream signal failed"),
        }

        {
            let mut tx = self.chunk_tx.lock().await;
            tx.take();
        }
        drop(chunk_rx);

        if let Err(e) = sink.close().await {
            warn!(session = %self.id, error = %e, "upstream close failed");
        }

        {
            let mut stopped = self.stopped_at.lock().await;
            stopped.get_or_insert_with(Utc::now);
        }

        let final_state = if failure.is_some() {
            SessionState::Failed
        } else {
            SessionState::Stopped
        };
        self.transition(final_state);

        if let Some(message) = failure {
            let _ = self.events.send(SessionEvent::Error {
                session_id: self.id.clone(),
                message,
            });
        }
        let _ = self.events.send(SessionEvent::Ended {
            session_id: self.id.clone(),
            state: final_state,
        });

        info!(session = %self.id, state = ?final_state, "relay session ended");
    }

    /// Bounded wait for results the recognizer still owes after
    /// end-of-stream.
    async fn drain_results(&self, events: &mut mpsc::Receiver<UpstreamEvent>) {
        let deadline = Instant::now() + self.options.stop_grace;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(session = %self.id, "grace period elapsed before upstream flush");
                break;
            }

            match timeout(remaining, events.recv()).await {
                Ok(Some(UpstreamEvent::Transcript { text, is_final })) => {
                    self.handle_result(text, is_final).await;
                }
                Ok(Some(UpstreamEvent::Error(message))) => {
                    warn!(session = %self.id, %message, "upstream error during flush");
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(session = %self.id, "grace period elapsed before upstream flush");
                    break;
                }
            }
        }
    }

    /// Only final results reach the cumulative transcript; interim results
    /// overwrite the transient slot and are never concatenated.
    async fn handle_result(&self, text: String, is_final: bool) {
        let result_index = self.events_seen.fetch_add(1, Ordering::SeqCst) as u64;

        if is_final {
            let mut finals = self.finals.lock().await;
            finals.push_str(&text);
            finals.push('\n');
            self.interim.lock().await.take();
        } else {
            *self.interim.lock().await = Some(text.clone());
        }

        let event = SessionEvent::Transcript(TranscriptEvent {
            session_id: self.id.clone(),
            transcript: text,
            is_final,
            result_index,
        });
        // Send only fails when no sink is subscribed; REST pollers read the
        // accumulated state instead.
        let _ = self.events.send(event);
    }

    fn transition(&self, next: SessionState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next || state.is_terminal() {
                false
            } else {
                *state = next;
                true
            }
        });
    }
}
