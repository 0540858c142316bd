// Shared test support: an in-process upstream adapter with inspectable sink
// activity and test-driven result events.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;

use tabscribe::{
    RelaySession, SessionOptions, UpstreamAdapter, UpstreamConfig, UpstreamError, UpstreamEvent,
    UpstreamHandle, UpstreamSink,
};

pub struct ScriptedUpstream {
    fail_open: bool,
    open_delay: Duration,
    write_delay: Duration,
    pub written: Arc<Mutex<Vec<Vec<u8>>>>,
    pub finishes: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    events: Mutex<Option<mpsc::Sender<UpstreamEvent>>>,
}

impl ScriptedUpstream {
    pub fn new() -> Arc<Self> {
        Self::build(false, Duration::ZERO, Duration::ZERO)
    }

    /// An adapter whose `open` always fails.
    pub fn failing() -> Arc<Self> {
        Self::build(true, Duration::ZERO, Duration::ZERO)
    }

    /// An adapter whose vendor handshake takes `delay` before succeeding.
    pub fn slow_open(delay: Duration) -> Arc<Self> {
        Self::build(false, delay, Duration::ZERO)
    }

    /// An adapter whose sink parks inside every write for `delay`.
    pub fn stalling(delay: Duration) -> Arc<Self> {
        Self::build(false, Duration::ZERO, delay)
    }

    fn build(fail_open: bool, open_delay: Duration, write_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fail_open,
            open_delay,
            write_delay,
            written: Arc::new(Mutex::new(Vec::new())),
            finishes: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            events: Mutex::new(None),
        })
    }

    /// Injects a vendor event into the open stream. Returns false once the
    /// session no longer listens.
    pub async fn emit(&self, event: UpstreamEvent) -> bool {
        let guard = self.events.lock().await;
        match guard.as_ref() {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl UpstreamAdapter for ScriptedUpstream {
    async fn open(&self, _config: &UpstreamConfig) -> Result<UpstreamHandle, UpstreamError> {
        if self.fail_open {
            return Err(UpstreamError::Open("scripted open failure".to_string()));
        }
        if !self.open_delay.is_zero() {
            sleep(self.open_delay).await;
        }

        let (tx, rx) = mpsc::channel(64);
        *self.events.lock().await = Some(tx);

        Ok(UpstreamHandle {
            sink: Box::new(ScriptedSink {
                write_delay: self.write_delay,
                written: Arc::clone(&self.written),
                finishes: Arc::clone(&self.finishes),
                closes: Arc::clone(&self.closes),
            }),
            events: rx,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedSink {
    write_delay: Duration,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    finishes: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl UpstreamSink for ScriptedSink {
    async fn write(&mut self, payload: &[u8]) -> Result<(), UpstreamError> {
        self.written.lock().await.push(payload.to_vec());
        if !self.write_delay.is_zero() {
            sleep(self.write_delay).await;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), UpstreamError> {
        self.finishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), UpstreamError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Session options tuned for fast tests.
pub fn test_options(target: &str) -> SessionOptions {
    let mut options = SessionOptions::for_target(target);
    options.stop_grace = Duration::from_millis(200);
    options
}

pub async fn wait_until_written(upstream: &ScriptedUpstream, count: usize) {
    for _ in 0..200 {
        if upstream.written.lock().await.len() >= count {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {count} forwarded chunks");
}

pub async fn wait_for_transcript(session: &RelaySession, expected: &str) {
    for _ in 0..200 {
        if session.transcript().await == expected {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "timed out waiting for transcript {expected:?}, got {:?}",
        session.transcript().await
    );
}
