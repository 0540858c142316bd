// Relay session lifecycle tests: ordering, idempotent stop, event
// demultiplexing, and failure containment, exercised against a scripted
// upstream adapter.

mod support;

use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;

use support::{test_options, wait_for_transcript, wait_until_written, ScriptedUpstream};
use tabscribe::{SessionEvent, SessionRegistry, SessionState, UpstreamEvent};

#[tokio::test]
async fn chunks_forward_in_submission_order() {
    let upstream = ScriptedUpstream::new();
    let registry = SessionRegistry::new(upstream.clone());

    let session = registry.start(test_options("tab-1")).await.unwrap();
    assert_eq!(session.state(), SessionState::Streaming);

    let payloads: Vec<&[u8]> = vec![b"alpha", b"bravo", b"charlie", b"delta", b"echo"];
    for payload in &payloads {
        session.submit_chunk(Bytes::copy_from_slice(payload)).await;
    }

    wait_until_written(&upstream, payloads.len()).await;
    let written = upstream.written.lock().await.clone();
    let expected: Vec<Vec<u8>> = payloads.iter().map(|p| p.to_vec()).collect();
    assert_eq!(written, expected);
}

#[tokio::test]
async fn overflow_drops_chunks_instead_of_buffering() {
    // A sink parked in write keeps the pump busy, so the bounded queue
    // fills and excess chunks get dropped rather than buffered.
    let upstream = ScriptedUpstream::stalling(Duration::from_secs(60));
    let registry = SessionRegistry::new(upstream.clone());

    let mut options = test_options("tab-1");
    options.queue_capacity = 2;
    let session = registry.start(options).await.unwrap();

    session.submit_chunk(Bytes::from_static(b"first")).await;
    wait_until_written(&upstream, 1).await;

    for payload in [b"a".as_ref(), b"b", b"c", b"d", b"e", b"f", b"g", b"h", b"i"] {
        session.submit_chunk(Bytes::copy_from_slice(payload)).await;
    }

    // First chunk forwarded, two more queued, the rest dropped.
    let stats = session.stats().await;
    assert_eq!(stats.chunks_submitted, 3);
    assert_eq!(stats.chunks_dropped, 7);
    assert_eq!(upstream.written.lock().await.len(), 1);
}

#[tokio::test]
async fn stop_is_idempotent_and_releases_once() {
    let upstream = ScriptedUpstream::new();
    let registry = SessionRegistry::new(upstream.clone());

    let session = registry.start(test_options("tab-1")).await.unwrap();

    session.stop().await;
    assert_eq!(session.state(), SessionState::Stopped);

    session.stop().await;
    assert_eq!(session.state(), SessionState::Stopped);

    assert_eq!(upstream.finishes.load(Ordering::SeqCst), 1);
    assert_eq!(upstream.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn chunks_after_stop_are_dropped_silently() {
    let upstream = ScriptedUpstream::new();
    let registry = SessionRegistry::new(upstream.clone());

    let session = registry.start(test_options("tab-1")).await.unwrap();
    session.submit_chunk(Bytes::from_static(b"before")).await;
    wait_until_written(&upstream, 1).await;

    session.stop().await;
    session.submit_chunk(Bytes::from_static(b"after")).await;

    assert_eq!(upstream.written.lock().await.len(), 1);
    let stats = session.stats().await;
    assert_eq!(stats.chunks_submitted, 1);
    assert!(stats.chunks_dropped >= 1);
}

#[tokio::test]
async fn no_events_reach_sinks_after_stop() {
    let upstream = ScriptedUpstream::new();
    let registry = SessionRegistry::new(upstream.clone());

    let session = registry.start(test_options("tab-1")).await.unwrap();
    session.stop().await;

    // The session no longer listens, so injection fails outright.
    let delivered = upstream
        .emit(UpstreamEvent::Transcript {
            text: "too late".to_string(),
            is_final: true,
        })
        .await;
    assert!(!delivered);
    assert_eq!(session.transcript().await, "");
}

#[tokio::test]
async fn only_final_results_accumulate() {
    let upstream = ScriptedUpstream::new();
    let registry = SessionRegistry::new(upstream.clone());

    let session = registry.start(test_options("tab-1")).await.unwrap();

    for text in ["he", "hell", "hello"] {
        assert!(
            upstream
                .emit(UpstreamEvent::Transcript {
                    text: text.to_string(),
                    is_final: false,
                })
                .await
        );
    }
    assert!(
        upstream
            .emit(UpstreamEvent::Transcript {
                text: "hello there".to_string(),
                is_final: true,
            })
            .await
    );

    wait_for_transcript(&session, "hello there\n").await;
    assert_eq!(session.interim().await, None);

    session.stop().await;
    assert_eq!(session.transcript().await, "hello there\n");
}

#[tokio::test]
async fn interim_results_overwrite_transient_slot() {
    let upstream = ScriptedUpstream::new();
    let registry = SessionRegistry::new(upstream.clone());

    let session = registry.start(test_options("tab-1")).await.unwrap();

    assert!(
        upstream
            .emit(UpstreamEvent::Transcript {
                text: "par".to_string(),
                is_final: false,
            })
            .await
    );
    assert!(
        upstream
            .emit(UpstreamEvent::Transcript {
                text: "partial".to_string(),
                is_final: false,
            })
            .await
    );

    for _ in 0..200 {
        if session.interim().await.as_deref() == Some("partial") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(session.interim().await.as_deref(), Some("partial"));
    assert_eq!(session.transcript().await, "");

    session.stop().await;
}

#[tokio::test]
async fn subscribers_see_transcript_then_ended_events() {
    let upstream = ScriptedUpstream::new();
    let registry = SessionRegistry::new(upstream.clone());

    let session = registry.start(test_options("tab-1")).await.unwrap();
    let mut events = session.subscribe();

    assert!(
        upstream
            .emit(UpstreamEvent::Transcript {
                text: "hello".to_string(),
                is_final: false,
            })
            .await
    );
    assert!(
        upstream
            .emit(UpstreamEvent::Transcript {
                text: "hello world".to_string(),
                is_final: true,
            })
            .await
    );

    let first = timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    match first {
        SessionEvent::Transcript(event) => {
            assert_eq!(event.transcript, "hello");
            assert!(!event.is_final);
            assert_eq!(event.result_index, 0);
        }
        other => panic!("expected interim transcript event, got {other:?}"),
    }

    let second = timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    match second {
        SessionEvent::Transcript(event) => {
            assert_eq!(event.transcript, "hello world");
            assert!(event.is_final);
            assert_eq!(event.result_index, 1);
        }
        other => panic!("expected final transcript event, got {other:?}"),
    }

    session.stop().await;

    let last = timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    match last {
        SessionEvent::Ended { state, .. } => assert_eq!(state, SessionState::Stopped),
        other => panic!("expected ended event, got {other:?}"),
    }
}

#[tokio::test]
async fn full_session_scenario() {
    let upstream = ScriptedUpstream::new();
    let registry = SessionRegistry::new(upstream.clone());

    let session = registry.start(test_options("tab-7")).await.unwrap();
    assert_eq!(session.state(), SessionState::Streaming);

    for payload in [b"one".as_ref(), b"two", b"three"] {
        session.submit_chunk(Bytes::copy_from_slice(payload)).await;
    }
    wait_until_written(&upstream, 3).await;

    assert!(
        upstream
            .emit(UpstreamEvent::Transcript {
                text: "hello".to_string(),
                is_final: false,
            })
            .await
    );
    assert!(
        upstream
            .emit(UpstreamEvent::Transcript {
                text: "hello world".to_string(),
                is_final: true,
            })
            .await
    );
    wait_for_transcript(&session, "hello world\n").await;

    session.stop().await;

    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.transcript().await, "hello world\n");
    assert_eq!(upstream.finishes.load(Ordering::SeqCst), 1);
    assert_eq!(upstream.closes.load(Ordering::SeqCst), 1);

    let stats = session.stats().await;
    assert_eq!(stats.chunks_submitted, 3);
    assert_eq!(stats.transcript_events, 2);
    assert!(stats.stopped_at.is_some());
}

#[tokio::test]
async fn transport_abort_marks_session_failed() {
    let upstream = ScriptedUpstream::new();
    let registry = SessionRegistry::new(upstream.clone());

    let session = registry.start(test_options("tab-1")).await.unwrap();
    let mut events = session.subscribe();

    session.abort("transport error: connection reset").await;

    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(upstream.finishes.load(Ordering::SeqCst), 1);
    assert_eq!(upstream.closes.load(Ordering::SeqCst), 1);

    let first = timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    match first {
        SessionEvent::Error { message, .. } => {
            assert_eq!(message, "transport error: connection reset");
        }
        other => panic!("expected error event, got {other:?}"),
    }
    let last = timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    match last {
        SessionEvent::Ended { state, .. } => assert_eq!(state, SessionState::Failed),
        other => panic!("expected ended event, got {other:?}"),
    }

    // Abort is as idempotent as stop.
    session.abort("again").await;
    assert_eq!(upstream.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn upstream_stream_error_fails_the_session() {
    let upstream = ScriptedUpstream::new();
    let registry = SessionRegistry::new(upstream.clone());

    let session = registry.start(test_options("tab-1")).await.unwrap();
    let mut events = session.subscribe();

    assert!(
        upstream
            .emit(UpstreamEvent::Error("vendor went away".to_string()))
            .await
    );

    for _ in 0..200 {
        if session.state().is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(session.state(), SessionState::Failed);

    // Handles still released exactly once on the failure path.
    assert_eq!(upstream.closes.load(Ordering::SeqCst), 1);

    let first = timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    match first {
        SessionEvent::Error { message, .. } => assert_eq!(message, "vendor went away"),
        other => panic!("expected error event, got {other:?}"),
    }
    let last = timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    match last {
        SessionEvent::Ended { state, .. } => assert_eq!(state, SessionState::Failed),
        other => panic!("expected ended event, got {other:?}"),
    }
}
