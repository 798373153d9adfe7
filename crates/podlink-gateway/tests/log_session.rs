//! End-to-end log sessions over an in-memory WebSocket.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{mute_ws_pair, read_transcript, ws_pair, DropFlag, ScriptedProvider};
use podlink_core::ServerMessage;
use podlink_gateway::application::{run_log_session, LogOptions};
use podlink_gateway::domain::{CloseReason, ErrorPayload, GatewayConfig, LogParams, WorkloadTarget};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

fn log_params(follow: bool, tail: u32) -> LogParams {
    LogParams {
        target: WorkloadTarget {
            namespace: "default".to_string(),
            pod: None,
            container: "app".to_string(),
        },
        follow,
        previous: false,
        tail,
    }
}

#[tokio::test(start_paused = true)]
async fn test_hundred_lines_become_hundred_text_frames() {
    // Arrange
    let log: String = (1..=100).map(|i| format!("line {i}\n")).collect();
    let provider = Arc::new(ScriptedProvider::with_log(Box::new(std::io::Cursor::new(
        log.into_bytes(),
    ))));
    let (server, mut client) = ws_pair().await;

    // Act
    let reason = run_log_session(
        server,
        Uuid::new_v4(),
        log_params(false, 100),
        provider.clone(),
        Arc::new(GatewayConfig::default()),
    )
    .await;
    let transcript = read_transcript(&mut client).await;

    // Assert
    assert_eq!(reason, CloseReason::Completed);
    assert_eq!(transcript.frames.len(), 100);
    for (i, frame) in transcript.frames.iter().enumerate() {
        assert_eq!(
            frame,
            &ServerMessage::TextChunk(format!("line {}\n", i + 1).into_bytes())
        );
    }
    assert_eq!(transcript.close, Some((1000, String::new())));
    assert_eq!(
        provider.log_options.lock().unwrap()[0],
        LogOptions {
            tail: 100,
            follow: false,
            previous: false,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_silent_browser_in_follow_mode_trips_the_watchdog() {
    // Arrange: a followed log that never ends, and a browser that never
    // answers, so no Pong is ever sent back
    let (mut upstream, source) = tokio::io::duplex(1024);
    upstream.write_all(b"started\n").await.unwrap();
    let dropped = Arc::new(AtomicBool::new(false));
    let provider = Arc::new(ScriptedProvider::with_log(Box::new(DropFlag {
        inner: source,
        dropped: Arc::clone(&dropped),
    })));
    let config = GatewayConfig {
        ping_interval: Duration::from_secs(2),
        pong_timeout: Duration::from_secs(5),
        log_read_timeout: Duration::from_secs(1),
        ..GatewayConfig::default()
    };
    let (server, mut client) = mute_ws_pair().await;
    let started = tokio::time::Instant::now();

    // Act
    let reason = run_log_session(
        server,
        Uuid::new_v4(),
        log_params(true, 100),
        provider,
        Arc::new(config),
    )
    .await;
    let elapsed = started.elapsed();
    for _ in 0..100 {
        if dropped.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let transcript = read_transcript(&mut client).await;

    // Assert
    assert_eq!(reason, CloseReason::PeerUnresponsive);
    assert!(elapsed >= Duration::from_secs(5), "closed early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "closed late: {elapsed:?}");
    assert!(dropped.load(Ordering::SeqCst), "upstream reader must be closed");
    assert_eq!(
        transcript.frames,
        vec![ServerMessage::TextChunk(b"started\n".to_vec())]
    );
    assert_eq!(transcript.pings, 2);
    let (code, text) = transcript.close.expect("close frame");
    assert_eq!(code, 1011);
    let payload: ErrorPayload = serde_json::from_str(&text).unwrap();
    assert_eq!(payload.kind, "timeout");
    drop(upstream);
}

#[tokio::test(start_paused = true)]
async fn test_follow_mode_survives_quiet_periods() {
    // Arrange
    let (mut upstream, source) = tokio::io::duplex(1024);
    let provider = Arc::new(ScriptedProvider::with_log(Box::new(source)));
    let config = GatewayConfig {
        log_read_timeout: Duration::from_secs(1),
        ..GatewayConfig::default()
    };
    let (server, mut client) = ws_pair().await;
    let session = tokio::spawn(run_log_session(
        server,
        Uuid::new_v4(),
        log_params(true, 10),
        provider,
        Arc::new(config),
    ));

    // Act: one line, a quiet stretch of several read timeouts, another line,
    // then the container exits
    upstream.write_all(b"first\n").await.unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;
    upstream.write_all(b"second\n").await.unwrap();
    drop(upstream);
    let transcript = read_transcript(&mut client).await;
    let reason = session.await.unwrap();

    // Assert
    assert_eq!(reason, CloseReason::Completed);
    assert_eq!(
        transcript.frames,
        vec![
            ServerMessage::TextChunk(b"first\n".to_vec()),
            ServerMessage::TextChunk(b"second\n".to_vec()),
        ]
    );
    assert_eq!(transcript.close, Some((1000, String::new())));
}

#[tokio::test]
async fn test_missing_container_log_closes_with_upstream_error() {
    let provider = Arc::new(ScriptedProvider::default());
    let (server, mut client) = ws_pair().await;

    let reason = run_log_session(
        server,
        Uuid::new_v4(),
        log_params(false, 100),
        provider,
        Arc::new(GatewayConfig::default()),
    )
    .await;
    let transcript = read_transcript(&mut client).await;

    assert!(matches!(reason, CloseReason::Upstream(_)));
    let (code, text) = transcript.close.expect("close frame");
    assert_eq!(code, 1011);
    let payload: ErrorPayload = serde_json::from_str(&text).unwrap();
    assert_eq!(payload.kind, "upstream");
    assert_eq!(payload.message, "container app not found");
}
