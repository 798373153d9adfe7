//! Integration tests wiring the stream primitives together the way a log
//! session does: a [`TimeoutReader`] feeding a pump, guarded by a
//! [`Watchdog`] whose expiry closes the reader.

use std::time::Duration;

use podlink_core::{spawn_pump, Framing, StreamKind, TimeoutPolicy, TimeoutReader, Watchdog};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

#[tokio::test(start_paused = true)]
async fn test_watchdog_expiry_closes_follow_reader_and_ends_pump() {
    // Arrange: a follow-mode reader that never sees more data
    let (mut upstream, source) = tokio::io::duplex(256);
    upstream.write_all(b"boot complete\n").await.unwrap();

    let reader = TimeoutReader::new(source, Some(Duration::from_secs(1)), false);
    let closer = reader.closer();
    let (done_tx, mut done_rx) = mpsc::channel(1);
    let mut pump = spawn_pump(StreamKind::Log, reader, 1024, Framing::Lines, TimeoutPolicy::Retry, done_tx);

    let dog = Watchdog::new(Duration::from_secs(5), {
        let closer = closer.clone();
        move || {
            closer.close();
        }
    });

    // Act
    let first = pump.chunks.recv().await.expect("first chunk");
    assert_eq!(first.data, b"boot complete\n");
    first.ack();
    tokio::time::sleep(Duration::from_secs(6)).await;

    // Assert
    assert!(dog.is_expired());
    assert!(closer.is_closed());
    let exit = done_rx.recv().await.expect("pump must report its exit");
    assert_eq!(exit.kind, StreamKind::Log);
    assert!(exit.result.is_ok(), "a close is a graceful end of stream");
}

#[tokio::test(start_paused = true)]
async fn test_non_follow_reader_ends_after_last_line() {
    // Arrange: 100 lines, then the writer goes quiet without closing
    let (mut upstream, source) = tokio::io::duplex(64 * 1024);
    for i in 0..100 {
        upstream
            .write_all(format!("line {i}\n").as_bytes())
            .await
            .unwrap();
    }
    let reader = TimeoutReader::new(source, Some(Duration::from_secs(5)), true);
    let (done_tx, mut done_rx) = mpsc::channel(1);
    let mut pump = spawn_pump(
        StreamKind::Log,
        reader,
        32 * 1024,
        Framing::Lines,
        TimeoutPolicy::EndOfStream,
        done_tx,
    );

    // Act
    let mut chunks = Vec::new();
    while let Some(chunk) = pump.chunks.recv().await {
        chunks.push(String::from_utf8(chunk.data.clone()).unwrap());
        chunk.ack();
    }
    let exit = done_rx.recv().await.unwrap();

    // Assert: one chunk per line, in order
    assert_eq!(chunks.len(), 100);
    assert_eq!(chunks[0], "line 0\n");
    assert_eq!(chunks[99], "line 99\n");
    assert!(exit.result.is_ok());
}
