//! Upgrade routing over a real TCP listener.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{read_transcript, ScriptedProvider};
use podlink_core::ServerMessage;
use podlink_gateway::application::WorkloadProvider;
use podlink_gateway::domain::GatewayConfig;
use podlink_gateway::infrastructure::serve;
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;

struct TestServer {
    addr: std::net::SocketAddr,
    running: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start(provider: Arc<dyn WorkloadProvider>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(serve(
            listener,
            GatewayConfig::default(),
            provider,
            Arc::clone(&running),
        ));
        Self {
            addr,
            running,
            task,
        }
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("ws://{}{}", self.addr, path_and_query)
    }

    async fn stop(self) {
        self.running.store(false, Ordering::Relaxed);
        tokio::time::timeout(Duration::from_secs(2), self.task)
            .await
            .expect("accept loop must notice the shutdown flag")
            .unwrap()
            .unwrap();
    }
}

fn http_status(err: WsError) -> u16 {
    match err {
        WsError::Http(response) => response.status().as_u16(),
        other => panic!("expected an HTTP rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_path_is_refused_with_404() {
    let server = TestServer::start(Arc::new(ScriptedProvider::default())).await;

    let err = connect_async(server.url("/attach?container=app")).await.unwrap_err();

    assert_eq!(http_status(err), 404);
    server.stop().await;
}

#[tokio::test]
async fn test_missing_container_is_refused_with_400() {
    let server = TestServer::start(Arc::new(ScriptedProvider::default())).await;

    let err = connect_async(server.url("/logs?follow=true")).await.unwrap_err();

    assert_eq!(http_status(err), 400);
    server.stop().await;
}

#[tokio::test]
async fn test_malformed_boolean_is_refused_with_400() {
    let server = TestServer::start(Arc::new(ScriptedProvider::default())).await;

    let err = connect_async(server.url("/exec?container=app&tty=maybe"))
        .await
        .unwrap_err();

    assert_eq!(http_status(err), 400);
    server.stop().await;
}

#[tokio::test]
async fn test_log_request_is_routed_to_a_log_session() {
    // Arrange
    let provider = Arc::new(ScriptedProvider::with_log(Box::new(std::io::Cursor::new(
        b"hello\nworld\n".to_vec(),
    ))));
    let server = TestServer::start(provider.clone()).await;

    // Act
    let (mut ws, response) = connect_async(server.url("/logs/?container=app&tail=5000"))
        .await
        .unwrap();
    let transcript = read_transcript(&mut ws).await;

    // Assert
    assert_eq!(response.status().as_u16(), 101);
    assert_eq!(
        transcript.frames,
        vec![
            ServerMessage::TextChunk(b"hello\n".to_vec()),
            ServerMessage::TextChunk(b"world\n".to_vec()),
        ]
    );
    assert_eq!(transcript.close, Some((1000, String::new())));
    assert_eq!(provider.log_options.lock().unwrap()[0].tail, 1000);
    server.stop().await;
}
