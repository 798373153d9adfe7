//! Shared fixtures for the gateway integration tests.

#![allow(dead_code)]

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::StreamExt;
use podlink_core::{decode_server_message, Command, ServerMessage, SizeReceiver};
use podlink_gateway::application::{
    BoxReader, ExecChannel, LogOptions, ProviderError, WorkloadProvider,
};
use podlink_gateway::domain::WorkloadTarget;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// A connected server/client WebSocket pair over an in-memory pipe.
pub async fn ws_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
    let (a, b) = tokio::io::duplex(256 * 1024);
    let server = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
    let client = WebSocketStream::from_raw_socket(b, Role::Client, None).await;
    (server, client)
}

/// A browser transport that reads but never answers: every write, automatic
/// Pongs included, is discarded.
pub struct MuteClient {
    inner: DuplexStream,
}

impl AsyncRead for MuteClient {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MuteClient {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Like [`ws_pair`], but the browser side never sends anything back.
pub async fn mute_ws_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<MuteClient>) {
    let (a, b) = tokio::io::duplex(256 * 1024);
    let server = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
    let client = WebSocketStream::from_raw_socket(MuteClient { inner: b }, Role::Client, None).await;
    (server, client)
}

/// Everything the browser saw on a connection, up to and including Close.
#[derive(Debug, Default)]
pub struct Transcript {
    pub frames: Vec<ServerMessage>,
    pub pings: usize,
    pub close: Option<(u16, String)>,
}

/// Reads the client side until a Close frame or the end of the stream.
pub async fn read_transcript<S>(client: &mut WebSocketStream<S>) -> Transcript
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let mut transcript = Transcript::default();
    while let Some(Ok(msg)) = client.next().await {
        match msg {
            Message::Binary(bytes) => transcript
                .frames
                .push(decode_server_message(&bytes).expect("server frame")),
            Message::Ping(_) => transcript.pings += 1,
            Message::Close(frame) => {
                transcript.close =
                    frame.map(|f| (u16::from(f.code), f.reason.into_owned()));
                break;
            }
            _ => {}
        }
    }
    transcript
}

/// A reader that records when it is dropped.
pub struct DropFlag<R> {
    pub inner: R,
    pub dropped: Arc<AtomicBool>,
}

impl<R: AsyncRead + Unpin> AsyncRead for DropFlag<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<R> Drop for DropFlag<R> {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

/// Provider handing out pre-built pipes, one session each.
#[derive(Default)]
pub struct ScriptedProvider {
    pub exec: Mutex<Option<ExecChannel>>,
    pub log: Mutex<Option<BoxReader>>,
    pub commands: Mutex<Vec<Command>>,
    pub log_options: Mutex<Vec<LogOptions>>,
    pub sizes: Mutex<Option<SizeReceiver>>,
}

impl ScriptedProvider {
    pub fn with_exec(channel: ExecChannel) -> Self {
        let provider = Self::default();
        *provider.exec.lock().unwrap() = Some(channel);
        provider
    }

    pub fn with_log(reader: BoxReader) -> Self {
        let provider = Self::default();
        *provider.log.lock().unwrap() = Some(reader);
        provider
    }
}

#[async_trait]
impl WorkloadProvider for ScriptedProvider {
    async fn open_exec_channel(
        &self,
        target: &WorkloadTarget,
        command: &Command,
        _tty: bool,
        sizes: Option<SizeReceiver>,
    ) -> Result<ExecChannel, ProviderError> {
        self.commands.lock().unwrap().push(command.clone());
        *self.sizes.lock().unwrap() = sizes;
        self.exec
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ProviderError::NotFound(target.container.clone()))
    }

    async fn open_log_stream(
        &self,
        target: &WorkloadTarget,
        options: LogOptions,
    ) -> Result<BoxReader, ProviderError> {
        self.log_options.lock().unwrap().push(options);
        self.log
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ProviderError::NotFound(target.container.clone()))
    }
}
