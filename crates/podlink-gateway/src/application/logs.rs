//! Log streaming session driver.
//!
//! The log stream is read through a [`TimeoutReader`] with the configured
//! per-read deadline.  Without `follow` a quiet stream is a finished stream,
//! so a timeout closes the reader and ends the session normally.  With
//! `follow` quiet periods are expected and only the watchdog (or the browser)
//! ends the session.

use std::sync::Arc;

use futures_util::StreamExt;
use podlink_core::{spawn_pump, Framing, StreamKind, TimeoutPolicy, TimeoutReader};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::inbound::run_drain;
use crate::application::outbound::run_outbound;
use crate::application::provider::{LogOptions, WorkloadProvider};
use crate::application::session::Session;
use crate::domain::{CloseReason, GatewayConfig, LogParams};

/// Runs one log session to completion and returns why it ended.
pub async fn run_log_session<T>(
    ws: WebSocketStream<T>,
    id: Uuid,
    params: LogParams,
    provider: Arc<dyn WorkloadProvider>,
    config: Arc<GatewayConfig>,
) -> CloseReason
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws.split();
    let session = Session::new(id, sink, config.close_grace);

    let options = LogOptions::from(&params);
    let source = match provider.open_log_stream(&params.target, options).await {
        Ok(source) => source,
        Err(e) => {
            warn!("session {id}: cannot open log of {}: {e}", params.target);
            session.close_all(CloseReason::Upstream(e.to_string())).await;
            return session.close_reason().cloned().unwrap_or(CloseReason::Completed);
        }
    };
    info!(
        "session {id}: streaming log of {} (tail={}, follow={}, previous={})",
        params.target, options.tail, options.follow, options.previous
    );

    let reader = TimeoutReader::new(source, Some(config.log_read_timeout), !params.follow);
    session.attach_reader(reader.closer());
    let policy = if params.follow {
        TimeoutPolicy::Retry
    } else {
        TimeoutPolicy::EndOfStream
    };

    let (done_tx, done_rx) = mpsc::channel(1);
    let pump = spawn_pump(
        StreamKind::Log,
        reader,
        config.chunk_size,
        Framing::Lines,
        policy,
        done_tx,
    );

    session.arm_watchdog(config.pong_timeout);
    let drain = tokio::spawn(run_drain(stream, Arc::clone(&session)));
    run_outbound(Arc::clone(&session), vec![pump], done_rx, config.ping_interval).await;
    let _ = drain.await;

    session.close_reason().cloned().unwrap_or(CloseReason::Completed)
}
