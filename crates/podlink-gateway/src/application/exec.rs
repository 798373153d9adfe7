//! Interactive exec session driver.
//!
//! 1. Wait for the `Command` frame (bounded by the pong timeout).
//! 2. Resolve tty/interactive against the query string and open the exec
//!    channel through the provider.
//! 3. Pump stdout and stderr to the browser while the inbound relay feeds
//!    stdin and resize events, until both streams end or anything fails.

use std::sync::Arc;

use futures_util::StreamExt;
use podlink_core::{
    spawn_pump, Command, Framing, StreamKind, TerminalSizeQueue, TimeoutPolicy, TimeoutReader,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::handshake::receive_command;
use crate::application::inbound::run_inbound;
use crate::application::outbound::run_outbound;
use crate::application::provider::WorkloadProvider;
use crate::application::session::{Session, WsSink};
use crate::domain::{CloseReason, ExecParams, GatewayConfig};

/// Runs one exec session to completion and returns why it ended.
pub async fn run_exec_session<T>(
    ws: WebSocketStream<T>,
    id: Uuid,
    params: ExecParams,
    provider: Arc<dyn WorkloadProvider>,
    config: Arc<GatewayConfig>,
) -> CloseReason
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, mut stream) = ws.split();
    let session = Session::new(id, sink, config.close_grace);

    let handshake = tokio::time::timeout(config.pong_timeout, receive_command(&mut stream)).await;
    let command = match handshake {
        Ok(Ok(command)) => command,
        Ok(Err(e)) => {
            warn!("session {id}: handshake failed: {e}");
            return finish(&session, CloseReason::Protocol(e.to_string())).await;
        }
        Err(_) => {
            warn!("session {id}: no command within {:?}", config.pong_timeout);
            let reason = CloseReason::Protocol("no command frame received".to_string());
            return finish(&session, reason).await;
        }
    };

    let (tty, interactive) = params.effective_flags(&command);
    let command = Command {
        tty,
        interactive,
        ..command
    };
    let (sizes_tx, sizes_rx) = if tty {
        let (tx, rx) = TerminalSizeQueue::with_capacity(config.size_queue_capacity);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let channel = match provider
        .open_exec_channel(&params.target, &command, tty, sizes_rx)
        .await
    {
        Ok(channel) => channel,
        Err(e) => {
            warn!("session {id}: cannot exec {} in {}: {e}", command.name, params.target);
            return finish(&session, CloseReason::Upstream(e.to_string())).await;
        }
    };
    info!(
        "session {id}: exec {} in {} (tty={tty}, interactive={interactive})",
        command.name, params.target
    );

    if interactive {
        if let Some(stdin) = channel.stdin {
            session.attach_stdin(stdin).await;
        }
    }

    let stdout = TimeoutReader::new(channel.stdout, None, false);
    let stderr = TimeoutReader::new(channel.stderr, None, false);
    session.attach_reader(stdout.closer());
    session.attach_reader(stderr.closer());

    let (done_tx, done_rx) = mpsc::channel(2);
    let pumps = vec![
        spawn_pump(
            StreamKind::Stdout,
            stdout,
            config.chunk_size,
            Framing::Raw,
            TimeoutPolicy::Retry,
            done_tx.clone(),
        ),
        spawn_pump(
            StreamKind::Stderr,
            stderr,
            config.chunk_size,
            Framing::Raw,
            TimeoutPolicy::Retry,
            done_tx,
        ),
    ];

    session.arm_watchdog(config.pong_timeout);
    let inbound = tokio::spawn(run_inbound(
        stream,
        Arc::clone(&session),
        sizes_tx,
        interactive,
    ));
    run_outbound(Arc::clone(&session), pumps, done_rx, config.ping_interval).await;
    let _ = inbound.await;

    session.close_reason().cloned().unwrap_or(CloseReason::Completed)
}

async fn finish<S: WsSink>(session: &Arc<Session<S>>, reason: CloseReason) -> CloseReason {
    session.close_all(reason).await;
    session.close_reason().cloned().unwrap_or(CloseReason::Completed)
}
