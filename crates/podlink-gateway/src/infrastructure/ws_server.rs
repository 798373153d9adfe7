//! WebSocket server: accept loop, upgrade routing and per-session tasks.
//!
//! 1. Bind a TCP listener on the configured address.
//! 2. Accept connections, one Tokio task each.
//! 3. During the HTTP upgrade, parse the path and query into a
//!    [`SessionRequest`].  A bad request is answered with a plain HTTP status
//!    (404 or 400) and never becomes a WebSocket.
//! 4. Hand the upgraded stream to the exec or log driver.
//! 5. Stop accepting when the `running` flag is cleared.  Sessions already
//!    running are left to finish on their own.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::{run_exec_session, run_log_session, WorkloadProvider};
use crate::domain::{GatewayConfig, ParamError, SessionRequest};

/// How long `accept()` may block before the shutdown flag is checked again.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves sessions until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_server(
    config: GatewayConfig,
    provider: Arc<dyn WorkloadProvider>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;

    info!("podlink gateway listening on {}", config.bind_addr);
    serve(listener, config, provider, running).await
}

/// Runs the accept loop on an already-bound listener.
///
/// # Errors
///
/// Currently infallible once the listener exists; accept errors are logged
/// and the loop continues.
pub async fn serve(
    listener: TcpListener,
    config: GatewayConfig,
    provider: Arc<dyn WorkloadProvider>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let config = Arc::new(config);

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                let cfg = Arc::clone(&config);
                let provider = Arc::clone(&provider);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, provider, cfg).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {
                // No connection in the last poll window; re-check the flag.
            }
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    provider: Arc<dyn WorkloadProvider>,
    config: Arc<GatewayConfig>,
) {
    let id = Uuid::new_v4();
    if let Err(e) = run_connection(stream, peer_addr, id, provider, config).await {
        warn!("session {id}: {e:#}");
    }
}

async fn run_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    id: Uuid,
    provider: Arc<dyn WorkloadProvider>,
    config: Arc<GatewayConfig>,
) -> anyhow::Result<()> {
    let mut request = None;
    let route = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match SessionRequest::parse(req.uri().path(), req.uri().query()) {
            Ok(parsed) => {
                request = Some(parsed);
                Ok(response)
            }
            Err(e) => Err(reject(&e)),
        }
    };

    let ws = accept_hdr_async(stream, route)
        .await
        .with_context(|| format!("upgrade from {peer_addr} refused or failed"))?;
    let request = request.context("upgrade completed without a parsed request")?;

    info!(
        "session {id}: {} session for {} from {peer_addr}",
        request.mode(),
        request.target()
    );

    let reason = match request {
        SessionRequest::Exec(params) => run_exec_session(ws, id, params, provider, config).await,
        SessionRequest::Logs(params) => run_log_session(ws, id, params, provider, config).await,
    };

    info!("session {id}: finished ({reason})");
    Ok(())
}

/// The HTTP response sent instead of `101 Switching Protocols`.
fn reject(err: &ParamError) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(err.to_string()));
    *response.status_mut() =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
    response
}
