//! The workload provider port.
//!
//! The gateway does not know how a command is started inside a container or
//! where container logs come from.  A [`WorkloadProvider`] does; sessions only
//! see the byte pipes it hands back.  The binary ships
//! [`LocalProcessProvider`](crate::infrastructure::local_provider::LocalProcessProvider);
//! an orchestration platform client would implement the same trait.

use async_trait::async_trait;
use podlink_core::{Command, SizeReceiver};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::domain::{LogParams, WorkloadTarget};

/// Upstream byte source owned by a session.
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
/// Upstream byte sink owned by a session.
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Pipes of a running remote command.
pub struct ExecChannel {
    /// `None` when the session is not interactive.
    pub stdin: Option<BoxWriter>,
    pub stdout: BoxReader,
    pub stderr: BoxReader,
}

impl std::fmt::Debug for ExecChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecChannel")
            .field("stdin", &self.stdin.is_some())
            .finish_non_exhaustive()
    }
}

/// How much of a container log to stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    /// Number of most recent lines to start with.
    pub tail: u32,
    /// Keep streaming appended lines after the tail.
    pub follow: bool,
    /// Read the log of the previous container instance.
    pub previous: bool,
}

impl From<&LogParams> for LogOptions {
    fn from(p: &LogParams) -> Self {
        Self {
            tail: p.tail,
            follow: p.follow,
            previous: p.previous,
        }
    }
}

/// Failure to open an upstream channel.  Surfaced to the browser in the
/// Close frame payload.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("container {0} not found")]
    NotFound(String),

    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("log for {target} unavailable: {source}")]
    LogUnavailable {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

/// Opens exec channels and log streams for a container.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkloadProvider: Send + Sync {
    /// Starts `command` in the target container.
    ///
    /// `sizes` is present only for terminal sessions and delivers resize
    /// events in the order the browser sent them.
    async fn open_exec_channel(
        &self,
        target: &WorkloadTarget,
        command: &Command,
        tty: bool,
        sizes: Option<SizeReceiver>,
    ) -> Result<ExecChannel, ProviderError>;

    /// Opens the container's log as a byte stream.
    async fn open_log_stream(
        &self,
        target: &WorkloadTarget,
        options: LogOptions,
    ) -> Result<BoxReader, ProviderError>;
}
