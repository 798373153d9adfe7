//! A [`WorkloadProvider`] backed by the local machine.
//!
//! Exec sessions run the command as a child process of the gateway; the
//! target's namespace and pod are only used for logging.  No pseudo-terminal
//! is allocated, so resize events are drained and logged.
//!
//! Log sessions read `<log_dir>/<container>.log` (or
//! `<container>.previous.log`).  In follow mode the file is polled for
//! appended bytes until the session drops its end of the stream.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use podlink_core::{Command, SizeReceiver};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::application::{BoxReader, ExecChannel, LogOptions, ProviderError, WorkloadProvider};
use crate::domain::WorkloadTarget;

/// How often a followed log file is checked for new data.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Buffer between the file follower task and the session.
const FOLLOW_BUFFER: usize = 64 * 1024;

/// Runs commands as local child processes and serves logs from a directory.
#[derive(Debug, Clone)]
pub struct LocalProcessProvider {
    log_dir: PathBuf,
    poll_interval: Duration,
}

impl LocalProcessProvider {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides how often followed log files are polled.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Location of a container's log file.  `None` if the container name
    /// would escape the log directory.
    fn log_path(&self, container: &str, previous: bool) -> Option<PathBuf> {
        if container.is_empty()
            || container.contains(['/', '\\'])
            || container == "."
            || container == ".."
        {
            return None;
        }
        let file = if previous {
            format!("{container}.previous.log")
        } else {
            format!("{container}.log")
        };
        Some(self.log_dir.join(file))
    }
}

#[async_trait]
impl WorkloadProvider for LocalProcessProvider {
    async fn open_exec_channel(
        &self,
        target: &WorkloadTarget,
        command: &Command,
        tty: bool,
        sizes: Option<SizeReceiver>,
    ) -> Result<ExecChannel, ProviderError> {
        let stdin = if command.interactive {
            Stdio::piped()
        } else {
            Stdio::null()
        };
        let mut child = tokio::process::Command::new(&command.name)
            .args(&command.args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProviderError::Spawn {
                command: command.name.clone(),
                source,
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(ProviderError::Other(format!(
                "{} started without output pipes",
                command.name
            )));
        };
        let stdin = child
            .stdin
            .take()
            .map(|pipe| Box::new(pipe) as crate::application::BoxWriter);

        let pid = child.id();
        debug!("started {} (pid {pid:?}) for {target}", command.name);
        if tty {
            debug!("no pseudo-terminal available locally for {target}; running without one");
        }
        if let Some(sizes) = sizes {
            tokio::spawn(drain_resizes(sizes, target.to_string()));
        }

        let (guard, released) = oneshot::channel();
        let guard = Arc::new(guard);
        tokio::spawn(supervise(child, released, command.name.clone()));

        Ok(ExecChannel {
            stdin,
            stdout: Box::new(Guarded {
                inner: stdout,
                _guard: Arc::clone(&guard),
            }),
            stderr: Box::new(Guarded {
                inner: stderr,
                _guard: guard,
            }),
        })
    }

    async fn open_log_stream(
        &self,
        target: &WorkloadTarget,
        options: LogOptions,
    ) -> Result<BoxReader, ProviderError> {
        let path = self
            .log_path(&target.container, options.previous)
            .ok_or_else(|| ProviderError::NotFound(target.container.clone()))?;

        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProviderError::NotFound(target.container.clone()));
            }
            Err(source) => {
                return Err(ProviderError::LogUnavailable {
                    target: target.to_string(),
                    source,
                });
            }
        };

        let backlog = content[tail_start(&content, options.tail)..].to_vec();
        if !options.follow {
            return Ok(Box::new(std::io::Cursor::new(backlog)));
        }

        let (writer, reader) = tokio::io::duplex(FOLLOW_BUFFER);
        tokio::spawn(follow_file(
            path,
            content.len() as u64,
            backlog,
            writer,
            self.poll_interval,
        ));
        Ok(Box::new(reader))
    }
}

// ── Exec helpers ──────────────────────────────────────────────────────────────

/// Output pipe of a child.  The child lives until every pipe sharing the
/// guard has been dropped.
struct Guarded<R> {
    inner: R,
    _guard: Arc<oneshot::Sender<()>>,
}

impl<R: AsyncRead + Unpin> AsyncRead for Guarded<R> {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// Reaps the child, or kills it once the session lets go of both output
/// pipes.
async fn supervise(mut child: Child, released: oneshot::Receiver<()>, name: String) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => debug!("{name} exited with {status}"),
            Err(e) => warn!("failed to wait for {name}: {e}"),
        },
        _ = released => {
            if let Err(e) = child.kill().await {
                debug!("could not kill {name}: {e}");
            } else {
                debug!("killed {name} after its session ended");
            }
        }
    }
}

async fn drain_resizes(mut sizes: SizeReceiver, target: String) {
    while let Some(size) = sizes.next().await {
        debug!("resize for {target}: {}x{}", size.width, size.height);
    }
}

// ── Log helpers ───────────────────────────────────────────────────────────────

/// Byte offset where the last `lines` lines of `content` begin.  A trailing
/// newline does not start an extra empty line.
fn tail_start(content: &[u8], lines: u32) -> usize {
    if lines == 0 {
        return content.len();
    }
    let body = content.strip_suffix(b"\n").unwrap_or(content);
    let mut remaining = lines;
    for (i, byte) in body.iter().enumerate().rev() {
        if *byte == b'\n' {
            remaining -= 1;
            if remaining == 0 {
                return i + 1;
            }
        }
    }
    0
}

/// Writes `backlog`, then everything appended to `path` after `offset`, into
/// `out` until the reading side is dropped.
async fn follow_file(
    path: PathBuf,
    mut offset: u64,
    backlog: Vec<u8>,
    mut out: DuplexStream,
    poll_interval: Duration,
) {
    if out.write_all(&backlog).await.is_err() {
        return;
    }
    let mut file = match open_at(&path, offset).await {
        Ok(file) => file,
        Err(e) => {
            warn!("cannot follow {}: {e}", path.display());
            return;
        }
    };

    let mut buf = vec![0u8; 8 * 1024];
    loop {
        let n = match file.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                warn!("reading {} failed: {e}", path.display());
                return;
            }
        };
        if n > 0 {
            offset += n as u64;
            if out.write_all(&buf[..n]).await.is_err() {
                return;
            }
            continue;
        }

        // An empty write fails once the session has dropped its end.
        if let Ok(Err(_)) = tokio::time::timeout(poll_interval, out.write(&[])).await {
            debug!("stopped following {}", path.display());
            return;
        }
        tokio::time::sleep(poll_interval).await;

        // A file shorter than what we have read was truncated or rotated.
        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.len() < offset {
                offset = 0;
                match open_at(&path, 0).await {
                    Ok(reopened) => file = reopened,
                    Err(e) => {
                        warn!("cannot reopen {}: {e}", path.display());
                        return;
                    }
                }
            }
        }
    }
}

async fn open_at(path: &Path, offset: u64) -> std::io::Result<File> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    Ok(file)
}
