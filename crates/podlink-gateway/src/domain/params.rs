//! Session-establishment parameters carried by the WebSocket upgrade request.
//!
//! ```text
//! GET /exec?namespace=shop&pod=web-0&container=app&tty=true&interactive=true
//! GET /logs?container=app&follow=true&tail=200
//! ```
//!
//! Parsing happens during the upgrade so that a bad request is answered with
//! a plain HTTP status instead of an accepted-then-closed WebSocket.

use podlink_core::Command;
use thiserror::Error;
use url::form_urlencoded;

/// Path of the interactive exec endpoint.
pub const EXEC_PATH: &str = "/exec";
/// Path of the log streaming endpoint.
pub const LOGS_PATH: &str = "/logs";

/// Namespace used when the request does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";
/// Lines of history sent when `tail` is absent or unparsable.
pub const DEFAULT_TAIL: u32 = 100;
/// Largest accepted `tail`.
pub const MAX_TAIL: u32 = 1000;

/// Why an upgrade request was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("no session endpoint at {0}")]
    UnknownPath(String),

    #[error("missing required parameter: container")]
    MissingContainer,

    #[error("invalid boolean for {name}: {value:?}")]
    InvalidBool { name: &'static str, value: String },
}

impl ParamError {
    /// HTTP status sent back instead of switching protocols.
    pub fn http_status(&self) -> u16 {
        match self {
            ParamError::UnknownPath(_) => 404,
            ParamError::MissingContainer | ParamError::InvalidBool { .. } => 400,
        }
    }
}

/// The container a session talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadTarget {
    pub namespace: String,
    /// `None` lets the provider pick the pod.
    pub pod: Option<String>,
    pub container: String,
}

impl std::fmt::Display for WorkloadTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.pod {
            Some(pod) => write!(f, "{}/{}/{}", self.namespace, pod, self.container),
            None => write!(f, "{}/{}", self.namespace, self.container),
        }
    }
}

/// Parameters of an interactive exec session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecParams {
    pub target: WorkloadTarget,
    /// Present only when the query string set it.
    pub tty: Option<bool>,
    pub interactive: Option<bool>,
}

impl ExecParams {
    /// Resolves the `(tty, interactive)` flags for `command`.
    ///
    /// A flag given in the query string caps the one in the command frame: the
    /// session gets a terminal only if both allow it.  Without a query flag
    /// the command frame decides alone.
    pub fn effective_flags(&self, command: &Command) -> (bool, bool) {
        let tty = self.tty.map_or(command.tty, |q| q && command.tty);
        let interactive = self
            .interactive
            .map_or(command.interactive, |q| q && command.interactive);
        (tty, interactive)
    }
}

/// Parameters of a log streaming session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogParams {
    pub target: WorkloadTarget,
    pub follow: bool,
    pub previous: bool,
    /// Always within `1..=MAX_TAIL`.
    pub tail: u32,
}

/// A parsed upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRequest {
    Exec(ExecParams),
    Logs(LogParams),
}

impl SessionRequest {
    /// Parses the request path and optional query string.
    ///
    /// # Errors
    ///
    /// [`ParamError::UnknownPath`] for anything but `/exec` and `/logs`,
    /// [`ParamError::MissingContainer`] when `container` is absent or empty,
    /// [`ParamError::InvalidBool`] for an unrecognised boolean spelling.
    pub fn parse(path: &str, query: Option<&str>) -> Result<Self, ParamError> {
        let query = Query::new(query.unwrap_or(""));
        match path.trim_end_matches('/') {
            EXEC_PATH => Ok(SessionRequest::Exec(ExecParams {
                target: query.target()?,
                tty: query.bool("tty")?,
                interactive: query.bool("interactive")?,
            })),
            LOGS_PATH => Ok(SessionRequest::Logs(LogParams {
                target: query.target()?,
                follow: query.bool("follow")?.unwrap_or(false),
                previous: query.bool("previous")?.unwrap_or(false),
                tail: query.tail(),
            })),
            _ => Err(ParamError::UnknownPath(path.to_string())),
        }
    }

    pub fn target(&self) -> &WorkloadTarget {
        match self {
            SessionRequest::Exec(p) => &p.target,
            SessionRequest::Logs(p) => &p.target,
        }
    }

    /// Short mode name for log messages.
    pub fn mode(&self) -> &'static str {
        match self {
            SessionRequest::Exec(_) => "exec",
            SessionRequest::Logs(_) => "logs",
        }
    }
}

// ── Query helpers ─────────────────────────────────────────────────────────────

struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    fn new(raw: &str) -> Self {
        let pairs = form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    /// First non-empty value for `name`.
    fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, v)| k == name && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }

    fn target(&self) -> Result<WorkloadTarget, ParamError> {
        let container = self.get("container").ok_or(ParamError::MissingContainer)?;
        Ok(WorkloadTarget {
            namespace: self.get("namespace").unwrap_or(DEFAULT_NAMESPACE).to_string(),
            pod: self.get("pod").map(str::to_string),
            container: container.to_string(),
        })
    }

    fn bool(&self, name: &'static str) -> Result<Option<bool>, ParamError> {
        self.get(name)
            .map(|value| {
                parse_bool(value).ok_or_else(|| ParamError::InvalidBool {
                    name,
                    value: value.to_string(),
                })
            })
            .transpose()
    }

    fn tail(&self) -> u32 {
        match self.get("tail").and_then(|v| v.parse::<i64>().ok()) {
            Some(n) => n.clamp(1, i64::from(MAX_TAIL)) as u32,
            None => DEFAULT_TAIL,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
