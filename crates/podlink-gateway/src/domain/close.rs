//! Why a session ended and how that is reported in the Close frame.

use serde::{Deserialize, Serialize};

/// RFC 6455 normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// RFC 6455 internal error.  1006 (abnormal closure) is reserved for the
/// receiving side and cannot be sent, so fatal outcomes use this code.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// A Close frame payload is at most 125 bytes, two of which hold the code.
pub const MAX_CLOSE_REASON_LEN: usize = 123;

/// Outcome that triggered teardown.  The first reason recorded wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Every upstream stream reached end of stream.
    Completed,
    /// The browser sent a Close frame or ended the stream.
    PeerClosed,
    /// No Pong arrived within the watchdog timeout.
    PeerUnresponsive,
    /// The connection failed with a fatal or unclassified error.
    Transport(String),
    /// The initial command frame was missing or malformed.
    Protocol(String),
    /// The workload provider or an upstream pipe failed.
    Upstream(String),
}

impl CloseReason {
    /// `true` for the outcomes that end a session normally.
    pub fn is_normal(&self) -> bool {
        matches!(self, CloseReason::Completed | CloseReason::PeerClosed)
    }

    pub fn close_code(&self) -> u16 {
        if self.is_normal() {
            CLOSE_NORMAL
        } else {
            CLOSE_INTERNAL_ERROR
        }
    }

    /// Structured payload for fatal outcomes; `None` for normal ones.
    pub fn error_payload(&self) -> Option<ErrorPayload> {
        let (kind, message) = match self {
            CloseReason::Completed | CloseReason::PeerClosed => return None,
            CloseReason::PeerUnresponsive => ("timeout", "no keepalive response from peer".to_string()),
            CloseReason::Transport(m) => ("transport", m.clone()),
            CloseReason::Protocol(m) => ("protocol", m.clone()),
            CloseReason::Upstream(m) => ("upstream", m.clone()),
        };
        Some(ErrorPayload {
            kind: kind.to_string(),
            message,
        })
    }

    /// Close frame reason text: empty for normal outcomes, otherwise the
    /// JSON payload cut to fit [`MAX_CLOSE_REASON_LEN`].
    pub fn close_text(&self) -> String {
        self.error_payload()
            .map(|p| p.to_close_reason())
            .unwrap_or_default()
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Completed => f.write_str("completed"),
            CloseReason::PeerClosed => f.write_str("closed by peer"),
            CloseReason::PeerUnresponsive => f.write_str("peer unresponsive"),
            CloseReason::Transport(m) => write!(f, "transport error: {m}"),
            CloseReason::Protocol(m) => write!(f, "protocol error: {m}"),
            CloseReason::Upstream(m) => write!(f, "upstream error: {m}"),
        }
    }
}

/// JSON body of a fatal Close frame: `{"kind":"upstream","message":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
}

impl ErrorPayload {
    /// Serialises the payload, shortening `message` at a character boundary
    /// until the JSON fits in a Close frame.
    pub fn to_close_reason(&self) -> String {
        let mut payload = self.clone();
        loop {
            let json = serde_json::to_string(&payload).unwrap_or_default();
            if json.len() <= MAX_CLOSE_REASON_LEN || payload.message.is_empty() {
                return json;
            }
            let excess = json.len() - MAX_CLOSE_REASON_LEN;
            let mut cut = payload.message.len().saturating_sub(excess);
            while !payload.message.is_char_boundary(cut) {
                cut -= 1;
            }
            payload.message.truncate(cut);
        }
    }
}
