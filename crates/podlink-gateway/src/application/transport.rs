//! Classification of WebSocket transport errors.
//!
//! Both relay directions treat errors the same way: transient ones are
//! ignored and the operation is retried, fatal ones end the session quietly,
//! and anything unrecognised ends the session with a warning.

use std::io;

use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::Error as WsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry the read or write.
    Transient,
    /// The connection is gone: timeout, broken pipe, explicit close.
    Fatal,
    /// Not recognised; log it and tear the session down.
    Unclassified,
}

pub fn classify(err: &WsError) -> ErrorClass {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => ErrorClass::Fatal,
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => ErrorClass::Fatal,
        WsError::WriteBufferFull(_) => ErrorClass::Transient,
        WsError::Io(e) => classify_io(e.kind()),
        _ => ErrorClass::Unclassified,
    }
}

fn classify_io(kind: io::ErrorKind) -> ErrorClass {
    match kind {
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => ErrorClass::Transient,
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::TimedOut
        | io::ErrorKind::UnexpectedEof => ErrorClass::Fatal,
        _ => ErrorClass::Unclassified,
    }
}
