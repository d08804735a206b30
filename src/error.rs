//! Error types
//!
//! Layered errors: `SignalError` is the request-level taxonomy that travels
//! back to clients as an `{"error": "..."}` payload, while `Error` wraps it
//! together with registry, engine, transport and I/O failures for library
//! callers.

use thiserror::Error;

use crate::engine::EngineError;
use crate::registry::RegistryError;

/// Convenience result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Request-level errors returned to clients
///
/// The `Display` rendering of each variant is exactly the string placed in
/// the `error` field of the response payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// The media engine could not allocate a transport
    #[error("transport allocation failed: {0}")]
    TransportAllocationFailed(String),

    /// The media engine rejected the DTLS connect for a transport
    #[error("transport connect failed: {0}")]
    TransportConnectFailed(String),

    /// The request needs a producer or consumer transport the session
    /// does not currently hold in a usable state
    #[error("no active transport")]
    NoActiveTransport,

    /// No live session owns the requested stream id
    #[error("producer {0} not found")]
    ProducerNotFound(String),

    /// The consumability check rejected the producer/capability pairing
    #[error("incompatible capabilities for producer {0}")]
    IncompatibleCapabilities(String),

    /// No live session owns the requested consumer id
    #[error("consumer {0} not found")]
    ConsumerNotFound(String),

    /// A caller-supplied session id already maps to a live session
    #[error("duplicate identity: {0}")]
    DuplicateIdentity(String),

    /// The request payload was missing or malformed
    #[error("bad request: {0}")]
    BadRequest(String),
}

/// Top-level error type for the library
#[derive(Debug, Error)]
pub enum Error {
    /// Request-level failure, reported to the client as an error payload
    #[error("signaling error: {0}")]
    Signal(#[from] SignalError),

    /// Roster or stream index failure
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Media engine failure
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// WebSocket transport failure
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Frame could not be encoded or decoded
    #[error("frame error: {0}")]
    Frame(#[from] serde_json::Error),

    /// Malformed connect URL
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The media engine worker process died; the coordinator cannot continue
    #[error("media engine worker died")]
    WorkerDied,

    /// The WebSocket upgrade did not complete in time
    #[error("websocket handshake timed out")]
    HandshakeTimeout,

    /// The server refused the connection or a request with an error payload
    #[error("server error: {0}")]
    Server(String),

    /// A request was sent but no response arrived in time
    #[error("request timed out")]
    RequestTimeout,

    /// The signaling channel closed while an operation was in flight
    #[error("connection closed")]
    ConnectionClosed,
}

impl Error {
    /// String placed in the `error` field of a response payload.
    ///
    /// Taxonomy errors render as themselves; everything else is prefixed so
    /// clients can tell an internal failure from a protocol-level one.
    pub fn wire_message(&self) -> String {
        match self {
            Error::Signal(e) => e.to_string(),
            other => format!("internal: {}", other),
        }
    }
}

impl From<crate::registry::RegistryError> for SignalError {
    fn from(err: crate::registry::RegistryError) -> Self {
        match err {
            RegistryError::DuplicateIdentity(id) => SignalError::DuplicateIdentity(id),
            RegistryError::SessionNotFound(id) => {
                SignalError::BadRequest(format!("unknown session {}", id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_error_wire_strings() {
        assert_eq!(
            SignalError::ProducerNotFound("abc".into()).to_string(),
            "producer abc not found"
        );
        assert_eq!(SignalError::NoActiveTransport.to_string(), "no active transport");
        assert_eq!(
            SignalError::DuplicateIdentity("u-1".into()).to_string(),
            "duplicate identity: u-1"
        );
    }

    #[test]
    fn wire_message_prefixes_internal_errors() {
        let signal = Error::Signal(SignalError::NoActiveTransport);
        assert_eq!(signal.wire_message(), "no active transport");

        let internal = Error::WorkerDied;
        assert!(internal.wire_message().starts_with("internal: "));
    }
}
