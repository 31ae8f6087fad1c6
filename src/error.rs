//! Error types shared across the engine.

use thiserror::Error;

/// Failure decoding a client frame into a typed message.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame was not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The frame's `type` field did not match any known message tag for the
    /// negotiated subprotocol.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// A required field was absent from the frame.
    #[error("missing field: {field}")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },
}

/// A connection-level close, carrying the close code and reason text the
/// writer task must send before terminating.
#[derive(Debug, Clone, Error)]
#[error("{code}: {reason}")]
pub struct CloseError {
    /// WebSocket close code.
    pub code: u16,
    /// Human-readable close reason, echoed verbatim onto the wire.
    pub reason: String,
}

impl CloseError {
    /// Builds a new close error.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Top-level error surfaced by [`crate::engine::ProtocolEngine::run`].
#[derive(Debug, Error)]
pub enum EngineError<T> {
    /// The underlying transport (upgrader) failed.
    #[error("transport error: {0}")]
    Transport(T),

    /// The connection was closed per protocol, with the given code/reason.
    #[error(transparent)]
    Close(#[from] CloseError),

    /// An `on_connect`/`on_operation`/`on_disconnect` hook rejected the
    /// connection or operation. Per the error-handling policy, hook
    /// rejections are treated as protocol violations.
    #[error("hook rejected: {0}")]
    HookRejected(String),
}
