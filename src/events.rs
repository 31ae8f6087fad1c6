//! Subprotocol-neutral events, the interface between the wire message
//! types in [`crate::messages`] and the [`crate::engine`] state machine.
//!
//! The engine loop only ever sees [`ClientEvent`]/[`ServerEvent`]; it's the
//! [`crate::strategy::SubprotocolStrategy`] that translates to and from the
//! wire-specific enums for whichever subprotocol was negotiated.

use serde_json::Value;

use crate::data::{DataResult, ErrorObject, OperationRequest};

/// A decoded client frame, independent of which subprotocol carried it.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// Requests connection initialisation.
    ConnectionInit {
        /// The payload passed to the `on_connect` hook.
        payload: Option<Value>,
    },
    /// Starts an operation.
    ///
    /// `request` is lazily decoded from the envelope's raw payload (per
    /// §4.1's deferred-decoding design): it is only `Err` when the payload
    /// doesn't match [`OperationRequest`]'s shape, which the two
    /// subprotocols handle differently (see
    /// [`crate::strategy::SubprotocolStrategy::malformed_operation_closes_connection`]).
    Start {
        /// The operation's id.
        id: String,
        /// The operation, or the reason its payload failed to decode.
        request: Result<OperationRequest, String>,
    },
    /// Cancels an operation.
    Stop {
        /// The id of the operation to cancel.
        id: String,
    },
    /// Requests the connection terminate.
    Terminate,
    /// A client-initiated liveness check (`graphql-transport-ws` only).
    Ping {
        /// Arbitrary payload, echoed back in the `Pong`.
        payload: Option<Value>,
    },
    /// The response to a server-sent `Ping` (`graphql-transport-ws` only).
    Pong,
}

/// An event to be encoded onto the wire, independent of which subprotocol
/// was negotiated.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    /// Connection initialisation succeeded.
    ConnectionAck,
    /// An in-band rejection of `connection_init`, or (per this crate's
    /// corrected policy) of a duplicate operation id. Always immediately
    /// followed by the connection closing.
    ConnectionError {
        /// Human-readable rejection reason.
        message: String,
    },
    /// A keepalive. Encoded in-band for `graphql-ws`, as a control-frame
    /// `Pong` for `graphql-transport-ws`.
    KeepAlive,
    /// The response to a client `Ping` (`graphql-transport-ws` only),
    /// echoing the ping's payload verbatim.
    Pong {
        /// The payload carried by the `Ping` this responds to.
        payload: Option<Value>,
    },
    /// One result for the operation named by `id`.
    Next {
        /// The id of the operation this result is for.
        id: String,
        /// The result.
        result: DataResult,
    },
    /// An operation-level error for the operation named by `id`.
    Error {
        /// The id of the operation that failed.
        id: String,
        /// The error(s).
        errors: Vec<ErrorObject>,
    },
    /// No further results will be sent for the operation named by `id`.
    Complete {
        /// The id of the operation that completed.
        id: String,
    },
}
