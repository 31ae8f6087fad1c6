//! Messages for the legacy `graphql-ws` subprotocol.
//!
//! Grounded on `juniper_graphql_ws::graphql_ws::{client_message,
//! server_message}`, including the `"ka"` rename for the keepalive variant
//! and the bare in-band `connection_error` used for both init rejection and
//! (per this crate's corrected duplicate-id policy) a duplicate operation
//! id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use serde_json::Map;

use crate::data::ErrorObject;

/// Messages a client may send under `graphql-ws`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Requests the server initialise the connection.
    ConnectionInit {
        /// Arbitrary payload passed to the `on_connect` hook.
        #[serde(default)]
        payload: Option<Value>,
    },
    /// Starts an operation under the given id.
    ///
    /// `payload` is kept as a raw [`Value`] rather than decoded straight
    /// into an [`crate::data::OperationRequest`], per §4.1's deferred
    /// payload decoding: a malformed payload must not fail to decode the
    /// whole envelope, since `graphql-ws` handles that case in-band (an
    /// `error`/`complete` pair for the id) rather than by refusing the
    /// frame outright.
    Start {
        /// Client-chosen operation id, unique for the connection's lifetime.
        id: String,
        /// The operation, not yet resolved against
        /// [`crate::data::OperationRequest`]'s shape.
        #[serde(default)]
        payload: Value,
    },
    /// Requests cancellation of the operation with the given id.
    Stop {
        /// The id of the operation to cancel.
        id: String,
    },
    /// Requests the server terminate the connection.
    ConnectionTerminate,
}

/// Payload of a `connection_error` message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConnectionErrorPayload {
    /// Human-readable error message.
    pub message: String,
}

/// Payload of a `data` message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DataPayload {
    /// The result data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Field-level errors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorObject>,
    /// Extension data, including any `errors` merged in by extension hooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, serde_json::Value>>,
}

/// Messages the server may send under `graphql-ws`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once `connection_init` succeeds.
    ConnectionAck,
    /// Sent in place of `ConnectionAck` when `connection_init` (or, per this
    /// crate's policy, a duplicate `Start` id) is rejected. Always followed
    /// by the writer task closing the socket.
    ConnectionError {
        /// The rejection payload.
        payload: ConnectionErrorPayload,
    },
    /// Periodic keepalive, sent in-band rather than as a control frame.
    #[serde(rename = "ka")]
    ConnectionKeepAlive,
    /// One result for the operation named by `id`.
    Data {
        /// The id of the operation this result is for.
        id: String,
        /// The result.
        payload: DataPayload,
    },
    /// An operation-level error, sent before any `Data` for that id.
    ///
    /// Unlike `graphql-transport-ws`, `graphql-ws` carries a single
    /// [`ErrorObject`] here rather than a list.
    Error {
        /// The id of the operation that failed.
        id: String,
        /// The error.
        payload: ErrorObject,
    },
    /// No further `Data` will be sent for the operation named by `id`.
    Complete {
        /// The id of the operation that completed.
        id: String,
    },
}
