//! Messages for the modern `graphql-transport-ws` subprotocol.
//!
//! Grounded on `juniper_graphql_ws::graphql_transport_ws::{client_message,
//! server_message}`: `Ping`/`Pong` as control frames instead of an in-band
//! keepalive message, and `next`/`complete` in place of `data`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::data::ErrorObject;

/// Messages a client may send under `graphql-transport-ws`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Requests the server initialise the connection.
    ConnectionInit {
        /// Arbitrary payload passed to the `on_connect` hook.
        #[serde(default)]
        payload: Option<Value>,
    },
    /// A liveness check. The server responds with `Pong`.
    Ping {
        /// Arbitrary payload, echoed back unchanged.
        #[serde(default)]
        payload: Option<Value>,
    },
    /// The response to a server-sent `Ping`.
    Pong {
        /// Arbitrary payload.
        #[serde(default)]
        payload: Option<Value>,
    },
    /// Starts an operation under the given id.
    ///
    /// `payload` is kept as a raw [`Value`] rather than decoded straight
    /// into an [`crate::data::OperationRequest`], per §4.1's deferred
    /// payload decoding — see the equivalent note on
    /// [`crate::messages::legacy::ClientMessage::Start`].
    Subscribe {
        /// Client-chosen operation id, unique for the connection's lifetime.
        id: String,
        /// The operation, not yet resolved against
        /// [`crate::data::OperationRequest`]'s shape.
        #[serde(default)]
        payload: Value,
    },
    /// Requests cancellation of the operation with the given id.
    Complete {
        /// The id of the operation to cancel.
        id: String,
    },
}

/// Payload of a `next` message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NextPayload {
    /// The result data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Field-level errors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorObject>,
    /// Extension data, including any `errors` merged in by extension hooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

/// Messages the server may send under `graphql-transport-ws`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once `connection_init` succeeds.
    ConnectionAck,
    /// The response to a client's `Ping`, or the server's own liveness
    /// check when sent unsolicited as a keepalive. Echoes the `Ping`'s
    /// payload verbatim when responding to one; carries none when sent
    /// unsolicited.
    Pong {
        /// Payload echoed back from the `Ping` this responds to, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// One result for the operation named by `id`.
    Next {
        /// The id of the operation this result is for.
        id: String,
        /// The result.
        payload: NextPayload,
    },
    /// An operation-level error, sent before any `Next` for that id.
    Error {
        /// The id of the operation that failed.
        id: String,
        /// The error(s).
        payload: Vec<ErrorObject>,
    },
    /// No further `Next` will be sent for the operation named by `id`.
    Complete {
        /// The id of the operation that completed.
        id: String,
    },
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_subscribe_payload_as_raw_json() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"subscribe","id":"1","payload":{"query":"{ getFoo }"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                id: "1".into(),
                payload: json!({"query": "{ getFoo }"}),
            },
        );
    }

    #[test]
    fn decodes_ping_pong() {
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping { payload: None },
        );
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"pong","payload":{"a":1}}"#)
                .unwrap(),
            ClientMessage::Pong {
                payload: Some(json!({"a": 1})),
            },
        );
    }

    #[test]
    fn serializes_server_messages() {
        assert_eq!(
            serde_json::to_string(&ServerMessage::ConnectionAck).unwrap(),
            r#"{"type":"connection_ack"}"#,
        );
        assert_eq!(
            serde_json::to_string(&ServerMessage::Pong { payload: None }).unwrap(),
            r#"{"type":"pong"}"#,
        );
        assert_eq!(
            serde_json::to_string(&ServerMessage::Pong {
                payload: Some(json!({"k": "v"})),
            })
            .unwrap(),
            r#"{"type":"pong","payload":{"k":"v"}}"#,
        );
        assert_eq!(
            serde_json::to_string(&ServerMessage::Next {
                id: "foo".into(),
                payload: NextPayload {
                    data: Some(Value::Null),
                    errors: Vec::new(),
                    extensions: None,
                },
            })
            .unwrap(),
            r#"{"type":"next","id":"foo","payload":{"data":null}}"#,
        );
        assert_eq!(
            serde_json::to_string(&ServerMessage::Complete { id: "foo".into() }).unwrap(),
            r#"{"type":"complete","id":"foo"}"#,
        );
    }
}
