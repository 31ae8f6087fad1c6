//! Subprotocol strategy objects.
//!
//! `juniper_graphql_ws` ships `graphql_ws` and `graphql_transport_ws` as two
//! structurally parallel modules; reading both side by side shows their
//! real differences are confined to a handful of points (message encoding,
//! how a keepalive is carried, and the exact close behavior for a few
//! protocol violations). This module condenses that parallelism into one
//! engine body plus a small strategy value selected at upgrade time, per
//! the corresponding design note this repository follows.

use std::sync::Arc;

use crate::codec::{self, DecodeError};
use crate::data::ErrorObject;
use crate::error::CloseError;
use crate::events::{ClientEvent, ServerEvent};
use crate::messages::{legacy, modern};

/// WebSocket subprotocol name, as negotiated via `Sec-WebSocket-Protocol`.
pub const LEGACY_SUBPROTOCOL: &str = "graphql-ws";

/// WebSocket subprotocol name, as negotiated via `Sec-WebSocket-Protocol`.
pub const MODERN_SUBPROTOCOL: &str = "graphql-transport-ws";

/// Behavior that differs between `graphql-ws` and `graphql-transport-ws`.
///
/// An implementation owns translating between the wire-specific message
/// types and the neutral [`ClientEvent`]/[`ServerEvent`] the engine loop
/// operates on, plus the points at which the two subprotocols' behavior
/// diverges (init timeout, too-many-init, duplicate id, malformed frame,
/// unauthorized pre-init operation, malformed operation payload, the
/// subscription-error terminal-frame asymmetry, whether a rejection is
/// announced in-band before closing, and whether a client-cancelled
/// operation gets an echoed `complete`).
pub trait SubprotocolStrategy: Send + Sync + 'static {
    /// The `Sec-WebSocket-Protocol` name this strategy negotiates.
    fn subprotocol_name(&self) -> &'static str;

    /// Decodes a raw text frame into a neutral client event.
    fn decode(&self, text: &str) -> Result<ClientEvent, DecodeError>;

    /// Encodes a neutral server event to its wire text form.
    fn encode(&self, event: &ServerEvent) -> String;

    /// The close this strategy uses when `connection_init` does not arrive
    /// within the configured connect timeout.
    fn init_timeout_close(&self) -> CloseError {
        CloseError::new(4408, "Connection initialisation timeout")
    }

    /// The close this strategy uses when a second `connection_init` arrives
    /// while one is already pending.
    fn too_many_init_close(&self) -> CloseError {
        CloseError::new(4429, "Too many initialisation requests")
    }

    /// The close this strategy uses when a `start`/`subscribe` reuses an
    /// id that is still live.
    ///
    /// Both subprotocols close on duplicate id: this repository follows
    /// the documented policy rather than the teacher's legacy behavior of
    /// silently dropping the duplicate `start` (see `DESIGN.md`).
    fn duplicate_id_close(&self, id: &str) -> CloseError {
        CloseError::new(4409, format!("Subscriber for {id} already exists"))
    }

    /// The close this strategy uses when a frame fails to decode at all.
    fn malformed_message_close(&self) -> CloseError {
        CloseError::new(4400, "Invalid message")
    }

    /// The close this strategy uses when an operation arrives before
    /// `connection_init` has succeeded.
    fn unauthorized_close(&self) -> CloseError {
        CloseError::new(4401, "Unauthorized")
    }

    /// Whether a `complete` frame follows the `error` frame emitted for a
    /// subscription-level failure (the executor producing no `DataResult`
    /// at all). LEGACY emits both; MODERN emits only `error` — one of the
    /// points where the two subprotocols' behavior diverges (spec §4.4.3
    /// step 5, §8 scenario asymmetry).
    fn emit_complete_after_subscription_error(&self) -> bool {
        true
    }

    /// Whether a `start`/`subscribe` whose payload doesn't decode into an
    /// [`crate::data::OperationRequest`] closes the whole connection.
    /// MODERN closes with `4400 "Invalid message"`; LEGACY instead emits an
    /// in-band `error` followed by `complete` for that id and keeps the
    /// connection open (§4.4.1's READY row for a malformed `start`).
    fn malformed_operation_closes_connection(&self) -> bool {
        true
    }

    /// Whether a `connection_init`/`on_operation` rejection is announced
    /// in-band via [`ServerEvent::ConnectionError`] before the close.
    /// LEGACY has a `connection_error` message for this; MODERN has none —
    /// the close code alone carries the rejection (§4.4.1/§4.4.2), so the
    /// engine must not emit the event at all for MODERN.
    fn emits_connection_error_event(&self) -> bool {
        true
    }

    /// Whether the engine sends a `complete` frame for an operation the
    /// client itself cancelled (`stop`/`complete`, or connection teardown).
    /// LEGACY echoes one back; MODERN sends nothing further once the client
    /// has already completed the operation from its own side (§8 scenario
    /// 3).
    fn emit_complete_after_client_cancel(&self) -> bool {
        true
    }
}

/// Picks a strategy from the comma-separated list of subprotocols a client
/// offered in `Sec-WebSocket-Protocol`, breaking a tie per `preferred` when
/// the client offered both (spec.md §6 `protocols`/`preferredProtocol`).
///
/// Falls back to [`LegacyStrategy`] when the header offers neither name,
/// matching how `WebSocketUpgrade::protocols`/`warp::ws()` already refuse
/// the upgrade for a header outside the advertised set before this ever
/// runs — this is only reached once the transport has already confirmed
/// the client offered one of the two.
pub fn negotiate_subprotocol(offered: &str, preferred: &str) -> Arc<dyn SubprotocolStrategy> {
    let mut offers = offered.split(',').map(str::trim);
    let offers_modern = offers.clone().any(|p| p == MODERN_SUBPROTOCOL);
    let offers_legacy = offers.any(|p| p == LEGACY_SUBPROTOCOL);

    let use_modern = match (offers_modern, offers_legacy) {
        (true, true) => preferred == MODERN_SUBPROTOCOL,
        (true, false) => true,
        (false, _) => false,
    };

    if use_modern {
        Arc::new(ModernStrategy)
    } else {
        Arc::new(LegacyStrategy)
    }
}

/// Strategy for the legacy `graphql-ws` subprotocol.
#[derive(Clone, Copy, Debug, Default)]
pub struct LegacyStrategy;

impl SubprotocolStrategy for LegacyStrategy {
    fn subprotocol_name(&self) -> &'static str {
        LEGACY_SUBPROTOCOL
    }

    fn decode(&self, text: &str) -> Result<ClientEvent, DecodeError> {
        let msg: legacy::ClientMessage = codec::decode(text)?;
        Ok(match msg {
            legacy::ClientMessage::ConnectionInit { payload } => {
                ClientEvent::ConnectionInit { payload }
            }
            legacy::ClientMessage::Start { id, payload } => ClientEvent::Start {
                id,
                request: serde_json::from_value(payload).map_err(|err| err.to_string()),
            },
            legacy::ClientMessage::Stop { id } => ClientEvent::Stop { id },
            legacy::ClientMessage::ConnectionTerminate => ClientEvent::Terminate,
        })
    }

    fn encode(&self, event: &ServerEvent) -> String {
        let msg = match event.clone() {
            ServerEvent::ConnectionAck => legacy::ServerMessage::ConnectionAck,
            ServerEvent::ConnectionError { message } => legacy::ServerMessage::ConnectionError {
                payload: legacy::ConnectionErrorPayload { message },
            },
            ServerEvent::KeepAlive => legacy::ServerMessage::ConnectionKeepAlive,
            // LEGACY has no ping/pong messages at all; this arm only exists
            // because `ServerEvent` is shared across both strategies.
            ServerEvent::Pong { .. } => legacy::ServerMessage::ConnectionKeepAlive,
            ServerEvent::Next { id, result } => legacy::ServerMessage::Data {
                id,
                payload: legacy::DataPayload {
                    data: result.data,
                    errors: result.errors,
                    extensions: result.extensions,
                },
            },
            ServerEvent::Error { id, errors } => legacy::ServerMessage::Error {
                id,
                // `graphql-ws` carries a single `ErrorObject`; when the
                // engine surfaces more than one (e.g. a hook rejection
                // with several entries), only the first is wire-visible.
                payload: errors.into_iter().next().unwrap_or_else(|| ErrorObject::message("")),
            },
            ServerEvent::Complete { id } => legacy::ServerMessage::Complete { id },
        };
        codec::encode(&msg)
    }

    fn malformed_operation_closes_connection(&self) -> bool {
        false
    }
}

/// Strategy for the modern `graphql-transport-ws` subprotocol.
#[derive(Clone, Copy, Debug, Default)]
pub struct ModernStrategy;

impl SubprotocolStrategy for ModernStrategy {
    fn subprotocol_name(&self) -> &'static str {
        MODERN_SUBPROTOCOL
    }

    fn decode(&self, text: &str) -> Result<ClientEvent, DecodeError> {
        let msg: modern::ClientMessage = codec::decode(text)?;
        Ok(match msg {
            modern::ClientMessage::ConnectionInit { payload } => {
                ClientEvent::ConnectionInit { payload }
            }
            modern::ClientMessage::Ping { payload } => ClientEvent::Ping { payload },
            modern::ClientMessage::Pong { .. } => ClientEvent::Pong,
            modern::ClientMessage::Subscribe { id, payload } => ClientEvent::Start {
                id,
                request: serde_json::from_value(payload).map_err(|err| err.to_string()),
            },
            modern::ClientMessage::Complete { id } => ClientEvent::Stop { id },
        })
    }

    fn encode(&self, event: &ServerEvent) -> String {
        let msg = match event.clone() {
            ServerEvent::ConnectionAck => modern::ServerMessage::ConnectionAck,
            ServerEvent::ConnectionError { message } => {
                // The engine never sends this event for MODERN (see
                // `emits_connection_error_event`); a rejection is
                // communicated purely through the close frame. This arm
                // only exists because `ServerEvent` is shared across both
                // strategies and `encode` must stay total.
                modern::ServerMessage::Error {
                    id: String::new(),
                    payload: vec![crate::data::ErrorObject::message(message)],
                }
            }
            ServerEvent::KeepAlive => modern::ServerMessage::Pong { payload: None },
            ServerEvent::Pong { payload } => modern::ServerMessage::Pong { payload },
            ServerEvent::Next { id, result } => modern::ServerMessage::Next {
                id,
                payload: modern::NextPayload {
                    data: result.data,
                    errors: result.errors,
                    extensions: result.extensions,
                },
            },
            ServerEvent::Error { id, errors } => modern::ServerMessage::Error { id, payload: errors },
            ServerEvent::Complete { id } => modern::ServerMessage::Complete { id },
        };
        codec::encode(&msg)
    }

    fn emit_complete_after_subscription_error(&self) -> bool {
        false
    }

    fn emits_connection_error_event(&self) -> bool {
        false
    }

    fn emit_complete_after_client_cancel(&self) -> bool {
        false
    }
}
