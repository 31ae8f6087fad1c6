//! Frame Codec: decoding a raw text frame into a typed client message and
//! encoding a typed server message back into a text frame, for a specific
//! subprotocol's wire types.
//!
//! Unlike `juniper_graphql_ws`, which relies on `serde`'s internally-tagged
//! enum support to decode a whole message in one call, this module keeps a
//! thin `Envelope` peek so the engine can log the `id`/`type` of a frame
//! that otherwise failed to decode, without needing it to match any known
//! variant.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

/// An untyped peek at a frame's `id` and `type` fields, used only for
/// diagnostics when full decoding fails.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    /// The operation id, if the frame carries one.
    #[serde(default)]
    pub id: Option<String>,
    /// The message tag.
    #[serde(rename = "type", default)]
    pub r#type: String,
    /// The raw payload, not yet resolved against any particular message
    /// variant's shape.
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Decodes `text` as a message of type `M`.
///
/// `M` is one of [`crate::messages::legacy::ClientMessage`] or
/// [`crate::messages::modern::ClientMessage`], selected by whichever
/// subprotocol strategy owns the connection. A failure is classified per
/// §4.1 into malformed JSON, a missing `type` tag, or a `type` tag outside
/// the negotiated subprotocol's known set, by re-parsing the frame as a
/// bare [`Value`] once the typed decode has already failed.
pub fn decode<M: DeserializeOwned>(text: &str) -> Result<M, DecodeError> {
    match serde_json::from_str(text) {
        Ok(message) => Ok(message),
        Err(err) => Err(classify(text, err)),
    }
}

fn classify(text: &str, err: serde_json::Error) -> DecodeError {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return DecodeError::InvalidJson(err);
    };
    match value.get("type") {
        None => DecodeError::MissingField { field: "type" },
        Some(Value::String(tag)) if err.to_string().contains("unknown variant") => {
            DecodeError::UnknownMessageType(tag.clone())
        }
        _ => DecodeError::InvalidJson(err),
    }
}

/// Encodes `message` to its wire text form.
///
/// Encoding a well-formed typed message is not expected to fail; a failure
/// here indicates a bug in the message types themselves, so this panics
/// rather than threading an error the caller has no sensible recovery for,
/// matching how `juniper_graphql_ws`'s own `Serialize` impls are treated as
/// infallible by its callers.
pub fn encode<M: Serialize>(message: &M) -> String {
    serde_json::to_string(message).expect("server message must always serialize")
}

/// Peeks at `text`'s `id`/`type` fields without committing to a full typed
/// decode, for use in diagnostics when [`decode`] has already failed.
pub fn peek(text: &str) -> Option<Envelope> {
    serde_json::from_str(text).ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::messages::modern;

    #[test]
    fn classifies_malformed_json_as_invalid() {
        let err = decode::<modern::ClientMessage>("not json").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidJson(_)));
    }

    #[test]
    fn classifies_missing_type_tag() {
        let err = decode::<modern::ClientMessage>(r#"{"id":"1"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { field: "type" }));
    }

    #[test]
    fn classifies_unknown_type_tag() {
        let err = decode::<modern::ClientMessage>(r#"{"type":"bogus"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownMessageType(tag) if tag == "bogus"));
    }

    #[test]
    fn peek_recovers_id_and_type_after_a_failed_decode() {
        let envelope = peek(r#"{"id":"7","type":"bogus","payload":null}"#).unwrap();
        assert_eq!(envelope.id.as_deref(), Some("7"));
        assert_eq!(envelope.r#type, "bogus");
    }
}
