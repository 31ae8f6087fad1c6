//! Typed wire messages for both subprotocols.
//!
//! Each submodule mirrors one of `juniper_graphql_ws`'s two protocol
//! modules: the message tags, field casing, and serde attributes are taken
//! directly from `graphql_ws::{client_message, server_message}` and
//! `graphql_transport_ws::{client_message, server_message}`. What differs
//! differs is the payload type: these messages carry the crate's own
//! [`crate::data::OperationRequest`]/[`crate::data::ErrorObject`]
//! instead of a `juniper`-specific `Variables`/`GraphQLError`.

pub mod legacy;
pub mod modern;
