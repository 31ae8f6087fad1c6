//! The injected GraphQL executor abstraction.
//!
//! The engine never parses, validates, or executes GraphQL itself; it
//! delegates every operation to an [`Executor`] supplied by the embedder.
//! This plays the role `juniper_graphql_ws`'s `Schema` trait plays for that
//! crate (bridging the protocol layer to a concrete GraphQL engine), except
//! it is not tied to `juniper` or any other specific GraphQL implementation.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::data::{DataResult, OperationRequest};

/// The stream an [`Executor`] resolves an operation into.
///
/// For a query or mutation this stream yields exactly one [`DataResult`]
/// and then ends. For a subscription it yields one `DataResult` per event
/// for as long as the subscription is live, ending when the source
/// completes or the operation is cancelled. The engine treats both cases
/// identically: forward each item as a `next`/`data` frame, then send
/// `complete` once the stream ends.
pub type ResultStream = BoxStream<'static, DataResult>;

/// Resolves operations carried over a connection into result streams.
///
/// Implementors own query parsing, validation, and execution; the engine
/// only needs a value it can hand an [`OperationRequest`] to and a context
/// to execute it against.
pub trait Executor: Clone + Send + Sync + 'static {
    /// Per-connection context threaded through to every operation, as
    /// produced by the connection's `on_connect` hook.
    type Context: Send + Sync + 'static;

    /// Error produced when an operation cannot be resolved into a result
    /// stream at all (e.g. a parse or validation failure). This is an
    /// operation-level error: the engine surfaces it as a single `error`
    /// message for that operation's id, not folded into a `DataResult`.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Resolves `request` into a [`ResultStream`] against `context`.
    ///
    /// Whether `request` is a query, mutation, or subscription is this
    /// method's concern, not the engine's: the engine only distinguishes
    /// "one item then done" from "many items" by observing the stream
    /// itself.
    fn execute(
        &self,
        request: OperationRequest,
        context: Arc<Self::Context>,
    ) -> BoxFuture<'static, Result<ResultStream, Self::Error>>;
}
