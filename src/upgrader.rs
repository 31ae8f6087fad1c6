//! The upgrader abstraction: what the engine needs from an already-upgraded
//! WebSocket connection, independent of which HTTP framework performed the
//! upgrade.
//!
//! Neither `juniper_warp::subscriptions` nor `juniper_axum::subscriptions`
//! names this abstraction explicitly, but both do the same thing with it:
//! split a concrete socket type into a `Sink` half and a `Stream` half
//! before handing them to the protocol layer (`ws_tx`/`ws_rx` in
//! `juniper_warp`, the equivalent in `juniper_axum`). [`Upgrader`] is that
//! split point, named.

use futures::sink::Sink;
use futures::stream::Stream;

/// One frame exchanged with the client, abstracted away from any specific
/// WebSocket crate's message type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A text frame carrying one encoded protocol message.
    Text(String),
    /// A close frame, carrying the code/reason if the peer sent one.
    Close(Option<(u16, String)>),
    /// Anything else the transport delivered that the protocol engine has
    /// no use for (e.g. a ping/pong at the WebSocket framing layer itself,
    /// as opposed to this crate's in-band `Ping`/`Pong` messages). Ignored
    /// by the reader task.
    Other,
}

/// What the Protocol Engine needs from an upgraded connection: a
/// `Sink`/`Stream` pair of [`Frame`]s sharing one error type.
///
/// Implemented for whatever a given HTTP integration crate's WebSocket type
/// already is after calling `.split()` on it (see `graphql_ws_axum` and
/// `graphql_ws_warp`), or directly for the split halves.
pub trait Upgrader:
    Stream<Item = Result<Frame, <Self as Upgrader>::Error>>
    + Sink<Frame, Error = <Self as Upgrader>::Error>
    + Send
    + 'static
{
    /// The transport's error type.
    type Error: std::error::Error + Send + Sync + 'static;
}

impl<T, E> Upgrader for T
where
    T: Stream<Item = Result<Frame, E>> + Sink<Frame, Error = E> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;
}
