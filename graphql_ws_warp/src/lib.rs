//! `warp` integration for `graphql_ws_protocol`.
//!
//! Grounded on `juniper_warp::subscriptions::make_ws_filter`: the same
//! `Sec-Websocket-Protocol`-header-driven negotiation and
//! `warp::reply::with_header` response wiring, adapted to hand the socket
//! to [`graphql_ws_protocol::ProtocolEngine`] instead of a
//! `juniper`-specific `Connection`.

use std::pin::Pin;
use std::task::{Context, Poll};

use derive_more::{Display, Error as DeriveError};
use futures::sink::Sink;
use futures::stream::Stream;
use graphql_ws_protocol::{ConnectionInit, Executor, Frame, ProtocolConfig, ProtocolEngine};
use warp::filters::BoxedFilter;
use warp::reply::Reply;
use warp::Filter as _;

/// Errors that can happen while serving a connection.
#[derive(Debug, Display, DeriveError)]
pub enum Error {
    /// Errors from `warp` itself.
    #[display("`warp` error: {_0}")]
    Warp(warp::Error),
}

impl From<warp::Error> for Error {
    fn from(err: warp::Error) -> Self {
        Self::Warp(err)
    }
}

/// Adapts a `warp` websocket to the engine's `Sink`/`Stream` contract.
pub struct WarpSocket(warp::ws::WebSocket);

impl WarpSocket {
    /// Wraps an already-upgraded warp websocket.
    pub fn new(socket: warp::ws::WebSocket) -> Self {
        Self(socket)
    }
}

impl Stream for WarpSocket {
    type Item = Result<Frame, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.0).poll_next(cx).map(|opt| {
            opt.map(|result| {
                result.map_err(Error::from).map(|msg| {
                    if msg.is_close() {
                        Frame::Close(msg.close_frame().map(|(code, reason)| (code, reason.to_owned())))
                    } else if msg.is_text() {
                        Frame::Text(msg.to_str().unwrap_or_default().to_owned())
                    } else {
                        Frame::Other
                    }
                })
            })
        })
    }
}

impl Sink<Frame> for WarpSocket {
    type Error = Error;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.0).poll_ready(cx).map_err(Error::from)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        let message = match item {
            Frame::Text(text) => warp::ws::Message::text(text),
            Frame::Close(close) => match close {
                Some((code, reason)) => warp::ws::Message::close_with(code, reason),
                None => warp::ws::Message::close(),
            },
            Frame::Other => return Ok(()),
        };
        Pin::new(&mut self.0)
            .start_send(message)
            .map_err(Error::from)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.0).poll_flush(cx).map_err(Error::from)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.0).poll_close(cx).map_err(Error::from)
    }
}

/// Makes a filter for GraphQL subscriptions.
///
/// Negotiates between `graphql-ws` and `graphql-transport-ws` from the
/// `Sec-Websocket-Protocol` header, which may list one or both names
/// comma-separated; `preferred` breaks the tie when the client offers both,
/// per spec.md's `preferredProtocol` option. Mirrors
/// `juniper_warp::subscriptions::make_ws_filter`'s header-driven
/// negotiation and `warp::reply::with_header` response wiring.
pub fn make_ws_filter<Exec, I>(
    executor: Exec,
    config: ProtocolConfig<Exec::Context>,
    init: I,
    preferred: &'static str,
) -> BoxedFilter<(impl Reply,)>
where
    Exec: Executor + Clone,
    I: ConnectionInit<Exec::Context> + Clone + Send + Sync,
{
    warp::ws()
        .and(warp::filters::header::value("sec-websocket-protocol"))
        .map(move |ws: warp::ws::Ws, subproto: warp::http::HeaderValue| {
            let executor = executor.clone();
            let config_value = config.clone();
            let init = init.clone();

            let offered = subproto.to_str().unwrap_or_default();
            let strategy = graphql_ws_protocol::negotiate_subprotocol(offered, preferred);
            let negotiated = strategy.subprotocol_name();

            warp::reply::with_header(
                ws.on_upgrade(move |socket| async move {
                    let engine = ProtocolEngine::new(executor, config_value);
                    let transport = WarpSocket::new(socket);
                    if let Err(err) = engine.run(transport, strategy, init).await {
                        log::error!("GraphQL over WebSocket Protocol error: {err}");
                    }
                }),
                "sec-websocket-protocol",
                negotiated,
            )
        })
        .boxed()
}
