//! `axum` integration for `graphql_ws_protocol`.
//!
//! Grounded on `juniper_axum::subscriptions::handle_graphql_socket`: the
//! same socket split, the same `Message`/protocol-message conversion, and
//! the same `.protocols([...]).on_upgrade(...)` router wiring shown in its
//! doc example, adapted to hand the split halves to
//! [`graphql_ws_protocol::ProtocolEngine`] instead of a `juniper`-specific
//! `Connection`.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use derive_more::{Display, Error};
use futures::sink::Sink;
use futures::stream::Stream;
use graphql_ws_protocol::{
    ConnectionInit, Executor, Frame, ProtocolConfig, ProtocolEngine, SubprotocolStrategy,
    LEGACY_SUBPROTOCOL, MODERN_SUBPROTOCOL,
};

/// Error adapting an axum [`WebSocket`] to the [`graphql_ws_protocol::Upgrader`]
/// contract.
#[derive(Debug, Display, Error)]
pub enum TransportError {
    /// The underlying axum websocket failed.
    #[display("axum websocket error: {_0}")]
    Axum(axum::Error),
}

/// Adapts an axum [`WebSocket`] to the engine's `Sink`/`Stream` contract.
pub struct AxumSocket(WebSocket);

impl AxumSocket {
    /// Wraps an already-upgraded axum websocket.
    pub fn new(socket: WebSocket) -> Self {
        Self(socket)
    }
}

impl Stream for AxumSocket {
    type Item = Result<Frame, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.0).poll_next(cx).map(|opt| {
            opt.map(|result| {
                result.map_err(TransportError::Axum).map(|msg| match msg {
                    Message::Text(text) => Frame::Text(text.to_string()),
                    Message::Close(frame) => {
                        Frame::Close(frame.map(|f| (f.code, f.reason.to_string())))
                    }
                    Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => Frame::Other,
                })
            })
        })
    }
}

impl Sink<Frame> for AxumSocket {
    type Error = TransportError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.0)
            .poll_ready(cx)
            .map_err(TransportError::Axum)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        let message = match item {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Close(close) => Message::Close(close.map(|(code, reason)| CloseFrame {
                code,
                reason: reason.into(),
            })),
            Frame::Other => return Ok(()),
        };
        Pin::new(&mut self.0)
            .start_send(message)
            .map_err(TransportError::Axum)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.0)
            .poll_flush(cx)
            .map_err(TransportError::Axum)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.0)
            .poll_close(cx)
            .map_err(TransportError::Axum)
    }
}

/// Picks the subprotocol strategy for the client's `Sec-WebSocket-Protocol`
/// offer, which may list one or both names comma-separated. Ties (the
/// client offers both) go to `preferred`, matching spec.md's
/// `preferredProtocol` option; `requested: None` (no header at all) falls
/// back to the legacy protocol.
pub fn negotiate_strategy(
    requested: Option<&str>,
    preferred: &str,
) -> Arc<dyn SubprotocolStrategy> {
    match requested {
        Some(offered) => graphql_ws_protocol::negotiate_subprotocol(offered, preferred),
        None => Arc::new(graphql_ws_protocol::LegacyStrategy),
    }
}

/// Completes an axum websocket upgrade and runs the protocol engine against
/// it for as long as the connection lives.
///
/// # Example
///
/// ```ignore
/// use axum::{extract::WebSocketUpgrade, response::Response, routing::get, Router};
/// use graphql_ws_axum::graphql_ws_handler;
///
/// async fn subscriptions(ws: WebSocketUpgrade) -> Response {
///     graphql_ws_handler(
///         ws,
///         None,
///         my_executor.clone(),
///         graphql_ws_protocol::ProtocolConfig::new(),
///         graphql_ws_protocol::StaticContext(()),
///     )
/// }
///
/// let app: Router = Router::new().route("/subscriptions", get(subscriptions));
/// ```
pub fn graphql_ws_handler<Exec, I>(
    ws: WebSocketUpgrade,
    requested_protocol: Option<&str>,
    executor: Exec,
    config: ProtocolConfig<Exec::Context>,
    init: I,
) -> Response
where
    Exec: Executor,
    I: ConnectionInit<Exec::Context> + Send + 'static,
{
    let strategy = negotiate_strategy(requested_protocol, MODERN_SUBPROTOCOL);
    tracing::debug!(protocol = strategy.subprotocol_name(), "upgrading websocket");

    ws.protocols([LEGACY_SUBPROTOCOL, MODERN_SUBPROTOCOL])
        .on_upgrade(move |socket| async move {
            let engine = ProtocolEngine::new(executor, config);
            let transport = AxumSocket::new(socket);
            if let Err(err) = engine.run(transport, strategy, init).await {
                tracing::warn!(%err, "graphql websocket connection ended with error");
            }
        })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn negotiates_modern_only_when_explicitly_requested() {
        assert_eq!(
            negotiate_strategy(Some(MODERN_SUBPROTOCOL), MODERN_SUBPROTOCOL).subprotocol_name(),
            MODERN_SUBPROTOCOL,
        );
        assert_eq!(
            negotiate_strategy(Some(LEGACY_SUBPROTOCOL), MODERN_SUBPROTOCOL).subprotocol_name(),
            LEGACY_SUBPROTOCOL,
        );
        assert_eq!(
            negotiate_strategy(None, MODERN_SUBPROTOCOL).subprotocol_name(),
            LEGACY_SUBPROTOCOL,
        );
    }

    #[test]
    fn negotiates_toward_preferred_when_client_offers_both() {
        let both = "graphql-ws, graphql-transport-ws";
        assert_eq!(
            negotiate_strategy(Some(both), MODERN_SUBPROTOCOL).subprotocol_name(),
            MODERN_SUBPROTOCOL,
        );
        assert_eq!(
            negotiate_strategy(Some(both), LEGACY_SUBPROTOCOL).subprotocol_name(),
            LEGACY_SUBPROTOCOL,
        );
    }
}
