//! A transport-agnostic engine for the two WebSocket subprotocols used to
//! carry GraphQL operations: the legacy `graphql-ws`
//! (née `subscriptions-transport-ws`) and the modern
//! `graphql-transport-ws`.
//!
//! This crate owns the protocol state machine — connection initialisation,
//! operation multiplexing, cancellation, keepalives, and close-code policy
//! — and nothing else. It does not parse, validate, or execute GraphQL
//! (that's the job of an injected [`Executor`]), and it does not perform
//! the HTTP upgrade itself (that's the job of an injected [`Upgrader`],
//! typically built by a framework-specific sibling crate such as
//! `graphql_ws_axum` or `graphql_ws_warp`).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use graphql_ws_protocol::{ProtocolConfig, ProtocolEngine, StaticContext};
//! use graphql_ws_protocol::strategy::ModernStrategy;
//!
//! let engine = ProtocolEngine::new(my_executor, ProtocolConfig::new());
//! engine
//!     .run(upgrader, Arc::new(ModernStrategy), StaticContext(my_context))
//!     .await?;
//! ```

pub mod codec;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod messages;
pub mod registry;
pub mod strategy;
pub mod upgrader;

pub use config::{ConnectionInit, ExtensionHook, OperationDecision, ProtocolConfig, StaticContext};
pub use data::{DataResult, ErrorObject, OperationRequest, SourceLocation};
pub use engine::ProtocolEngine;
pub use error::{CloseError, DecodeError, EngineError};
pub use events::{ClientEvent, ServerEvent};
pub use executor::{Executor, ResultStream};
pub use registry::OperationRegistry;
pub use strategy::{
    negotiate_subprotocol, LegacyStrategy, ModernStrategy, SubprotocolStrategy,
    LEGACY_SUBPROTOCOL, MODERN_SUBPROTOCOL,
};
pub use upgrader::{Frame, Upgrader};

#[cfg(test)]
mod tests {
    //! End-to-end scenarios over an in-process fake [`Executor`],
    //! reproducing the canonical example schema from the reference
    //! server this crate's behavior was checked against: `getFoo`
    //! (a constant), `getError` (always fails), `setFoo` (a mutation
    //! broadcasting a new value), and `fooUpdates` (a subscription
    //! streaming those broadcasts).

    use std::pin::Pin;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;
    use std::task::{Context as TaskContext, Poll};

    use futures::future::BoxFuture;
    use futures::sink::Sink;
    use futures::stream::{self, BoxStream, Stream};
    use serde_json::json;
    use tokio::sync::broadcast;

    use crate::data::{DataResult, ErrorObject, OperationRequest};
    use crate::executor::{Executor, ResultStream};
    use crate::upgrader::Frame;

    /// The fixture schema: `getFoo`, `getError`, `setFoo(value: Int)`,
    /// `fooUpdates`.
    #[derive(Clone)]
    struct FooExecutor {
        foo: Arc<AtomicI64>,
        updates: broadcast::Sender<i64>,
    }

    impl FooExecutor {
        fn new() -> Self {
            let (updates, _) = broadcast::channel(16);
            Self {
                foo: Arc::new(AtomicI64::new(123)),
                updates,
            }
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("no such operation")]
    struct FooExecutorError;

    impl Executor for FooExecutor {
        type Context = ();
        type Error = FooExecutorError;

        fn execute(
            &self,
            request: OperationRequest,
            _context: Arc<Self::Context>,
        ) -> BoxFuture<'static, Result<ResultStream, Self::Error>> {
            let this = self.clone();
            Box::pin(async move {
                let query = request.query.trim();
                let result: ResultStream = if query.contains("getFoo") {
                    let value = this.foo.load(Ordering::SeqCst);
                    Box::pin(stream::once(async move {
                        DataResult::ok(json!({ "getFoo": value }))
                    }))
                } else if query.contains("getError") {
                    Box::pin(stream::once(async move {
                        DataResult::errors(vec![ErrorObject::message("boom")])
                    }))
                } else if query.contains("setFoo") {
                    let value = request
                        .variables
                        .get("value")
                        .and_then(|v| v.as_i64())
                        .unwrap_or_default();
                    this.foo.store(value, Ordering::SeqCst);
                    let _ = this.updates.send(value);
                    Box::pin(stream::once(async move {
                        DataResult::ok(json!({ "setFoo": value }))
                    }))
                } else if query.contains("fooUpdates") {
                    let mut rx = this.updates.subscribe();
                    Box::pin(stream::unfold(rx, |mut rx| async move {
                        match rx.recv().await {
                            Ok(value) => {
                                Some((DataResult::ok(json!({ "fooUpdates": value })), rx))
                            }
                            Err(_) => None,
                        }
                    }))
                } else {
                    return Err(FooExecutorError);
                };
                Ok(result)
            })
        }
    }

    /// An in-memory [`Upgrader`](crate::upgrader::Upgrader) pairing a
    /// client-facing and server-facing channel, so tests can drive the
    /// engine without any real socket.
    struct ChannelTransport {
        inbound: tokio::sync::mpsc::UnboundedReceiver<Frame>,
        outbound: tokio::sync::mpsc::UnboundedSender<Frame>,
    }

    impl Stream for ChannelTransport {
        type Item = Result<Frame, std::convert::Infallible>;

        fn poll_next(
            mut self: Pin<&mut Self>,
            cx: &mut TaskContext<'_>,
        ) -> Poll<Option<Self::Item>> {
            self.inbound.poll_recv(cx).map(|opt| opt.map(Ok))
        }
    }

    impl Sink<Frame> for ChannelTransport {
        type Error = std::convert::Infallible;

        fn poll_ready(
            self: Pin<&mut Self>,
            _cx: &mut TaskContext<'_>,
        ) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
            let _ = self.outbound.send(item);
            Ok(())
        }

        fn poll_flush(
            self: Pin<&mut Self>,
            _cx: &mut TaskContext<'_>,
        ) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(
            self: Pin<&mut Self>,
            _cx: &mut TaskContext<'_>,
        ) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    fn channel_pair() -> (
        ChannelTransport,
        tokio::sync::mpsc::UnboundedSender<Frame>,
        tokio::sync::mpsc::UnboundedReceiver<Frame>,
    ) {
        let (client_tx, server_rx) = tokio::sync::mpsc::unbounded_channel();
        let (server_tx, client_rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = ChannelTransport {
            inbound: server_rx,
            outbound: server_tx,
        };
        let _ = client_rx;
        (transport, client_tx, client_rx)
    }

    async fn next_text(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Frame>) -> String {
        match rx.recv().await.expect("connection closed unexpectedly") {
            Frame::Text(text) => text,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn legacy_basic_query_roundtrip() {
        use crate::config::StaticContext;
        use crate::engine::ProtocolEngine;
        use crate::strategy::LegacyStrategy;

        let (transport, client_tx, mut client_rx) = channel_pair();
        let engine = ProtocolEngine::new(FooExecutor::new(), crate::config::ProtocolConfig::new());

        let run = tokio::spawn(async move {
            let _ = engine
                .run(transport, Arc::new(LegacyStrategy), StaticContext(()))
                .await;
        });

        client_tx
            .send(Frame::Text(r#"{"type":"connection_init"}"#.into()))
            .unwrap();
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"connection_ack"}"#);

        client_tx
            .send(Frame::Text(
                r#"{"type":"start","id":"1","payload":{"query":"{ getFoo }"}}"#.into(),
            ))
            .unwrap();
        assert_eq!(
            next_text(&mut client_rx).await,
            r#"{"type":"data","id":"1","payload":{"data":{"getFoo":123}}}"#,
        );
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"complete","id":"1"}"#);

        client_tx
            .send(Frame::Text(r#"{"type":"connection_terminate"}"#.into()))
            .unwrap();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn modern_mutation_then_subscription_sees_broadcast() {
        use crate::config::StaticContext;
        use crate::engine::ProtocolEngine;
        use crate::strategy::ModernStrategy;

        let (transport, client_tx, mut client_rx) = channel_pair();
        let engine = ProtocolEngine::new(FooExecutor::new(), crate::config::ProtocolConfig::new());

        let run = tokio::spawn(async move {
            let _ = engine
                .run(transport, Arc::new(ModernStrategy), StaticContext(()))
                .await;
        });

        client_tx
            .send(Frame::Text(r#"{"type":"connection_init"}"#.into()))
            .unwrap();
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"connection_ack"}"#);

        client_tx
            .send(Frame::Text(
                r#"{"type":"subscribe","id":"sub","payload":{"query":"{ fooUpdates }"}}"#.into(),
            ))
            .unwrap();

        client_tx
            .send(Frame::Text(
                r#"{"type":"subscribe","id":"mut","payload":{"query":"mutation { setFoo }","variables":{"value":7}}}"#
                    .into(),
            ))
            .unwrap();
        assert_eq!(
            next_text(&mut client_rx).await,
            r#"{"type":"next","id":"mut","payload":{"data":{"setFoo":7}}}"#,
        );
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"complete","id":"mut"}"#);
        assert_eq!(
            next_text(&mut client_rx).await,
            r#"{"type":"next","id":"sub","payload":{"data":{"fooUpdates":7}}}"#,
        );

        client_tx
            .send(Frame::Text(r#"{"type":"complete","id":"sub"}"#.into()))
            .unwrap();

        client_tx.send(Frame::Close(None)).unwrap();
        run.await.unwrap();

        assert!(
            client_rx.recv().await.is_none(),
            "MODERN must not echo `complete` after the client already cancelled",
        );
    }

    #[tokio::test]
    async fn duplicate_operation_id_closes_connection() {
        use crate::config::StaticContext;
        use crate::engine::ProtocolEngine;
        use crate::strategy::ModernStrategy;

        let (transport, client_tx, mut client_rx) = channel_pair();
        let engine = ProtocolEngine::new(FooExecutor::new(), crate::config::ProtocolConfig::new());

        let run = tokio::spawn(async move {
            let _ = engine
                .run(transport, Arc::new(ModernStrategy), StaticContext(()))
                .await;
        });

        client_tx
            .send(Frame::Text(r#"{"type":"connection_init"}"#.into()))
            .unwrap();
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"connection_ack"}"#);

        client_tx
            .send(Frame::Text(
                r#"{"type":"subscribe","id":"1","payload":{"query":"{ fooUpdates }"}}"#.into(),
            ))
            .unwrap();
        client_tx
            .send(Frame::Text(
                r#"{"type":"subscribe","id":"1","payload":{"query":"{ fooUpdates }"}}"#.into(),
            ))
            .unwrap();

        match client_rx.recv().await.unwrap() {
            Frame::Close(Some((code, reason))) => {
                assert_eq!(code, 4409);
                assert_eq!(reason, "Subscriber for 1 already exists");
            }
            other => panic!("expected a close frame, got {other:?}"),
        }

        run.await.unwrap();
    }

    #[tokio::test]
    async fn start_before_init_is_unauthorized() {
        use crate::config::StaticContext;
        use crate::engine::ProtocolEngine;
        use crate::strategy::ModernStrategy;

        let (transport, client_tx, mut client_rx) = channel_pair();
        let engine = ProtocolEngine::new(FooExecutor::new(), crate::config::ProtocolConfig::new());

        let run = tokio::spawn(async move {
            let _ = engine
                .run(transport, Arc::new(ModernStrategy), StaticContext(()))
                .await;
        });

        client_tx
            .send(Frame::Text(
                r#"{"type":"subscribe","id":"1","payload":{"query":"{ getFoo }"}}"#.into(),
            ))
            .unwrap();

        match client_rx.recv().await.unwrap() {
            Frame::Close(Some((code, reason))) => {
                assert_eq!(code, 4401);
                assert_eq!(reason, "Unauthorized");
            }
            other => panic!("expected a close frame, got {other:?}"),
        }

        run.await.unwrap();
    }

    #[tokio::test]
    async fn connect_timeout_closes_with_4408() {
        use crate::config::{ProtocolConfig, StaticContext};
        use crate::engine::ProtocolEngine;
        use crate::strategy::ModernStrategy;
        use std::time::Duration;

        let (transport, _client_tx, mut client_rx) = channel_pair();
        let config = ProtocolConfig::new().with_connect_timeout(Some(Duration::from_millis(20)));
        let engine = ProtocolEngine::new(FooExecutor::new(), config);

        let run = tokio::spawn(async move {
            let _ = engine
                .run(transport, Arc::new(ModernStrategy), StaticContext(()))
                .await;
        });

        match client_rx.recv().await.unwrap() {
            Frame::Close(Some((code, reason))) => {
                assert_eq!(code, 4408);
                assert_eq!(reason, "Connection initialisation timeout");
            }
            other => panic!("expected a close frame, got {other:?}"),
        }

        run.await.unwrap();
    }

    #[tokio::test]
    async fn no_connect_timeout_by_default() {
        use crate::config::{ProtocolConfig, StaticContext};
        use crate::engine::ProtocolEngine;
        use crate::strategy::ModernStrategy;
        use std::time::Duration;

        let (transport, client_tx, mut client_rx) = channel_pair();
        let config = ProtocolConfig::new();
        assert_eq!(config.connect_timeout, None);
        let engine = ProtocolEngine::new(FooExecutor::new(), config);

        let run = tokio::spawn(async move {
            let _ = engine
                .run(transport, Arc::new(ModernStrategy), StaticContext(()))
                .await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        client_tx
            .send(Frame::Text(r#"{"type":"connection_init"}"#.into()))
            .unwrap();
        match client_rx.recv().await.unwrap() {
            Frame::Text(text) => assert_eq!(text, r#"{"type":"connection_ack"}"#),
            other => panic!("expected connection_ack, got {other:?}"),
        }

        client_tx
            .send(Frame::Text(r#"{"type":"complete","id":"absent"}"#.into()))
            .unwrap();
        drop(client_tx);
        run.await.unwrap();
    }

    #[tokio::test]
    async fn field_level_error_does_not_abort_operation() {
        use crate::config::StaticContext;
        use crate::engine::ProtocolEngine;
        use crate::strategy::ModernStrategy;

        let (transport, client_tx, mut client_rx) = channel_pair();
        let engine = ProtocolEngine::new(FooExecutor::new(), crate::config::ProtocolConfig::new());

        let run = tokio::spawn(async move {
            let _ = engine
                .run(transport, Arc::new(ModernStrategy), StaticContext(()))
                .await;
        });

        client_tx
            .send(Frame::Text(r#"{"type":"connection_init"}"#.into()))
            .unwrap();
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"connection_ack"}"#);

        client_tx
            .send(Frame::Text(
                r#"{"type":"subscribe","id":"1","payload":{"query":"{ getError }"}}"#.into(),
            ))
            .unwrap();
        assert_eq!(
            next_text(&mut client_rx).await,
            r#"{"type":"next","id":"1","payload":{"data":null,"errors":[{"message":"boom"}]}}"#,
        );
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"complete","id":"1"}"#);

        client_tx.send(Frame::Close(None)).unwrap();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn modern_subscription_level_failure_emits_no_complete() {
        use crate::config::StaticContext;
        use crate::engine::ProtocolEngine;
        use crate::strategy::ModernStrategy;

        let (transport, client_tx, mut client_rx) = channel_pair();
        let engine = ProtocolEngine::new(FooExecutor::new(), crate::config::ProtocolConfig::new());

        let run = tokio::spawn(async move {
            let _ = engine
                .run(transport, Arc::new(ModernStrategy), StaticContext(()))
                .await;
        });

        client_tx
            .send(Frame::Text(r#"{"type":"connection_init"}"#.into()))
            .unwrap();
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"connection_ack"}"#);

        client_tx
            .send(Frame::Text(
                r#"{"type":"subscribe","id":"1","payload":{"query":"{ noSuchField }"}}"#.into(),
            ))
            .unwrap();
        assert_eq!(
            next_text(&mut client_rx).await,
            r#"{"type":"error","id":"1","payload":[{"message":"no such operation"}]}"#,
        );

        client_tx.send(Frame::Close(None)).unwrap();
        run.await.unwrap();

        assert!(
            client_rx.recv().await.is_none(),
            "MODERN must not send a `complete` after a subscription-level `error`",
        );
    }

    #[tokio::test]
    async fn legacy_subscription_level_failure_emits_complete_too() {
        use crate::config::StaticContext;
        use crate::engine::ProtocolEngine;
        use crate::strategy::LegacyStrategy;

        let (transport, client_tx, mut client_rx) = channel_pair();
        let engine = ProtocolEngine::new(FooExecutor::new(), crate::config::ProtocolConfig::new());

        let run = tokio::spawn(async move {
            let _ = engine
                .run(transport, Arc::new(LegacyStrategy), StaticContext(()))
                .await;
        });

        client_tx
            .send(Frame::Text(r#"{"type":"connection_init"}"#.into()))
            .unwrap();
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"connection_ack"}"#);

        client_tx
            .send(Frame::Text(
                r#"{"type":"start","id":"1","payload":{"query":"{ noSuchField }"}}"#.into(),
            ))
            .unwrap();
        assert_eq!(
            next_text(&mut client_rx).await,
            r#"{"type":"error","id":"1","payload":{"message":"no such operation"}}"#,
        );
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"complete","id":"1"}"#);

        client_tx
            .send(Frame::Text(r#"{"type":"connection_terminate"}"#.into()))
            .unwrap();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn legacy_malformed_start_payload_stays_open() {
        use crate::config::StaticContext;
        use crate::engine::ProtocolEngine;
        use crate::strategy::LegacyStrategy;

        let (transport, client_tx, mut client_rx) = channel_pair();
        let engine = ProtocolEngine::new(FooExecutor::new(), crate::config::ProtocolConfig::new());

        let run = tokio::spawn(async move {
            let _ = engine
                .run(transport, Arc::new(LegacyStrategy), StaticContext(()))
                .await;
        });

        client_tx
            .send(Frame::Text(r#"{"type":"connection_init"}"#.into()))
            .unwrap();
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"connection_ack"}"#);

        client_tx
            .send(Frame::Text(
                r#"{"type":"start","id":"1","payload":{"no_query":true}}"#.into(),
            ))
            .unwrap();
        assert_eq!(
            next_text(&mut client_rx).await,
            r#"{"type":"error","id":"1","payload":{"message":"Invalid message"}}"#,
        );
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"complete","id":"1"}"#);

        // The connection stays open: a second, well-formed `start` still
        // runs normally.
        client_tx
            .send(Frame::Text(
                r#"{"type":"start","id":"2","payload":{"query":"{ getFoo }"}}"#.into(),
            ))
            .unwrap();
        assert_eq!(
            next_text(&mut client_rx).await,
            r#"{"type":"data","id":"2","payload":{"data":{"getFoo":123}}}"#,
        );
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"complete","id":"2"}"#);

        client_tx
            .send(Frame::Text(r#"{"type":"connection_terminate"}"#.into()))
            .unwrap();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn modern_malformed_subscribe_payload_closes_with_4400() {
        use crate::config::StaticContext;
        use crate::engine::ProtocolEngine;
        use crate::strategy::ModernStrategy;

        let (transport, client_tx, mut client_rx) = channel_pair();
        let engine = ProtocolEngine::new(FooExecutor::new(), crate::config::ProtocolConfig::new());

        let run = tokio::spawn(async move {
            let _ = engine
                .run(transport, Arc::new(ModernStrategy), StaticContext(()))
                .await;
        });

        client_tx
            .send(Frame::Text(r#"{"type":"connection_init"}"#.into()))
            .unwrap();
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"connection_ack"}"#);

        client_tx
            .send(Frame::Text(
                r#"{"type":"subscribe","id":"1","payload":{"no_query":true}}"#.into(),
            ))
            .unwrap();

        match client_rx.recv().await.unwrap() {
            Frame::Close(Some((code, reason))) => {
                assert_eq!(code, 4400);
                assert_eq!(reason, "Invalid message");
            }
            other => panic!("expected a close frame, got {other:?}"),
        }

        run.await.unwrap();
    }

    #[tokio::test]
    async fn modern_ping_pong_echoes_payload() {
        use crate::config::StaticContext;
        use crate::engine::ProtocolEngine;
        use crate::strategy::ModernStrategy;

        let (transport, client_tx, mut client_rx) = channel_pair();
        let engine = ProtocolEngine::new(FooExecutor::new(), crate::config::ProtocolConfig::new());

        let run = tokio::spawn(async move {
            let _ = engine
                .run(transport, Arc::new(ModernStrategy), StaticContext(()))
                .await;
        });

        client_tx
            .send(Frame::Text(r#"{"type":"connection_init"}"#.into()))
            .unwrap();
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"connection_ack"}"#);

        client_tx
            .send(Frame::Text(r#"{"type":"ping","payload":{"k":"v"}}"#.into()))
            .unwrap();
        assert_eq!(
            next_text(&mut client_rx).await,
            r#"{"type":"pong","payload":{"k":"v"}}"#,
        );

        client_tx.send(Frame::Close(None)).unwrap();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn extension_hook_errors_merge_into_terminal_frame() {
        use crate::config::{ProtocolConfig, StaticContext};
        use crate::engine::ProtocolEngine;
        use crate::strategy::ModernStrategy;

        let (transport, client_tx, mut client_rx) = channel_pair();
        let config = ProtocolConfig::new()
            .with_extension(|_ctx: Arc<()>| async { vec![ErrorObject::message("ext-one")] })
            .with_extension(|_ctx: Arc<()>| async { vec![ErrorObject::message("ext-two")] });
        let engine = ProtocolEngine::new(FooExecutor::new(), config);

        let run = tokio::spawn(async move {
            let _ = engine
                .run(transport, Arc::new(ModernStrategy), StaticContext(()))
                .await;
        });

        client_tx
            .send(Frame::Text(r#"{"type":"connection_init"}"#.into()))
            .unwrap();
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"connection_ack"}"#);

        client_tx
            .send(Frame::Text(
                r#"{"type":"subscribe","id":"1","payload":{"query":"{ getError }"}}"#.into(),
            ))
            .unwrap();
        let frame = next_text(&mut client_rx).await;
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        let errors = parsed["payload"]["extensions"]["errors"]
            .as_array()
            .expect("extensions.errors must be present");
        assert_eq!(errors.len(), 2);
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"complete","id":"1"}"#);

        client_tx.send(Frame::Close(None)).unwrap();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn on_operation_rejection_closes_connection_as_protocol_violation() {
        use crate::config::{ProtocolConfig, StaticContext};
        use crate::engine::ProtocolEngine;
        use crate::strategy::ModernStrategy;

        let (transport, client_tx, mut client_rx) = channel_pair();
        let config = ProtocolConfig::new().with_on_operation(|_ctx: Arc<()>, _req| async {
            OperationDecision::Reject(vec![ErrorObject::message("not allowed")])
        });
        let engine = ProtocolEngine::new(FooExecutor::new(), config);

        let run = tokio::spawn(async move {
            let _ = engine
                .run(transport, Arc::new(ModernStrategy), StaticContext(()))
                .await;
        });

        client_tx
            .send(Frame::Text(r#"{"type":"connection_init"}"#.into()))
            .unwrap();
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"connection_ack"}"#);

        client_tx
            .send(Frame::Text(
                r#"{"type":"subscribe","id":"1","payload":{"query":"{ getFoo }"}}"#.into(),
            ))
            .unwrap();

        match client_rx.recv().await.unwrap() {
            Frame::Close(Some((code, reason))) => {
                assert_eq!(code, 4403);
                assert_eq!(reason, "not allowed");
            }
            other => panic!("expected a close frame, got {other:?}"),
        }

        run.await.unwrap();
    }

    #[tokio::test]
    async fn modern_connection_init_rejection_closes_without_in_band_error() {
        use crate::config::ProtocolConfig;
        use crate::engine::ProtocolEngine;
        use crate::strategy::ModernStrategy;

        #[derive(Debug, thiserror::Error)]
        #[error("nope")]
        struct RejectInit;

        let (transport, client_tx, mut client_rx) = channel_pair();
        let config = ProtocolConfig::<()>::new();
        let engine = ProtocolEngine::new(FooExecutor::new(), config);
        let init = |_payload: Option<serde_json::Value>| async { Err::<(), _>(RejectInit) };

        let run = tokio::spawn(async move {
            let _ = engine.run(transport, Arc::new(ModernStrategy), init).await;
        });

        client_tx
            .send(Frame::Text(r#"{"type":"connection_init"}"#.into()))
            .unwrap();

        match client_rx.recv().await.unwrap() {
            Frame::Close(Some((code, reason))) => {
                assert_eq!(code, 4403);
                assert_eq!(reason, "nope");
            }
            other => panic!("expected a close frame, got {other:?}"),
        }

        run.await.unwrap();
        assert!(
            client_rx.recv().await.is_none(),
            "MODERN must not send an in-band error before the close",
        );
    }

    #[tokio::test]
    async fn modern_client_cancel_emits_no_complete() {
        use crate::config::StaticContext;
        use crate::engine::ProtocolEngine;
        use crate::strategy::ModernStrategy;

        let (transport, client_tx, mut client_rx) = channel_pair();
        let engine = ProtocolEngine::new(FooExecutor::new(), crate::config::ProtocolConfig::new());

        let run = tokio::spawn(async move {
            let _ = engine
                .run(transport, Arc::new(ModernStrategy), StaticContext(()))
                .await;
        });

        client_tx
            .send(Frame::Text(r#"{"type":"connection_init"}"#.into()))
            .unwrap();
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"connection_ack"}"#);

        client_tx
            .send(Frame::Text(
                r#"{"type":"subscribe","id":"1","payload":{"query":"{ fooUpdates }"}}"#.into(),
            ))
            .unwrap();

        client_tx
            .send(Frame::Text(r#"{"type":"complete","id":"1"}"#.into()))
            .unwrap();

        client_tx.send(Frame::Close(None)).unwrap();
        run.await.unwrap();

        assert!(
            client_rx.recv().await.is_none(),
            "MODERN must not echo `complete` after the client already cancelled",
        );
    }

    #[tokio::test]
    async fn legacy_client_cancel_still_emits_complete() {
        use crate::config::StaticContext;
        use crate::engine::ProtocolEngine;
        use crate::strategy::LegacyStrategy;

        let (transport, client_tx, mut client_rx) = channel_pair();
        let engine = ProtocolEngine::new(FooExecutor::new(), crate::config::ProtocolConfig::new());

        let run = tokio::spawn(async move {
            let _ = engine
                .run(transport, Arc::new(LegacyStrategy), StaticContext(()))
                .await;
        });

        client_tx
            .send(Frame::Text(r#"{"type":"connection_init"}"#.into()))
            .unwrap();
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"connection_ack"}"#);

        client_tx
            .send(Frame::Text(
                r#"{"type":"start","id":"1","payload":{"query":"{ fooUpdates }"}}"#.into(),
            ))
            .unwrap();

        client_tx.send(Frame::Text(r#"{"type":"stop","id":"1"}"#.into())).unwrap();
        assert_eq!(next_text(&mut client_rx).await, r#"{"type":"complete","id":"1"}"#);

        client_tx
            .send(Frame::Text(r#"{"type":"connection_terminate"}"#.into()))
            .unwrap();
        run.await.unwrap();
    }
}
