//! The Protocol Engine: the state machine driving one connection, plus the
//! task topology it spawns to run it.
//!
//! `juniper_graphql_ws` drives its equivalent state machine
//! (`ConnectionState::handle_message`) by polling a `Stream`/`Sink`
//! combinator from inside whatever task owns the embedding `forward()`
//! call. This module instead spawns the topology out explicitly — a reader
//! task, a writer task, one worker task per live operation, and timer
//! tasks for the connect deadline and keepalive — because the bounded data
//! lane plus unbounded, prioritized control lane this crate requires is
//! most directly expressed as real tasks connected by channels rather than
//! poll-driven combinators.

use std::pin::Pin;
use std::sync::Arc;

use futures::sink::SinkExt;
use futures::stream::{SplitSink, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::codec;
use crate::config::{ConnectionInit, OperationDecision, ProtocolConfig};
use crate::data::ErrorObject;
use crate::error::{CloseError, EngineError};
use crate::events::{ClientEvent, ServerEvent};
use crate::executor::Executor;
use crate::registry::OperationRegistry;
use crate::strategy::SubprotocolStrategy;
use crate::upgrader::{Frame, Upgrader};

/// Phase of the connection lifecycle, per the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    AwaitInit,
    Ready,
    Closed,
}

/// A message destined for the writer task's unbounded, high-priority
/// control lane: acks, errors, closes, and keepalives. Distinct from the
/// bounded data lane, which carries only per-operation `next`/`data`
/// results.
enum ControlMessage {
    Event(ServerEvent),
    Close(CloseError),
}

/// Drives the graphql-ws/graphql-transport-ws state machine for one
/// upgraded connection, delegating execution to an [`Executor`].
pub struct ProtocolEngine<Exec: Executor> {
    executor: Exec,
    config: Arc<ProtocolConfig<Exec::Context>>,
}

impl<Exec: Executor> ProtocolEngine<Exec> {
    /// Builds an engine for `executor`, configured by `config`.
    pub fn new(executor: Exec, config: ProtocolConfig<Exec::Context>) -> Self {
        Self {
            executor,
            config: Arc::new(config),
        }
    }

    /// Runs the engine to completion against `upgrader`, using `strategy`
    /// for wire encoding/decoding and `init` to resolve `connection_init`
    /// into the connection's context.
    ///
    /// Returns once the connection is fully closed: the writer has flushed
    /// its last frame, every operation worker has unwound, and (if
    /// configured) the `on_disconnect` hook has run.
    pub async fn run<U, I>(
        &self,
        upgrader: U,
        strategy: Arc<dyn SubprotocolStrategy>,
        init: I,
    ) -> Result<(), EngineError<U::Error>>
    where
        U: Upgrader,
        I: ConnectionInit<Exec::Context>,
    {
        let (sink, stream) = upgrader.split();

        let (inbound_tx, mut inbound_rx) = mpsc::channel::<ClientEvent>(32);
        let (data_tx, data_rx) = mpsc::channel::<ServerEvent>(self.config.data_lane_capacity);
        let (control_tx, control_rx) = mpsc::unbounded_channel::<ControlMessage>();
        let (op_done_tx, mut op_done_rx) = mpsc::channel::<String>(32);

        let reader_strategy = strategy.clone();
        let reader_control_tx = control_tx.clone();
        let reader = tokio::spawn(async move {
            tokio::pin!(stream);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(Frame::Text(text)) => match reader_strategy.decode(&text) {
                        Ok(event) => {
                            if inbound_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            let envelope = codec::peek(&text);
                            tracing::warn!(
                                %err,
                                id = envelope.as_ref().and_then(|e| e.id.as_deref()).unwrap_or(""),
                                message_type = envelope.as_ref().map(|e| e.r#type.as_str()).unwrap_or(""),
                                "failed to decode client frame",
                            );
                            let close = reader_strategy.malformed_message_close();
                            let _ = reader_control_tx.send(ControlMessage::Close(close));
                            break;
                        }
                    },
                    Ok(Frame::Close(_)) => break,
                    Ok(Frame::Other) => continue,
                    Err(err) => {
                        tracing::warn!(%err, "transport error reading frame");
                        break;
                    }
                }
            }
        });

        let writer_strategy = strategy.clone();
        let writer = tokio::spawn(run_writer(sink, writer_strategy, data_rx, control_rx));

        self.run_event_loop(
            strategy,
            init,
            &mut inbound_rx,
            &data_tx,
            &control_tx,
            &op_done_tx,
            &mut op_done_rx,
        )
        .await;

        drop(data_tx);
        drop(control_tx);
        reader.abort();
        let _ = writer.await;

        Ok(())
    }

    /// Runs the AwaitInit → Ready → Closed state machine until the
    /// connection closes for any reason.
    async fn run_event_loop<I>(
        &self,
        strategy: Arc<dyn SubprotocolStrategy>,
        init: I,
        inbound_rx: &mut mpsc::Receiver<ClientEvent>,
        data_tx: &mpsc::Sender<ServerEvent>,
        control_tx: &mpsc::UnboundedSender<ControlMessage>,
        op_done_tx: &mpsc::Sender<String>,
        op_done_rx: &mut mpsc::Receiver<String>,
    ) where
        I: ConnectionInit<Exec::Context>,
    {
        let mut phase = Phase::AwaitInit;
        let mut registry = OperationRegistry::new();
        let mut context: Option<Arc<Exec::Context>> = None;
        let mut init = Some(init);

        let mut connect_deadline: Option<Pin<Box<tokio::time::Sleep>>> = self
            .config
            .connect_timeout
            .map(|period| Box::pin(tokio::time::sleep(period)));
        let mut keepalive = self.config.keep_alive_interval.map(|period| {
            tokio::time::interval_at(tokio::time::Instant::now() + period, period)
        });

        loop {
            tokio::select! {
                biased;

                () = deadline(&mut connect_deadline), if phase == Phase::AwaitInit => {
                    let close = strategy.init_timeout_close();
                    let _ = control_tx.send(ControlMessage::Close(close));
                    break;
                }

                Some(()) = tick(&mut keepalive), if phase == Phase::Ready => {
                    let _ = control_tx.send(ControlMessage::Event(ServerEvent::KeepAlive));
                }

                Some(id) = op_done_rx.recv() => {
                    registry.remove(&id);
                }

                maybe_event = inbound_rx.recv() => {
                    let Some(event) = maybe_event else { break };

                    match phase {
                        Phase::AwaitInit => {
                            match self
                                .handle_await_init(event, &strategy, &mut init, control_tx)
                                .await
                            {
                                AwaitInitOutcome::Pending => {}
                                AwaitInitOutcome::Ready(ctx) => {
                                    context = Some(ctx);
                                    phase = Phase::Ready;
                                }
                                AwaitInitOutcome::Close => break,
                            }
                        }
                        Phase::Ready => {
                            let ctx = context.clone().expect("Ready phase always has a context");
                            let keep_open = self
                                .handle_ready(
                                    event,
                                    &strategy,
                                    ctx,
                                    &mut registry,
                                    data_tx,
                                    control_tx,
                                    op_done_tx,
                                )
                                .await;
                            if !keep_open {
                                break;
                            }
                        }
                        Phase::Closed => break,
                    }
                }
            }
        }

        registry.cancel_all();
        if let (Some(ctx), Some(hook)) = (context, self.config.on_disconnect.as_ref()) {
            hook(ctx).await;
        }
    }

    /// Handles one client event while in the `AwaitInit` phase.
    async fn handle_await_init<I>(
        &self,
        event: ClientEvent,
        strategy: &Arc<dyn SubprotocolStrategy>,
        init: &mut Option<I>,
        control_tx: &mpsc::UnboundedSender<ControlMessage>,
    ) -> AwaitInitOutcome<Exec::Context>
    where
        I: ConnectionInit<Exec::Context>,
    {
        match event {
            ClientEvent::ConnectionInit { payload } => {
                let Some(init) = init.take() else {
                    let _ = control_tx.send(ControlMessage::Close(strategy.too_many_init_close()));
                    return AwaitInitOutcome::Close;
                };
                match init.init(payload).await {
                    Ok(ctx) => {
                        let _ = control_tx.send(ControlMessage::Event(ServerEvent::ConnectionAck));
                        AwaitInitOutcome::Ready(Arc::new(ctx))
                    }
                    Err(err) => {
                        tracing::warn!(%err, "connection_init rejected");
                        let message = err.to_string();
                        if strategy.emits_connection_error_event() {
                            let _ = control_tx.send(ControlMessage::Event(
                                ServerEvent::ConnectionError { message: message.clone() },
                            ));
                        }
                        let _ = control_tx
                            .send(ControlMessage::Close(CloseError::new(4403, message)));
                        AwaitInitOutcome::Close
                    }
                }
            }
            ClientEvent::Ping { payload } => {
                let _ = control_tx.send(ControlMessage::Event(ServerEvent::Pong { payload }));
                AwaitInitOutcome::Pending
            }
            ClientEvent::Pong => AwaitInitOutcome::Pending,
            ClientEvent::Terminate => AwaitInitOutcome::Close,
            ClientEvent::Start { .. } | ClientEvent::Stop { .. } => {
                let _ = control_tx.send(ControlMessage::Close(strategy.unauthorized_close()));
                AwaitInitOutcome::Close
            }
        }
    }

    /// Handles one client event while in the `Ready` phase. Returns
    /// `false` once the connection should close.
    #[allow(clippy::too_many_arguments, reason = "internal helper, not public API")]
    async fn handle_ready(
        &self,
        event: ClientEvent,
        strategy: &Arc<dyn SubprotocolStrategy>,
        context: Arc<Exec::Context>,
        registry: &mut OperationRegistry,
        data_tx: &mpsc::Sender<ServerEvent>,
        control_tx: &mpsc::UnboundedSender<ControlMessage>,
        op_done_tx: &mpsc::Sender<String>,
    ) -> bool {
        match event {
            ClientEvent::ConnectionInit { .. } => {
                let _ = control_tx.send(ControlMessage::Close(strategy.too_many_init_close()));
                false
            }
            ClientEvent::Terminate => false,
            ClientEvent::Ping { payload } => {
                let _ = control_tx.send(ControlMessage::Event(ServerEvent::Pong { payload }));
                true
            }
            ClientEvent::Pong => true,
            ClientEvent::Stop { id } => {
                registry.cancel(&id);
                true
            }
            ClientEvent::Start { id, request } => {
                let request = match request {
                    Ok(request) => request,
                    Err(reason) => {
                        if strategy.malformed_operation_closes_connection() {
                            let _ = control_tx.send(ControlMessage::Close(
                                strategy.malformed_message_close(),
                            ));
                            return false;
                        }
                        tracing::warn!(%reason, %id, "start payload did not decode");
                        let _ = control_tx.send(ControlMessage::Event(ServerEvent::Error {
                            id: id.clone(),
                            errors: vec![ErrorObject::message(
                                strategy.malformed_message_close().reason,
                            )],
                        }));
                        let _ =
                            control_tx.send(ControlMessage::Event(ServerEvent::Complete { id }));
                        return true;
                    }
                };

                if self.config.max_in_flight_operations != 0
                    && registry.len() >= self.config.max_in_flight_operations
                {
                    let _ = control_tx.send(ControlMessage::Event(ServerEvent::Error {
                        id: id.clone(),
                        errors: vec![ErrorObject::message("Too many in-flight operations")],
                    }));
                    let _ = control_tx.send(ControlMessage::Event(ServerEvent::Complete { id }));
                    return true;
                }

                let Some(cancel) = registry.insert(id.clone()) else {
                    let _ =
                        control_tx.send(ControlMessage::Close(strategy.duplicate_id_close(&id)));
                    return false;
                };

                let request = if let Some(hook) = &self.config.on_operation {
                    match hook(context.clone(), request).await {
                        OperationDecision::Proceed(request) => request,
                        OperationDecision::Reject(errors) => {
                            registry.remove(&id);
                            // Hook rejections are protocol violations, not
                            // in-band operation errors: the connection
                            // closes with the hook's message surfaced.
                            let message = errors
                                .into_iter()
                                .next()
                                .map(|e| e.message)
                                .unwrap_or_else(|| "Operation rejected".to_string());
                            if strategy.emits_connection_error_event() {
                                let _ = control_tx.send(ControlMessage::Event(
                                    ServerEvent::ConnectionError { message: message.clone() },
                                ));
                            }
                            let _ =
                                control_tx.send(ControlMessage::Close(CloseError::new(4403, message)));
                            return false;
                        }
                    }
                } else {
                    request
                };

                tokio::spawn(run_worker(
                    id,
                    request,
                    self.executor.clone(),
                    context,
                    cancel,
                    data_tx.clone(),
                    control_tx.clone(),
                    op_done_tx.clone(),
                    strategy.clone(),
                    self.config.extensions.clone(),
                ));
                true
            }
        }
    }
}

/// Outcome of handling one event while awaiting `connection_init`.
enum AwaitInitOutcome<Ctx> {
    /// No phase transition yet.
    Pending,
    /// `connection_init` succeeded; the connection now has a context.
    Ready(Arc<Ctx>),
    /// The connection is closing.
    Close,
}

async fn deadline(sleep: &mut Option<Pin<Box<tokio::time::Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn tick(interval: &mut Option<tokio::time::Interval>) -> Option<()> {
    match interval {
        Some(interval) => {
            interval.tick().await;
            Some(())
        }
        None => std::future::pending().await,
    }
}

async fn run_writer<U>(
    mut sink: SplitSink<U, Frame>,
    strategy: Arc<dyn SubprotocolStrategy>,
    mut data_rx: mpsc::Receiver<ServerEvent>,
    mut control_rx: mpsc::UnboundedReceiver<ControlMessage>,
) where
    U: Upgrader,
{
    loop {
        tokio::select! {
            biased;

            ctrl = control_rx.recv() => {
                match ctrl {
                    Some(ControlMessage::Event(event)) => {
                        let text = strategy.encode(&event);
                        if sink.send(Frame::Text(text)).await.is_err() {
                            return;
                        }
                    }
                    Some(ControlMessage::Close(close)) => {
                        let _ = sink
                            .send(Frame::Close(Some((close.code, close.reason))))
                            .await;
                        let _ = sink.close().await;
                        return;
                    }
                    None => return,
                }
            }

            event = data_rx.recv() => {
                match event {
                    Some(event) => {
                        let text = strategy.encode(&event);
                        if sink.send(Frame::Text(text)).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                }
            }
        }
    }
}

/// Runs one operation to completion: executes it, forwards every result to
/// the data lane, and emits the terminal frame(s) per §4.4.3 and the
/// strategy's subscription-failure close policy.
///
/// Extension hook errors are merged into the *last* result a stream
/// produces rather than every result: a query/mutation's single result is
/// always last, and for a subscription this reproduces §4.3's "terminal
/// frame" wording without guessing ahead of a possibly-infinite stream.
/// This needs a one-item lookahead buffer, since the engine can't know a
/// given `DataResult` is the last until the stream has already produced
/// (or failed to produce) the next one.
#[allow(clippy::too_many_arguments, reason = "internal helper, not public API")]
async fn run_worker<Exec: Executor>(
    id: String,
    request: crate::data::OperationRequest,
    executor: Exec,
    context: Arc<Exec::Context>,
    cancel: CancellationToken,
    data_tx: mpsc::Sender<ServerEvent>,
    control_tx: mpsc::UnboundedSender<ControlMessage>,
    op_done_tx: mpsc::Sender<String>,
    strategy: Arc<dyn SubprotocolStrategy>,
    extensions: Vec<crate::config::ExtensionHook<Exec::Context>>,
) {
    match executor.execute(request, context.clone()).await {
        Err(err) => {
            let _ = control_tx.send(ControlMessage::Event(ServerEvent::Error {
                id: id.clone(),
                errors: vec![ErrorObject::message(err.to_string())],
            }));
            if strategy.emit_complete_after_subscription_error() {
                let _ = control_tx
                    .send(ControlMessage::Event(ServerEvent::Complete { id: id.clone() }));
            }
        }
        Ok(mut results) => {
            let mut pending: Option<crate::data::DataResult> = None;
            let mut cancelled = false;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    item = results.next() => {
                        match item {
                            Some(result) => {
                                if let Some(previous) = pending.replace(result) {
                                    if data_tx
                                        .send(ServerEvent::Next { id: id.clone(), result: previous })
                                        .await
                                        .is_err()
                                    {
                                        cancelled = true;
                                        break;
                                    }
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
            if !cancelled {
                if let Some(mut last) = pending.take() {
                    if !extensions.is_empty() {
                        let mut errors = Vec::new();
                        for hook in &extensions {
                            errors.extend(hook(context.clone()).await);
                        }
                        last.merge_extension_errors(errors);
                    }
                    let _ = data_tx.send(ServerEvent::Next { id: id.clone(), result: last }).await;
                }
                let _ = control_tx
                    .send(ControlMessage::Event(ServerEvent::Complete { id: id.clone() }));
            } else if strategy.emit_complete_after_client_cancel() {
                let _ = control_tx
                    .send(ControlMessage::Event(ServerEvent::Complete { id: id.clone() }));
            }
        }
    }
    let _ = op_done_tx.send(id).await;
}
