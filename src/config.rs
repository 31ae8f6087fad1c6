//! Per-connection configuration: timeouts, in-flight limits, and the
//! lifecycle hooks (`on_connect`, `on_operation`, `on_disconnect`).

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::data::{ErrorObject, OperationRequest};

/// Resolves a `connection_init` payload into the context that every
/// operation on the connection will execute against.
///
/// Mirrors `juniper_graphql_ws::Init`: implemented directly by context
/// values that need no validation, and blanket-implemented for closures,
/// so embedders can pass either a bare context or an async validation
/// closure to [`ProtocolConfig::with_on_connect`].
pub trait ConnectionInit<Ctx>: Send + 'static {
    /// Error returned when the `connection_init` payload is rejected. Per
    /// the error-handling policy this closes the connection rather than
    /// producing an in-band error.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The future driving initialisation.
    type Future: Future<Output = Result<Ctx, Self::Error>> + Send + 'static;

    /// Consumes `self` and the `connection_init` payload, producing the
    /// connection's context.
    fn init(self, payload: Option<Value>) -> Self::Future;
}

/// An always-succeeding [`ConnectionInit`] that hands back a fixed context,
/// ignoring the `connection_init` payload entirely.
#[derive(Clone, Debug)]
pub struct StaticContext<Ctx>(pub Ctx);

impl<Ctx: Send + 'static> ConnectionInit<Ctx> for StaticContext<Ctx> {
    type Error = std::convert::Infallible;
    type Future = futures::future::Ready<Result<Ctx, Self::Error>>;

    fn init(self, _payload: Option<Value>) -> Self::Future {
        futures::future::ready(Ok(self.0))
    }
}

impl<F, Fut, Ctx, E> ConnectionInit<Ctx> for F
where
    F: FnOnce(Option<Value>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Ctx, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;
    type Future = Fut;

    fn init(self, payload: Option<Value>) -> Self::Future {
        self(payload)
    }
}

/// Outcome of the `on_operation` hook: either let the operation proceed,
/// optionally with adjusted variables, or reject it outright.
pub enum OperationDecision {
    /// Proceed to execution, using `request` (possibly amended by the
    /// hook, e.g. to inject server-side variables).
    Proceed(OperationRequest),
    /// Reject the operation. Per the error-handling policy, hook
    /// rejections are protocol violations: the connection closes with the
    /// first error's message surfaced, rather than this becoming an
    /// in-band operation-level error.
    Reject(Vec<ErrorObject>),
}

/// A boxed `on_operation` hook.
pub type OperationHook<Ctx> = Arc<
    dyn Fn(Arc<Ctx>, OperationRequest) -> BoxFuture<'static, OperationDecision> + Send + Sync,
>;

/// A boxed `on_disconnect` hook.
pub type DisconnectHook<Ctx> = Arc<dyn Fn(Arc<Ctx>) -> BoxFuture<'static, ()> + Send + Sync>;

/// A boxed extension hook: contributes [`ErrorObject`]s that get appended
/// to `extensions.errors` on an operation's terminal result frame.
///
/// Mirrors how `juniper_subscriptions::Connection` folds every registered
/// schema extension's per-field `ExecutionError`s into each yielded
/// response; here the fold happens once, against the terminal `DataResult`,
/// per spec §4.3's "combine errors" merge rule.
pub type ExtensionHook<Ctx> =
    Arc<dyn Fn(Arc<Ctx>) -> BoxFuture<'static, Vec<ErrorObject>> + Send + Sync>;

/// Connection-scoped configuration: timeouts, in-flight operation limits,
/// and lifecycle hooks.
///
/// Shaped after `juniper_graphql_ws::ConnectionConfig`'s builder, extended
/// with the connect-timeout and hook fields the external-interfaces surface
/// adds.
pub struct ProtocolConfig<Ctx> {
    /// How long to wait for `connection_init` before closing with
    /// `4408: Connection initialisation timeout`, or `None` to wait
    /// forever. Unset by default, per spec.md §6's `connectTimeout`.
    pub connect_timeout: Option<Duration>,

    /// Interval on which to emit keepalive frames while `READY`, or `None`
    /// to disable keepalives entirely. Unset by default, per spec.md §6's
    /// `keepaliveInterval`.
    pub keep_alive_interval: Option<Duration>,

    /// Maximum number of concurrently in-flight operations, or `0` for
    /// unlimited. A `start`/`subscribe` that would exceed this is rejected
    /// in-band (an `error` followed by `complete` for that id) rather than
    /// closing the connection.
    pub max_in_flight_operations: usize,

    /// Capacity of the writer task's bounded data lane. The control lane
    /// (acks, errors, closes, keepalives) is always unbounded.
    pub data_lane_capacity: usize,

    pub(crate) on_operation: Option<OperationHook<Ctx>>,
    pub(crate) on_disconnect: Option<DisconnectHook<Ctx>>,
    pub(crate) extensions: Vec<ExtensionHook<Ctx>>,
}

impl<Ctx> Clone for ProtocolConfig<Ctx> {
    fn clone(&self) -> Self {
        Self {
            connect_timeout: self.connect_timeout,
            keep_alive_interval: self.keep_alive_interval,
            max_in_flight_operations: self.max_in_flight_operations,
            data_lane_capacity: self.data_lane_capacity,
            on_operation: self.on_operation.clone(),
            on_disconnect: self.on_disconnect.clone(),
            extensions: self.extensions.clone(),
        }
    }
}

impl<Ctx> fmt::Debug for ProtocolConfig<Ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolConfig")
            .field("connect_timeout", &self.connect_timeout)
            .field("keep_alive_interval", &self.keep_alive_interval)
            .field("max_in_flight_operations", &self.max_in_flight_operations)
            .field("data_lane_capacity", &self.data_lane_capacity)
            .finish_non_exhaustive()
    }
}

impl<Ctx> Default for ProtocolConfig<Ctx> {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            keep_alive_interval: None,
            max_in_flight_operations: 0,
            data_lane_capacity: 64,
            on_operation: None,
            on_disconnect: None,
            extensions: Vec::new(),
        }
    }
}

impl<Ctx> ProtocolConfig<Ctx> {
    /// Starts from the defaults (no connect timeout, no keepalive,
    /// unlimited in-flight operations, a 64-frame data lane).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `connection_init` deadline, or disables it entirely with
    /// `None`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the keepalive interval, or disables keepalives with `None`.
    #[must_use]
    pub fn with_keep_alive_interval(mut self, interval: Option<Duration>) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Sets the in-flight operation limit. `0` means unlimited.
    #[must_use]
    pub fn with_max_in_flight_operations(mut self, max: usize) -> Self {
        self.max_in_flight_operations = max;
        self
    }

    /// Sets the writer task's bounded data lane capacity.
    #[must_use]
    pub fn with_data_lane_capacity(mut self, capacity: usize) -> Self {
        self.data_lane_capacity = capacity;
        self
    }

    /// Registers the `on_operation` hook, run after a `start`/`subscribe`
    /// message decodes and before the executor is invoked.
    #[must_use]
    pub fn with_on_operation<H, Fut>(mut self, hook: H) -> Self
    where
        H: Fn(Arc<Ctx>, OperationRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationDecision> + Send + 'static,
        Ctx: 'static,
    {
        self.on_operation = Some(Arc::new(move |ctx, req| Box::pin(hook(ctx, req))));
        self
    }

    /// Registers the `on_disconnect` hook, run once after the connection
    /// closes for any reason.
    #[must_use]
    pub fn with_on_disconnect<H, Fut>(mut self, hook: H) -> Self
    where
        H: Fn(Arc<Ctx>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        Ctx: 'static,
    {
        self.on_disconnect = Some(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Registers an extension hook. Every registered hook runs once per
    /// operation, against its terminal [`crate::data::DataResult`]; the
    /// errors it returns are appended to that frame's `extensions.errors`
    /// list, merged across every hook that contributed one.
    #[must_use]
    pub fn with_extension<H, Fut>(mut self, hook: H) -> Self
    where
        H: Fn(Arc<Ctx>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<ErrorObject>> + Send + 'static,
        Ctx: 'static,
    {
        self.extensions.push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }
}
