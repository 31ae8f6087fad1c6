//! Operation Registry: the engine loop's bookkeeping of currently live
//! operations, owned solely by that loop.
//!
//! Grounded on `juniper_graphql_ws::graphql_transport_ws::ConnectionState`'s
//! `Active { stoppers: HashMap<String, oneshot::Sender<()>>, .. }` field and
//! its `stoppers.retain(|_, tx| !tx.is_canceled())` pruning before insert.
//! Cancellation here uses a [`tokio_util::sync::CancellationToken`] rather
//! than a one-shot sender, since a worker must be able to observe
//! cancellation mid-poll of a long-lived subscription stream rather than
//! just at the moment a channel fires.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

/// Bookkeeping for one live operation.
struct OperationHandle {
    cancel: CancellationToken,
}

/// Per-connection map of live operation ids to their cancellation handles.
///
/// Not `Sync`; the Protocol Engine's loop is the only task that ever
/// touches a given connection's registry, so no internal locking is
/// needed.
#[derive(Default)]
pub struct OperationRegistry {
    ops: HashMap<String, OperationHandle>,
}

impl OperationRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently live operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the registry currently holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether an operation with `id` is currently live.
    pub fn contains(&self, id: &str) -> bool {
        self.ops.contains_key(id)
    }

    /// Registers a new operation under `id`, returning its cancellation
    /// token for the spawned worker to hand to its executor poll loop.
    ///
    /// Before inserting, prunes any entry whose cancellation was already
    /// requested but whose worker hasn't yet called [`Self::remove`], so a
    /// client that races a `stop` against a `start` for the same id
    /// doesn't spuriously trip duplicate-id detection.
    ///
    /// Returns `None` if `id` is still genuinely live (the duplicate-id
    /// case the caller must turn into a protocol violation).
    pub fn insert(&mut self, id: String) -> Option<CancellationToken> {
        self.ops
            .retain(|_, handle| !handle.cancel.is_cancelled());
        if self.ops.contains_key(&id) {
            return None;
        }
        let cancel = CancellationToken::new();
        self.ops.insert(id, OperationHandle {
            cancel: cancel.clone(),
        });
        Some(cancel)
    }

    /// Removes `id` from the registry, e.g. once its worker has sent the
    /// terminal `complete` frame.
    pub fn remove(&mut self, id: &str) {
        self.ops.remove(id);
    }

    /// Signals cancellation for the operation named by `id`, without
    /// removing it — the worker removes itself once it observes the
    /// cancellation and unwinds.
    pub fn cancel(&self, id: &str) {
        if let Some(handle) = self.ops.get(id) {
            handle.cancel.cancel();
        }
    }

    /// Signals cancellation for every live operation, e.g. when the
    /// connection itself is closing.
    pub fn cancel_all(&self) {
        for handle in self.ops.values() {
            handle.cancel.cancel();
        }
    }
}
