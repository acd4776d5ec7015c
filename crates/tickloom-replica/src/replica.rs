//! `Replica` (`spec.md` §4.4, design note 4.9) — a `Process` composed with
//! a peer list and a storage handle, plus the fan-out helper every
//! quorum-style protocol on top of it needs.

use std::cell::RefCell;
use std::rc::Rc;

use tickloom_runtime::{AsyncQuorumCallback, ProcessContext};
use tickloom_storage::Storage;
use tickloom_types::{Message, ProcessId};

/// Composes a `ProcessContext` with the two things every replica adds on
/// top of a bare process: the other nodes in the cluster, and the
/// storage handle its protocol handlers read and write through.
///
/// `storage` is a trait object behind `Rc<RefCell<_>>`, not an owned
/// generic, because handlers need to keep a handle to it alive inside
/// `'static` future continuations registered on the current tick and
/// resolved on a later one (see `tickloom-replica::quorum_replica`).
pub struct Replica {
    pub ctx: ProcessContext,
    pub peer_ids: Vec<ProcessId>,
    pub storage: Rc<RefCell<dyn Storage>>,
}

impl Replica {
    pub fn new(
        ctx: ProcessContext,
        peer_ids: Vec<ProcessId>,
        storage: Rc<RefCell<dyn Storage>>,
    ) -> Self {
        Self {
            ctx,
            peer_ids,
            storage,
        }
    }

    /// `peerIds ∪ {id}`, deterministically ordered (`ProcessId`'s `Ord` is
    /// by name) so fan-out and tie-break behavior don't depend on
    /// insertion order.
    pub fn all_nodes(&self) -> Vec<ProcessId> {
        let mut nodes = self.peer_ids.clone();
        nodes.push(self.ctx.id.clone());
        nodes.sort();
        nodes.dedup();
        nodes
    }

    /// For each node in [`all_nodes`](Self::all_nodes), generates a fresh
    /// correlation id, registers `quorum` under it in the waiting list,
    /// and sends the message `factory` builds for that `(node,
    /// correlation_id)` pair. Mirrors `spec.md` §4.4's
    /// `broadcastToAllReplicas` exactly.
    ///
    /// A node for which the waiting-list registration itself fails (a
    /// misconfigured zero timeout) is skipped with a warning rather than
    /// aborting the whole fan-out — the quorum callback's `expected`
    /// count was fixed at construction and doesn't shrink, so a skipped
    /// recipient simply never contributes a response, same as if it had
    /// timed out.
    pub fn broadcast_to_all_replicas<R: Clone + 'static>(
        &self,
        quorum: &AsyncQuorumCallback<R>,
        mut factory: impl FnMut(&ProcessId, String) -> Message,
    ) {
        for node in self.all_nodes() {
            let correlation_id = self.ctx.next_correlation_id();
            if let Err(e) = self.ctx.waiting_list.borrow_mut().add(
                correlation_id.clone(),
                Box::new(quorum.clone()),
                self.ctx.request_timeout_ticks,
            ) {
                tracing::warn!(node = %node, error = %e, "skipping fan-out recipient");
                continue;
            }
            let message = factory(&node, correlation_id);
            self.ctx.send(message);
        }
    }
}
