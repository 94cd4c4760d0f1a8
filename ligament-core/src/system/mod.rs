//! Systems and Nodes
//!
//! A [`System`] is the user-facing computation; a [`Node`] wraps it with the
//! ports it owns and the engine's bookkeeping.
//!
//! # Execution
//!
//! A node executes when it is *triggered*: by its execution manager on every
//! tick (eager nodes only), or by an upstream output publishing a value.
//! Triggering runs `operate()` if every input resolves to a defined value,
//! and `invalidate_outputs()` otherwise.
//!
//! Triggers are synchronous. Publishing a value runs the whole downstream
//! cascade on the caller's thread before `set_value` returns, so one tick is
//! one depth-first walk over the graph.

mod cascade;
mod node;
mod ports;

use std::sync::{Arc, Weak};

pub use node::{AsNode, Node, NodeBuilder, NodeGuard, NodeId, NodeRef, System};
pub use ports::Ports;

pub(crate) use node::NodeCore;

use crate::error::Result;
use crate::execution::ManagerShared;

/// Type-erased view of a node, used by ports and managers.
pub(crate) trait Trigger: Send + Sync {
    fn core(&self) -> &NodeCore;

    /// Run the node once, as described in the module docs.
    fn trigger(&self) -> Result<()>;
}

/// Run `f` while holding the traversal lock of the manager driving `owner`.
///
/// Unmanaged (or already dropped) owners run `f` without locking anything.
pub(crate) fn with_manager_lock<R>(owner: &Weak<dyn Trigger>, f: impl FnOnce() -> R) -> R {
    match manager_of(owner) {
        Some(manager) => manager.locked(f),
        None => f(),
    }
}

/// Run `f` while holding the traversal locks of the managers driving either
/// end of an edge.
///
/// When both ends are managed by different managers, the locks are taken in
/// manager ID order.
pub(crate) fn with_edge_lock<R>(
    reader: &Weak<dyn Trigger>,
    writer: &Weak<dyn Trigger>,
    f: impl FnOnce() -> R,
) -> R {
    match (manager_of(reader), manager_of(writer)) {
        (Some(a), Some(b)) if !Arc::ptr_eq(&a, &b) => {
            let (first, second) = if a.id() < b.id() { (a, b) } else { (b, a) };
            first.locked(|| second.locked(f))
        }
        (Some(manager), _) | (None, Some(manager)) => manager.locked(f),
        (None, None) => f(),
    }
}

/// The manager currently driving `owner`, if it is alive and managed.
pub(crate) fn manager_of(owner: &Weak<dyn Trigger>) -> Option<Arc<ManagerShared>> {
    owner.upgrade().and_then(|node| node.core().manager())
}
