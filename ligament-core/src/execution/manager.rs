//! Execution Manager Interface
//!
//! Every manager owns a [`ManagerShared`]: the registry of managed nodes,
//! the period, and the traversal mutex. [`ManagerRef`] is the cloneable
//! public handle to it, and [`ExecutionManager`] provides the operations
//! shared by the manual and real-time variants on top of that handle.
//!
//! # Traversal Mutex
//!
//! One tick holds the traversal mutex from its first trigger to the end of
//! the cascade. Connection changes and `start_managing` / `stop_managing`
//! take the same mutex, so structural edits never interleave with a tick.
//! The mutex is reentrant: a thread holding it (including the clock thread
//! inside `operate()`) may call any engine operation.
//!
//! Lock order is traversal mutex, then node system mutex. `Node::lock` follows
//! it by taking the traversal mutex of the node's manager first.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::lock_api::ArcReentrantMutexGuard;
use parking_lot::{RawMutex, RawThreadId, ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::system::{AsNode, NodeId, NodeRef};

struct Registry {
    /// Managed nodes in registration order.
    managed: IndexMap<NodeId, NodeRef>,

    /// Reused buffer for the eager nodes of one tick.
    scratch: Vec<NodeRef>,
}

pub(crate) struct ManagerShared {
    id: u64,
    period: Duration,
    traversal: Arc<ReentrantMutex<RefCell<Registry>>>,
}

impl ManagerShared {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Run `f` while holding the traversal mutex.
    pub(crate) fn locked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.traversal.lock();
        f()
    }

    /// Acquire the traversal mutex with a guard that keeps the mutex alive
    /// on its own, for callers that do not hold the manager.
    pub(crate) fn lock_owned(&self) -> OwnedTraversalGuard {
        OwnedTraversalGuard {
            _guard: self.traversal.lock_arc(),
        }
    }
}

/// Traversal mutex guard that does not borrow the manager.
pub(crate) struct OwnedTraversalGuard {
    _guard: ArcReentrantMutexGuard<RawMutex, RawThreadId, RefCell<Registry>>,
}

/// Holds a manager's traversal mutex.
///
/// While a guard is alive no tick can start, so a group of connection
/// changes made under it becomes visible to the next tick all at once.
#[must_use = "the traversal mutex is released when the guard is dropped"]
pub struct TraversalGuard<'a> {
    _guard: ReentrantMutexGuard<'a, RefCell<Registry>>,
}

/// Shared handle to an execution manager's state.
#[derive(Clone)]
pub struct ManagerRef {
    shared: Arc<ManagerShared>,
}

impl ManagerRef {
    pub(crate) fn new(period: Duration) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            shared: Arc::new(ManagerShared {
                id: COUNTER.fetch_add(1, Ordering::Relaxed),
                period,
                traversal: Arc::new(ReentrantMutex::new(RefCell::new(Registry {
                    managed: IndexMap::new(),
                    scratch: Vec::new(),
                }))),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<ManagerShared>) -> Self {
        Self { shared }
    }

    /// Process-unique manager ID, as it appears in log fields.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Tick period. Zero for a manual manager without an explicit period.
    pub fn period(&self) -> Duration {
        self.shared.period
    }

    /// Acquire the traversal mutex.
    pub fn lock(&self) -> TraversalGuard<'_> {
        TraversalGuard {
            _guard: self.shared.traversal.lock(),
        }
    }

    /// Whether two handles refer to the same manager.
    pub fn same_manager(&self, other: &ManagerRef) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub(crate) fn start_managing(&self, node: NodeRef) -> Result<()> {
        let guard = self.shared.traversal.lock();
        if !node.core().attach(&self.shared) {
            return Err(Error::AlreadyManaged {
                node: node.name().to_owned(),
            });
        }

        debug!(manager = self.id(), node = %node.name(), "start managing");
        let mut registry = guard.borrow_mut();
        registry.managed.insert(node.id(), node);
        let wanted = registry.managed.len();
        if registry.scratch.capacity() < wanted {
            let additional = wanted - registry.scratch.len();
            registry.scratch.reserve(additional);
        }
        Ok(())
    }

    pub(crate) fn stop_managing(&self, node: &NodeRef) -> Result<()> {
        let guard = self.shared.traversal.lock();
        if !node.core().detach(&self.shared) {
            return Err(Error::NotManaged {
                node: node.name().to_owned(),
            });
        }

        debug!(manager = self.id(), node = %node.name(), "stop managing");
        let removed = guard.borrow_mut().managed.shift_remove(&node.id());
        drop(removed);
        Ok(())
    }

    pub(crate) fn is_managing(&self, node: &NodeRef) -> bool {
        let guard = self.shared.traversal.lock();
        let registry = guard.borrow();
        registry.managed.contains_key(&node.id())
    }

    pub(crate) fn managed_count(&self) -> usize {
        let guard = self.shared.traversal.lock();
        let count = guard.borrow().managed.len();
        count
    }

    /// Trigger every eager managed node once, in registration order.
    ///
    /// Stops at the first error.
    pub(crate) fn execute_cycle(&self) -> Result<()> {
        let guard = self.shared.traversal.lock();

        // Snapshot the eager nodes so the registry is not borrowed while
        // nodes run; `operate()` may start or stop managing nodes.
        let mut eager = std::mem::take(&mut guard.borrow_mut().scratch);
        eager.extend(
            guard
                .borrow()
                .managed
                .values()
                .filter(|node| node.is_eager())
                .cloned(),
        );

        let result = eager.iter().try_for_each(|node| {
            trace!(manager = self.id(), node = %node.name(), "tick");
            node.trigger()
        });

        eager.clear();
        guard.borrow_mut().scratch = eager;
        result
    }

    /// Trigger one managed node outside a cycle.
    pub(crate) fn update_node(&self, node: &NodeRef) -> Result<()> {
        let _guard = self.shared.traversal.lock();
        if !self.is_managing(node) {
            return Err(Error::NotManaged {
                node: node.name().to_owned(),
            });
        }
        node.trigger()
    }

    /// Detach every managed node. Called when the owning manager is dropped.
    pub(crate) fn detach_all(&self) {
        let guard = self.shared.traversal.lock();
        let managed = std::mem::take(&mut guard.borrow_mut().managed);
        for node in managed.values() {
            node.core().clear_manager();
        }
        if !managed.is_empty() {
            debug!(manager = self.id(), nodes = managed.len(), "detached all nodes");
        }
        drop(guard);
        drop(managed);
    }
}

impl fmt::Debug for ManagerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerRef")
            .field("id", &self.id())
            .field("period", &self.period())
            .finish()
    }
}

/// Operations shared by every execution manager.
///
/// Implementors only expose their [`ManagerRef`]; registration, locking and
/// updates are provided.
pub trait ExecutionManager {
    fn handle(&self) -> &ManagerRef;

    /// Tick period. Zero for a manual manager without an explicit period.
    fn period(&self) -> Duration {
        self.handle().period()
    }

    /// Acquire the traversal mutex. Hold it around structural graph edits
    /// that must not interleave with a tick.
    fn lock(&self) -> TraversalGuard<'_> {
        self.handle().lock()
    }

    /// Attach `node`. Fails with [`Error::AlreadyManaged`] if any manager,
    /// this one included, already manages it.
    fn start_managing(&self, node: &impl AsNode) -> Result<()> {
        self.handle().start_managing(node.node_ref())
    }

    /// Detach `node`. Fails with [`Error::NotManaged`] if this manager does
    /// not manage it.
    fn stop_managing(&self, node: &impl AsNode) -> Result<()> {
        self.handle().stop_managing(&node.node_ref())
    }

    fn is_managing(&self, node: &impl AsNode) -> bool {
        self.handle().is_managing(&node.node_ref())
    }

    /// Number of managed nodes.
    fn managed_count(&self) -> usize {
        self.handle().managed_count()
    }

    /// Trigger every eager managed node once, without counting it as a cycle.
    fn update(&self) -> Result<()> {
        self.handle().execute_cycle()
    }

    /// Trigger a single managed node.
    fn update_node(&self, node: &impl AsNode) -> Result<()> {
        self.handle().update_node(&node.node_ref())
    }
}
