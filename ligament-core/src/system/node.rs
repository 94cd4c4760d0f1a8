//! Nodes
//!
//! A node pairs a user-supplied [`System`] with the ports it created and the
//! bookkeeping the engine needs: identity, the eager flag, the blocking
//! capability, and the execution manager currently driving it.
//!
//! # Lifecycle
//!
//! 1. Constructed detached with [`Node::new`] or a [`NodeBuilder`].
//! 2. Optionally attached to an execution manager.
//! 3. Triggered by ticks or by upstream publishes, any number of times.
//! 4. Detached by `stop_managing`, or when the manager is dropped.
//! 5. Dropped. Every port it owns is disconnected first.
//!
//! A managed node is kept alive by its manager, so it cannot be dropped
//! while a tick might still reach it.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

use super::cascade::CascadeFrame;
use super::{Ports, Trigger};
use crate::error::Result;
use crate::execution::{ManagerRef, ManagerShared, OwnedTraversalGuard, SoftModeGuard};
use crate::port::{Input, Output};

/// Unique identifier for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A computational unit driven by the engine.
///
/// `operate()` reads the node's inputs and publishes on its outputs. It may
/// run inside a hard real-time tick, so it must be bounded in time and must
/// not block on the operating system unless the node was built with
/// [`NodeBuilder::may_block`].
pub trait System: Send + 'static {
    /// Recompute outputs from inputs.
    fn operate(&mut self) -> Result<()>;

    /// Whether `operate()` should run. Defaults to "every input is defined".
    fn inputs_valid(&self, ports: &Ports) -> bool {
        ports.inputs_defined()
    }

    /// Called instead of `operate()` when the inputs are not valid.
    /// Defaults to marking every output undefined.
    fn invalidate_outputs(&mut self, ports: &Ports) {
        ports.invalidate_outputs();
    }
}

/// Engine-side state shared by every node regardless of its system type.
pub(crate) struct NodeCore {
    id: NodeId,
    name: String,
    eager: AtomicBool,
    may_block: bool,
    manager: Mutex<Option<Weak<ManagerShared>>>,
}

impl NodeCore {
    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_eager(&self) -> bool {
        self.eager.load(Ordering::Acquire)
    }

    /// The manager currently driving this node.
    pub(crate) fn manager(&self) -> Option<Arc<ManagerShared>> {
        self.manager.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Install `manager` if the node is unmanaged. Returns `false` if it already had one.
    pub(crate) fn attach(&self, manager: &Arc<ManagerShared>) -> bool {
        let mut slot = self.manager.lock();
        if slot.as_ref().is_some_and(|current| current.strong_count() > 0) {
            return false;
        }
        *slot = Some(Arc::downgrade(manager));
        true
    }

    /// Clear the manager if it is `manager`. Returns `false` otherwise.
    pub(crate) fn detach(&self, manager: &Arc<ManagerShared>) -> bool {
        let mut slot = self.manager.lock();
        let owned = slot
            .as_ref()
            .is_some_and(|current| std::ptr::eq(current.as_ptr(), Arc::as_ptr(manager)));
        if owned {
            *slot = None;
        }
        owned
    }

    /// Clear the manager unconditionally. Used when the manager itself is dropped.
    pub(crate) fn clear_manager(&self) {
        *self.manager.lock() = None;
    }
}

struct NodeInner<S> {
    core: NodeCore,
    ports: Ports,
    system: Mutex<S>,
}

impl<S: System> Trigger for NodeInner<S> {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn trigger(&self) -> Result<()> {
        let _frame = CascadeFrame::enter(self.core.id, &self.core.name)?;
        let _soft = self.core.may_block.then(SoftModeGuard::enter);

        let mut system = self.system.lock();
        if system.inputs_valid(&self.ports) {
            trace!(node = %self.core.name, depth = CascadeFrame::depth(), "operate");
            system.operate()
        } else {
            trace!(node = %self.core.name, "inputs invalid, outputs invalidated");
            system.invalidate_outputs(&self.ports);
            Ok(())
        }
    }
}

/// Configures a node before its system is built.
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    name: String,
    eager: bool,
    may_block: bool,
}

impl NodeBuilder {
    /// Start configuring a node named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            eager: true,
            may_block: false,
        }
    }

    /// Whether a managing execution manager triggers this node every tick.
    /// Lazy nodes only run when an upstream output publishes. Defaults to `true`.
    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    /// Declare that `operate()` may block on the operating system.
    ///
    /// The engine drops to soft real-time mode around every `operate()` call
    /// of such a node and restores the previous mode afterwards. Defaults to `false`.
    pub fn may_block(mut self, may_block: bool) -> Self {
        self.may_block = may_block;
        self
    }

    /// Build the node. `build` receives the node's port factory.
    pub fn build<S, F>(self, build: F) -> Node<S>
    where
        S: System,
        F: FnOnce(&Ports) -> S,
    {
        let inner = Arc::new_cyclic(|weak: &Weak<NodeInner<S>>| {
            let owner: Weak<dyn Trigger> = weak.clone();
            let ports = Ports::new(owner);
            let system = build(&ports);
            NodeInner {
                core: NodeCore {
                    id: NodeId::new(),
                    name: self.name,
                    eager: AtomicBool::new(self.eager),
                    may_block: self.may_block,
                    manager: Mutex::new(None),
                },
                ports,
                system: Mutex::new(system),
            }
        });
        Node { inner }
    }
}

/// A handle to a node running system `S`.
///
/// Handles are cheap to clone. The node is dropped with its last handle,
/// or with its manager if that comes later.
///
/// # Example
///
/// ```rust,ignore
/// let gain = Node::new("gain", |ports| Gain::new(ports, 38.0));
/// let input = gain.lock().input.clone();
/// ```
pub struct Node<S: System> {
    inner: Arc<NodeInner<S>>,
}

impl<S: System> Node<S> {
    /// Create an eager node named `name`.
    pub fn new<F>(name: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&Ports) -> S,
    {
        NodeBuilder::new(name).build(build)
    }

    /// The node's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.core.id
    }

    /// The name given at construction, used in logs and errors.
    pub fn name(&self) -> &str {
        &self.inner.core.name
    }

    /// Whether a managing execution manager triggers this node every tick.
    pub fn is_eager(&self) -> bool {
        self.inner.core.is_eager()
    }

    /// Change the eager flag. Takes effect from the next tick.
    pub fn set_eager(&self, eager: bool) {
        self.inner.core.eager.store(eager, Ordering::Release);
    }

    /// Whether `operate()` runs in soft real-time mode.
    pub fn may_block(&self) -> bool {
        self.inner.core.may_block
    }

    /// Lock the system for inspection or reconfiguration.
    ///
    /// If the node is managed, the manager's traversal mutex is taken first,
    /// in the same order a tick takes them. No tick of that manager runs
    /// while the guard is alive, and the graph may be rewired through the
    /// guard's port handles.
    pub fn lock(&self) -> NodeGuard<'_, S> {
        loop {
            let manager = self.inner.core.manager();
            let traversal = manager.as_ref().map(|manager| manager.lock_owned());
            let still_current = match (&manager, self.inner.core.manager()) {
                (Some(before), Some(after)) => Arc::ptr_eq(before, &after),
                (None, None) => true,
                _ => false,
            };
            if still_current {
                return NodeGuard {
                    system: self.inner.system.lock(),
                    _traversal: traversal,
                };
            }
        }
    }

    /// The node's ports.
    pub fn ports(&self) -> &Ports {
        &self.inner.ports
    }

    /// The `index`-th input, if it carries `T`.
    pub fn input<T: Send + 'static>(&self, index: usize) -> Option<Input<T>> {
        self.inner.ports.input_at(index)
    }

    /// The `index`-th output, if it carries `T`.
    pub fn output<T: Send + 'static>(&self, index: usize) -> Option<Output<T>> {
        self.inner.ports.output_at(index)
    }

    /// Whether an execution manager currently drives this node.
    pub fn is_execution_managed(&self) -> bool {
        self.inner.core.manager().is_some()
    }

    /// The execution manager currently driving this node.
    pub fn execution_manager(&self) -> Option<ManagerRef> {
        self.inner.core.manager().map(ManagerRef::from_shared)
    }

    /// A type-erased handle to this node.
    pub fn node_ref(&self) -> NodeRef {
        NodeRef {
            node: self.inner.clone(),
        }
    }
}

impl<S: System> Clone for Node<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: System> fmt::Debug for Node<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("eager", &self.is_eager())
            .field("managed", &self.is_execution_managed())
            .field("ports", self.ports())
            .finish()
    }
}

/// Exclusive access to a node's system, returned by [`Node::lock`].
///
/// Also holds the traversal mutex of the node's manager, if it had one when
/// the guard was taken.
#[must_use = "the node is unlocked when the guard is dropped"]
pub struct NodeGuard<'a, S> {
    // Released before the traversal mutex.
    system: MutexGuard<'a, S>,
    _traversal: Option<OwnedTraversalGuard>,
}

impl<S> Deref for NodeGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.system
    }
}

impl<S> DerefMut for NodeGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.system
    }
}

/// A type-erased handle to a node.
#[derive(Clone)]
pub struct NodeRef {
    pub(crate) node: Arc<dyn Trigger>,
}

impl NodeRef {
    /// The node's unique ID.
    pub fn id(&self) -> NodeId {
        self.node.core().id()
    }

    /// The node's name.
    pub fn name(&self) -> &str {
        self.node.core().name()
    }

    /// Whether the node runs on every tick of its manager.
    pub fn is_eager(&self) -> bool {
        self.node.core().is_eager()
    }

    /// Whether an execution manager currently drives the node.
    pub fn is_execution_managed(&self) -> bool {
        self.node.core().manager().is_some()
    }

    pub(crate) fn core(&self) -> &NodeCore {
        self.node.core()
    }

    pub(crate) fn trigger(&self) -> Result<()> {
        self.node.trigger()
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

/// Anything that names a node: a typed [`Node`] or a [`NodeRef`].
pub trait AsNode {
    fn node_ref(&self) -> NodeRef;
}

impl<S: System> AsNode for Node<S> {
    fn node_ref(&self) -> NodeRef {
        Node::node_ref(self)
    }
}

impl AsNode for NodeRef {
    fn node_ref(&self) -> NodeRef {
        self.clone()
    }
}
