//! Output Ports
//!
//! An output holds the single authoritative [`Value`] for a signal and the
//! list of inputs that read it.
//!
//! # How Publishing Works
//!
//! 1. [`Output::set_value`] stores the value in the output's slot.
//!
//! 2. The output collects the owning node of every input that resolves to it:
//!    its own inputs, then the inputs of every output delegating to it,
//!    recursively.
//!
//! 3. Each collected node is triggered in that order, on the caller's thread.
//!    A node reached through several inputs is triggered once.
//!
//! No lock is held while downstream nodes run, so they are free to read this
//! output and to publish on their own outputs.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::debug;

use super::input::InputCore;
use super::{AbstractOutput, Value};
use crate::error::{Error, Result};
use crate::system::{with_edge_lock, with_manager_lock, Trigger};

/// Downstream nodes collected during one publish.
pub(crate) type Targets = SmallVec<[Arc<dyn Trigger>; 8]>;

/// Shared state behind every handle to one output.
pub(crate) struct OutputCore<T> {
    /// The node that created this output.
    pub(crate) owner: Weak<dyn Trigger>,

    state: Mutex<OutputState<T>>,
}

struct OutputState<T> {
    /// This output's own slot. Ignored by readers while delegating.
    value: Value<T>,

    /// Output this one forwards resolution to.
    delegate: Option<Weak<OutputCore<T>>>,

    /// Inputs connected to this output, in connection order.
    inputs: SmallVec<[Weak<InputCore<T>>; 4]>,

    /// Outputs delegating to this one, in delegation order.
    delegators: SmallVec<[Weak<OutputCore<T>>; 2]>,
}

impl<T: Send + 'static> OutputCore<T> {
    pub(crate) fn new(owner: Weak<dyn Trigger>) -> Self {
        Self {
            owner,
            state: Mutex::new(OutputState {
                value: Value::Undefined,
                delegate: None,
                inputs: SmallVec::new(),
                delegators: SmallVec::new(),
            }),
        }
    }

    /// Name of the owning node, for diagnostics.
    pub(crate) fn owner_name(&self) -> String {
        self.owner
            .upgrade()
            .map(|node| node.core().name().to_owned())
            .unwrap_or_else(|| "<dropped>".to_owned())
    }

    pub(crate) fn attach_input(&self, input: &Arc<InputCore<T>>) {
        self.state.lock().inputs.push(Arc::downgrade(input));
    }

    pub(crate) fn detach_input(&self, input: *const InputCore<T>) {
        self.state
            .lock()
            .inputs
            .retain(|candidate| !std::ptr::eq(candidate.as_ptr(), input));
    }

    pub(crate) fn take_inputs(&self) -> SmallVec<[Weak<InputCore<T>>; 4]> {
        std::mem::take(&mut self.state.lock().inputs)
    }

    /// Run `f` against the slot at the end of the delegation chain.
    pub(crate) fn with_resolved<R>(self: &Arc<Self>, f: impl FnOnce(&Value<T>) -> R) -> R {
        let mut current = Arc::clone(self);
        loop {
            let next = {
                let state = current.state.lock();
                match state.delegate.as_ref().and_then(Weak::upgrade) {
                    Some(next) => next,
                    None => return f(&state.value),
                }
            };
            current = next;
        }
    }

    /// Whether following the delegation chain from `self` reaches `target`.
    fn resolves_to(self: &Arc<Self>, target: &Arc<Self>) -> bool {
        let mut current = Arc::clone(self);
        loop {
            if Arc::ptr_eq(&current, target) {
                return true;
            }
            let next = current.state.lock().delegate.as_ref().and_then(Weak::upgrade);
            match next {
                Some(next) => current = next,
                None => return false,
            }
        }
    }

    /// Collect the owners of every input resolving to this output.
    fn collect_targets(&self, targets: &mut Targets) {
        let delegators = {
            let state = self.state.lock();
            for input in state.inputs.iter().filter_map(Weak::upgrade) {
                if let Some(node) = input.owner.upgrade() {
                    if !targets.iter().any(|seen| same_node(seen, &node)) {
                        targets.push(node);
                    }
                }
            }
            state.delegators.clone()
        };

        for delegator in delegators.iter().filter_map(Weak::upgrade) {
            delegator.collect_targets(targets);
        }
    }

    fn remove_delegator(&self, delegator: *const OutputCore<T>) {
        self.state
            .lock()
            .delegators
            .retain(|candidate| !std::ptr::eq(candidate.as_ptr(), delegator));
    }

    fn undelegate(&self) {
        let previous = self.state.lock().delegate.take();
        if let Some(target) = previous.as_ref().and_then(Weak::upgrade) {
            target.remove_delegator(self);
        }
    }
}

fn same_node(a: &Arc<dyn Trigger>, b: &Arc<dyn Trigger>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl<T: Send + 'static> AbstractOutput for OutputCore<T> {
    fn invalidate(&self) {
        self.state.lock().value = Value::Undefined;
    }

    fn release(&self) {
        let (inputs, delegators) = {
            let mut state = self.state.lock();
            state.value = Value::Undefined;
            (
                std::mem::take(&mut state.inputs),
                std::mem::take(&mut state.delegators),
            )
        };

        for input in inputs.iter().filter_map(Weak::upgrade) {
            input.clear_if_connected_to(self);
        }
        self.undelegate();
        for delegator in delegators.iter().filter_map(Weak::upgrade) {
            delegator.state.lock().delegate = None;
        }
    }
}

/// A node's typed output port.
///
/// Handles are cheap to clone; every clone refers to the same port.
///
/// # Example
///
/// ```rust,ignore
/// // Inside a node's operate():
/// self.torque.set_value(command)?;
/// ```
pub struct Output<T> {
    pub(crate) core: Arc<OutputCore<T>>,
}

impl<T: Send + 'static> Output<T> {
    pub(crate) fn from_core(core: Arc<OutputCore<T>>) -> Self {
        Self { core }
    }

    /// Publish a value and synchronously trigger every downstream node.
    ///
    /// Errors raised by downstream nodes (for example an undefined input
    /// further down the chain, or a wiring cycle) propagate back to the caller.
    pub fn set_value(&self, value: T) -> Result<()> {
        self.core.state.lock().value = Value::Defined(value);

        let mut targets = Targets::new();
        self.core.collect_targets(&mut targets);
        for node in targets {
            node.trigger()?;
        }
        Ok(())
    }

    /// Mark this output's value stale without notifying downstream nodes.
    pub fn set_value_undefined(&self) {
        self.core.invalidate();
    }

    /// Forward resolution of this output to `target`.
    ///
    /// Any previous delegation is replaced. Readers of this output see the
    /// value at the end of `target`'s chain, and publishing on `target` triggers
    /// this output's inputs. Fails with [`Error::CycleDetected`] if `target`
    /// already resolves to this output.
    pub fn delegate_to(&self, target: &Output<T>) -> Result<()> {
        with_edge_lock(&self.core.owner, &target.core.owner, || {
            if target.core.resolves_to(&self.core) {
                return Err(Error::CycleDetected {
                    node: self.core.owner_name(),
                });
            }

            self.core.undelegate();
            self.core.state.lock().delegate = Some(Arc::downgrade(&target.core));
            target
                .core
                .state
                .lock()
                .delegators
                .push(Arc::downgrade(&self.core));

            debug!(
                from = %self.core.owner_name(),
                to = %target.core.owner_name(),
                "output delegated"
            );
            Ok(())
        })
    }

    /// Stop delegating. Readers see this output's own slot again.
    pub fn undelegate(&self) {
        with_manager_lock(&self.core.owner, || self.core.undelegate());
    }

    /// Whether this output currently forwards to another output.
    pub fn is_delegating(&self) -> bool {
        self.core.state.lock().delegate.is_some()
    }

    /// Whether any input or delegating output references this output.
    pub fn is_connected(&self) -> bool {
        let state = self.core.state.lock();
        !state.inputs.is_empty() || !state.delegators.is_empty()
    }

    /// Number of inputs connected directly to this output.
    pub fn num_inputs(&self) -> usize {
        self.core.state.lock().inputs.len()
    }

    /// The value readers of this output currently observe.
    pub fn value(&self) -> Value<T>
    where
        T: Clone,
    {
        self.core.with_resolved(Value::clone)
    }

    /// Whether two handles refer to the same port.
    pub fn same_port(&self, other: &Output<T>) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl<T> Clone for Output<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Output<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("owner", &self.core.owner_name())
            .field("inputs", &self.num_inputs())
            .field("delegating", &self.is_delegating())
            .finish()
    }
}
