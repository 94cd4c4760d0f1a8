//! Node Ports
//!
//! [`Ports`] is both the factory a node uses to create its ports and the
//! ordered record of those ports. The record lets the engine answer
//! "are all inputs defined?", mark every output stale, and disconnect
//! everything when the node is dropped, without knowing the node's concrete
//! type.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::Trigger;
use crate::port::{AbstractInput, AbstractOutput, Input, InputCore, Output, OutputCore};

struct PortEntry<P: ?Sized> {
    port: Arc<P>,
    typed: Arc<dyn Any + Send + Sync>,
}

/// The ordered inputs and outputs of one node.
pub struct Ports {
    owner: Weak<dyn Trigger>,
    inputs: Mutex<SmallVec<[PortEntry<dyn AbstractInput>; 4]>>,
    outputs: Mutex<SmallVec<[PortEntry<dyn AbstractOutput>; 4]>>,
}

impl Ports {
    pub(crate) fn new(owner: Weak<dyn Trigger>) -> Self {
        Self {
            owner,
            inputs: Mutex::new(SmallVec::new()),
            outputs: Mutex::new(SmallVec::new()),
        }
    }

    /// Create a new input owned by this node.
    pub fn input<T: Send + 'static>(&self) -> Input<T> {
        let core = Arc::new(InputCore::<T>::new(self.owner.clone()));
        let port: Arc<dyn AbstractInput> = core.clone();
        let typed: Arc<dyn Any + Send + Sync> = core.clone();
        self.inputs.lock().push(PortEntry { port, typed });
        Input::from_core(core)
    }

    /// Create a new output owned by this node.
    pub fn output<T: Send + 'static>(&self) -> Output<T> {
        let core = Arc::new(OutputCore::<T>::new(self.owner.clone()));
        let port: Arc<dyn AbstractOutput> = core.clone();
        let typed: Arc<dyn Any + Send + Sync> = core.clone();
        self.outputs.lock().push(PortEntry { port, typed });
        Output::from_core(core)
    }

    /// The `index`-th input, if it exists and carries `T`.
    pub fn input_at<T: Send + 'static>(&self, index: usize) -> Option<Input<T>> {
        let typed = self.inputs.lock().get(index)?.typed.clone();
        typed.downcast::<InputCore<T>>().ok().map(Input::from_core)
    }

    /// The `index`-th output, if it exists and carries `T`.
    pub fn output_at<T: Send + 'static>(&self, index: usize) -> Option<Output<T>> {
        let typed = self.outputs.lock().get(index)?.typed.clone();
        typed.downcast::<OutputCore<T>>().ok().map(Output::from_core)
    }

    /// Number of inputs created so far.
    pub fn num_inputs(&self) -> usize {
        self.inputs.lock().len()
    }

    /// Number of outputs created so far.
    pub fn num_outputs(&self) -> usize {
        self.outputs.lock().len()
    }

    /// Whether every input resolves to a defined value.
    ///
    /// Vacuously true for a node without inputs.
    pub fn inputs_defined(&self) -> bool {
        self.inputs.lock().iter().all(|entry| entry.port.is_defined())
    }

    /// Mark every output undefined without notifying downstream nodes.
    pub fn invalidate_outputs(&self) {
        for entry in self.outputs.lock().iter() {
            entry.port.invalidate();
        }
    }

    fn release(&self) {
        let inputs = std::mem::take(&mut *self.inputs.lock());
        for entry in &inputs {
            entry.port.release();
        }
        let outputs = std::mem::take(&mut *self.outputs.lock());
        for entry in &outputs {
            entry.port.release();
        }
    }
}

impl Drop for Ports {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Ports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ports")
            .field("inputs", &self.num_inputs())
            .field("outputs", &self.num_outputs())
            .finish()
    }
}
