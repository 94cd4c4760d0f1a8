//! Input Ports
//!
//! An input is a reference to at most one output. It has no value of its own.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::output::OutputCore;
use super::AbstractInput;
use crate::error::{Error, Result};
use crate::system::Trigger;

/// Shared state behind every handle to one input.
pub(crate) struct InputCore<T> {
    /// The node that created this input. Triggered when the referenced output publishes.
    pub(crate) owner: Weak<dyn Trigger>,

    /// The output this input reads from.
    pub(crate) output: Mutex<Option<Arc<OutputCore<T>>>>,
}

impl<T: Send + 'static> InputCore<T> {
    pub(crate) fn new(owner: Weak<dyn Trigger>) -> Self {
        Self {
            owner,
            output: Mutex::new(None),
        }
    }

    /// Drop the reference if it points at `output`.
    pub(crate) fn clear_if_connected_to(&self, output: *const OutputCore<T>) {
        let mut slot = self.output.lock();
        if slot
            .as_ref()
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), output))
        {
            *slot = None;
        }
    }

    fn connected_output(&self) -> Result<Arc<OutputCore<T>>> {
        self.output.lock().clone().ok_or(Error::NotConnected)
    }
}

impl<T: Send + 'static> AbstractInput for InputCore<T> {
    fn is_defined(&self) -> bool {
        self.connected_output()
            .map(|output| output.with_resolved(|value| value.is_defined()))
            .unwrap_or(false)
    }

    fn release(&self) {
        let previous = self.output.lock().take();
        if let Some(output) = previous {
            output.detach_input(self);
        }
    }
}

/// A node's typed input port.
///
/// Handles are cheap to clone; every clone refers to the same port.
///
/// # Example
///
/// ```rust,ignore
/// // Inside a node's operate():
/// let error = self.error.get_value()?;
/// ```
pub struct Input<T> {
    pub(crate) core: Arc<InputCore<T>>,
}

impl<T: Send + 'static> Input<T> {
    pub(crate) fn from_core(core: Arc<InputCore<T>>) -> Self {
        Self { core }
    }

    /// Read the current value.
    ///
    /// Fails with [`Error::NotConnected`] if the input references no output,
    /// or [`Error::ValueUndefined`] if the resolved value is undefined.
    pub fn get_value(&self) -> Result<T>
    where
        T: Clone,
    {
        self.with_value(T::clone)
    }

    /// Borrow the current value for the duration of `f`.
    ///
    /// The resolved output is locked while `f` runs, so `f` must not touch
    /// the same output.
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let output = self.core.connected_output()?;
        output.with_resolved(|value| value.as_ref().map(f).ok_or(Error::ValueUndefined))
    }

    /// Whether [`get_value`](Self::get_value) would succeed.
    pub fn value_defined(&self) -> bool {
        self.core.is_defined()
    }

    /// Whether the input references an output.
    pub fn is_connected(&self) -> bool {
        self.core.output.lock().is_some()
    }

    /// Whether two handles refer to the same port.
    pub fn same_port(&self, other: &Input<T>) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    pub(crate) fn owner_name(&self) -> String {
        self.core
            .owner
            .upgrade()
            .map(|node| node.core().name().to_owned())
            .unwrap_or_else(|| "<dropped>".to_owned())
    }
}

impl<T> Clone for Input<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Input<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Input")
            .field("owner", &self.owner_name())
            .field("connected", &self.is_connected())
            .finish()
    }
}
