//! Ports
//!
//! Ports are the attachment points through which nodes exchange data.
//!
//! # Concepts
//!
//! ## Outputs
//!
//! An [`Output`] owns exactly one [`Value`] slot. Publishing a value with
//! [`Output::set_value`] synchronously triggers every node whose inputs
//! resolve to that output, directly or through a delegation chain. An output
//! may instead *delegate* to another output, in which case readers see the
//! target's value and the delegating output's own slot is ignored.
//!
//! ## Inputs
//!
//! An [`Input`] references at most one output. Reading it walks the
//! delegation chain to the terminal output and looks at that slot. No value is
//! ever copied into an input.
//!
//! ## Connections
//!
//! The free functions in [`connection`] create and remove edges. Fan-out is
//! unrestricted; fan-in is limited to one output per input.
//!
//! # Ownership
//!
//! Port handles are cheap to clone and all clones refer to the same port. The
//! node that created a port owns it: when the node is dropped, every port it
//! created is disconnected and undelegated. Delegation edges are weak, so a
//! delegating output never keeps its target alive.

mod value;
mod output;
mod input;
pub mod connection;

pub use value::Value;
pub use output::Output;
pub use input::Input;
pub use connection::{connect, disconnect, disconnect_output, force_connect, reconnect};

pub(crate) use input::InputCore;
pub(crate) use output::OutputCore;

/// Type-erased view of an input, used by the owning node.
pub(crate) trait AbstractInput: Send + Sync {
    /// Whether the input currently resolves to a defined value.
    fn is_defined(&self) -> bool;

    /// Disconnect the input. Called when the owning node is dropped.
    fn release(&self);
}

/// Type-erased view of an output, used by the owning node.
pub(crate) trait AbstractOutput: Send + Sync {
    /// Mark the output's own slot undefined without notifying anyone.
    fn invalidate(&self);

    /// Detach all inputs and delegation edges. Called when the owning node is dropped.
    fn release(&self);
}
