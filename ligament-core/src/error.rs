//! Engine Errors
//!
//! Every fallible operation in the engine returns [`Result`]. The variants
//! fall into four groups:
//!
//! - Connection errors (`AlreadyConnected`, `NotConnected`) are programming
//!   errors detected at the call that violates the wiring invariant.
//! - Value errors (`NotConnected`, `ValueUndefined`) come out of
//!   [`Input::get_value`](crate::port::Input::get_value) and propagate out of
//!   the reading node's `operate()`.
//! - Supervisory errors come out of
//!   [`SupervisoryController::track_reference_signal`](crate::supervisory::SupervisoryController::track_reference_signal).
//! - Scheduling errors (`CycleDetected`, `BlockingInHardMode`) abort the
//!   current tick. A real-time manager records them and stops its clock.

use thiserror::Error;

use crate::supervisory::ControllableId;

/// Errors raised by ports, connections, managers, and the supervisory controller.
#[derive(Debug, Error)]
pub enum Error {
    /// The input has no output, or the operation needs a connection that is not there.
    #[error("port is not connected")]
    NotConnected,

    /// The input already references an output.
    #[error("input is already connected")]
    AlreadyConnected,

    /// The input resolves to an output whose value is undefined.
    #[error("value is undefined")]
    ValueUndefined,

    /// Push propagation re-entered a node that is still executing, or a
    /// delegation would close a loop.
    #[error("cycle detected at node '{node}'")]
    CycleDetected { node: String },

    /// The node is already managed by an execution manager.
    #[error("node '{node}' is already execution managed")]
    AlreadyManaged { node: String },

    /// The node is not managed by this execution manager.
    #[error("node '{node}' is not managed by this execution manager")]
    NotManaged { node: String },

    /// Zero or several registered controllables accept the reference signal.
    #[error("expected exactly one matching controllable, found {candidates}")]
    NoMatchingControllable { candidates: usize },

    /// The id does not name a registered controllable.
    #[error("no controllable registered as {0:?}")]
    UnknownControllable(ControllableId),

    /// The named controllable expects a different reference type.
    #[error("controllable expects reference type {expected}, got {found}")]
    ReferenceTypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A blocking call was attempted while the thread runs in hard real-time mode.
    #[error("blocking call attempted in hard real-time mode")]
    BlockingInHardMode,

    /// The real-time manager stopped on an error that has not been cleared.
    #[error("execution manager is in an error state: {0}")]
    ManagerInErrorState(String),

    /// The clock thread could not be spawned.
    #[error("failed to spawn clock thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;
