//! Ligament Core
//!
//! This crate provides the dataflow execution engine underneath a real-time
//! manipulator control stack. Every operator program (calibration,
//! teach-and-play, teleoperation) is a small graph of nodes wired together
//! and driven by a clock. This crate implements:
//!
//! - Typed ports with a single authoritative value per output
//! - The connection protocol (fan-out allowed, fan-in forbidden)
//! - Synchronous push propagation with cycle detection
//! - Manual and periodic hard real-time execution managers
//! - A supervisory controller that switches control sources live
//!
//! Kinematics, dynamics, bus I/O and trajectory math are ordinary leaf nodes
//! built on top of this crate.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `port`: Values, inputs, outputs, delegation, and connections
//! - `system`: The `System` trait, nodes, and push propagation
//! - `execution`: Execution managers, hard/soft mode, loop statistics
//! - `supervisory`: Exclusive switching of control sources onto a sink
//! - `systems`: Small leaf nodes (constant, gain, summer, callback)
//!
//! # Example
//!
//! ```rust,ignore
//! use ligament_core::execution::{ExecutionManager, ManualExecutionManager};
//! use ligament_core::port::connect;
//! use ligament_core::system::Node;
//! use ligament_core::systems::{Constant, Gain};
//!
//! let reference = Node::new("reference", |ports| Constant::new(ports, [38.0; 5]));
//! let kp = Node::new("kp", |ports| Gain::new(ports, [38.0; 5]));
//! connect(&reference.lock().output.clone(), &kp.lock().input.clone())?;
//!
//! let mut manager = ManualExecutionManager::new();
//! manager.start_managing(&reference)?;
//! manager.run_execution_cycle()?;
//! // kp's output is now [1444.0; 5]
//! ```

pub mod error;
pub mod execution;
pub mod port;
pub mod supervisory;
pub mod system;
pub mod systems;

pub use error::{Error, Result};
pub use execution::{ExecutionManager, ManualExecutionManager, RealTimeExecutionManager};
pub use port::{Input, Output, Value};
pub use supervisory::{Controllable, ControllableId, SupervisoryController};
pub use system::{Node, NodeBuilder, Ports, System};
