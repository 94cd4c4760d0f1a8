//! Execution Managers
//!
//! An execution manager owns a set of nodes and decides when they run.
//!
//! - [`ManualExecutionManager`] ticks when the caller says so.
//! - [`RealTimeExecutionManager`] ticks on its own clock thread at a fixed
//!   period, in hard real-time [`mode`].
//!
//! Both implement [`ExecutionManager`], which carries registration, the
//! traversal mutex, and single-node updates. Managers are created and passed
//! around explicitly; there is no process-wide default manager.

mod config;
mod manager;
mod manual;
pub mod mode;
mod real_time;
mod stats;

pub use config::{ManagerConfig, MAX_THREAD_PRIORITY};
pub use manager::{ExecutionManager, ManagerRef, TraversalGuard};
pub use manual::ManualExecutionManager;
pub use mode::{RtMode, SoftModeGuard};
pub use real_time::RealTimeExecutionManager;
pub use stats::LoopStats;

pub(crate) use manager::{ManagerShared, OwnedTraversalGuard};
