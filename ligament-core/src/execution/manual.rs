//! Manual Execution Manager
//!
//! Ticks only when asked. Used by tests and by offline tooling that steps a
//! graph at its own pace.

use std::time::Duration;

use tracing::trace;

use super::manager::{ExecutionManager, ManagerRef};
use crate::error::Result;

/// An execution manager driven by explicit calls to
/// [`run_execution_cycle`](Self::run_execution_cycle).
///
/// Dropping the manager detaches every node it still manages.
///
/// # Example
///
/// ```rust,ignore
/// let manager = ManualExecutionManager::new();
/// manager.start_managing(&controller)?;
/// for _ in 0..100 {
///     manager.run_execution_cycle()?;
/// }
/// ```
pub struct ManualExecutionManager {
    handle: ManagerRef,
    cycles: u64,
}

impl ManualExecutionManager {
    /// A manager with a zero period.
    pub fn new() -> Self {
        Self::with_period(Duration::ZERO)
    }

    /// A manager reporting `period` to the nodes it drives.
    pub fn with_period(period: Duration) -> Self {
        Self {
            handle: ManagerRef::new(period),
            cycles: 0,
        }
    }

    /// Trigger every eager managed node once, in registration order.
    ///
    /// The first error raised by a node aborts the cycle and is returned.
    pub fn run_execution_cycle(&mut self) -> Result<()> {
        self.cycles += 1;
        trace!(manager = self.handle.id(), cycle = self.cycles, "execution cycle");
        self.handle.execute_cycle()
    }

    /// Number of cycles run so far.
    pub fn cycle_count(&self) -> u64 {
        self.cycles
    }
}

impl Default for ManualExecutionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionManager for ManualExecutionManager {
    fn handle(&self) -> &ManagerRef {
        &self.handle
    }
}

impl Drop for ManualExecutionManager {
    fn drop(&mut self) {
        self.handle.detach_all();
    }
}
