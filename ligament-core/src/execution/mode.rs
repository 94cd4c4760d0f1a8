//! Hard/Soft Real-Time Mode
//!
//! Every thread has a scheduling mode. A real-time clock thread runs in
//! [`RtMode::Hard`], where blocking on the operating system is forbidden;
//! every other thread runs in [`RtMode::Soft`].
//!
//! Leaf code that is about to block (socket I/O, file I/O, sleeping on a
//! condition) calls [`ensure_may_block`] first. Nodes that need to block
//! declare it with [`NodeBuilder::may_block`](crate::system::NodeBuilder::may_block)
//! and the engine wraps their `operate()` in a [`SoftModeGuard`].

use std::cell::Cell;
use std::marker::PhantomData;

use crate::error::{Error, Result};

/// Scheduling posture of the current thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RtMode {
    /// Blocking OS calls are forbidden.
    Hard,
    /// Blocking OS calls are allowed.
    #[default]
    Soft,
}

thread_local! {
    static MODE: Cell<RtMode> = const { Cell::new(RtMode::Soft) };
}

/// The current thread's mode.
pub fn current() -> RtMode {
    MODE.with(Cell::get)
}

/// Fail with [`Error::BlockingInHardMode`] if the current thread is in hard mode.
pub fn ensure_may_block() -> Result<()> {
    match current() {
        RtMode::Hard => Err(Error::BlockingInHardMode),
        RtMode::Soft => Ok(()),
    }
}

fn replace(mode: RtMode) -> RtMode {
    MODE.with(|cell| cell.replace(mode))
}

/// Drops the current thread to soft mode until the guard is dropped.
///
/// The previous mode is restored on drop, also when unwinding. Guards are
/// tied to the thread that created them.
#[must_use = "the thread returns to its previous mode when the guard is dropped"]
pub struct SoftModeGuard {
    previous: RtMode,
    _not_send: PhantomData<*const ()>,
}

impl SoftModeGuard {
    pub fn enter() -> Self {
        Self {
            previous: replace(RtMode::Soft),
            _not_send: PhantomData,
        }
    }
}

impl Drop for SoftModeGuard {
    fn drop(&mut self) {
        replace(self.previous);
    }
}

/// Puts the current thread in hard mode. Held by the clock thread.
pub(crate) struct HardModeGuard {
    previous: RtMode,
    _not_send: PhantomData<*const ()>,
}

impl HardModeGuard {
    pub(crate) fn enter() -> Self {
        Self {
            previous: replace(RtMode::Hard),
            _not_send: PhantomData,
        }
    }
}

impl Drop for HardModeGuard {
    fn drop(&mut self) {
        replace(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threads_start_soft() {
        assert_eq!(current(), RtMode::Soft);
        assert!(ensure_may_block().is_ok());
    }

    #[test]
    fn guards_nest_and_restore() {
        let hard = HardModeGuard::enter();
        assert_eq!(current(), RtMode::Hard);
        assert!(matches!(ensure_may_block(), Err(Error::BlockingInHardMode)));

        {
            let _soft = SoftModeGuard::enter();
            assert_eq!(current(), RtMode::Soft);
            assert!(ensure_may_block().is_ok());
        }
        assert_eq!(current(), RtMode::Hard);

        drop(hard);
        assert_eq!(current(), RtMode::Soft);
    }
}
