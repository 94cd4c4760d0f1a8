//! Real-Time Execution Manager
//!
//! Drives its managed nodes from a dedicated clock thread at a fixed period.
//!
//! # Clock Loop
//!
//! 1. Optionally raise the thread's OS priority (`realtime` feature).
//! 2. Enter hard real-time mode for the lifetime of the thread.
//! 3. Every period: run one tick under the traversal mutex, record its
//!    duration, then sleep until the next absolute deadline. Deadlines are
//!    computed from the loop start, so a slow tick does not shift every
//!    later one.
//! 4. A tick that returns an error stops the loop. The error is logged,
//!    recorded, and handed to the error callback.
//!
//! [`stop`](RealTimeExecutionManager::stop) asks the loop to exit and joins
//! the thread. A tick in progress always runs to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use spin_sleep::SpinSleeper;
use tracing::{error, info, warn};

use super::config::ManagerConfig;
use super::manager::{ExecutionManager, ManagerRef};
use super::mode::HardModeGuard;
use super::stats::LoopStats;
use crate::error::{Error, Result};

type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// State shared between the manager and its clock thread.
struct ClockState {
    stop_requested: AtomicBool,
    started: AtomicBool,
    running: AtomicBool,
    error: Mutex<Option<String>>,
    on_error: Mutex<Option<ErrorCallback>>,
    stats: Mutex<LoopStats>,
}

/// An execution manager ticking its nodes periodically on its own thread.
///
/// Dropping the manager stops the clock and detaches every managed node.
///
/// # Example
///
/// ```rust,ignore
/// let mut manager = RealTimeExecutionManager::new(Duration::from_millis(2), 80)?;
/// manager.start_managing(&wam)?;
/// manager.start()?;
/// // ...
/// manager.stop();
/// ```
pub struct RealTimeExecutionManager {
    handle: ManagerRef,
    priority: u8,
    state: Arc<ClockState>,
    thread: Option<JoinHandle<()>>,
}

impl RealTimeExecutionManager {
    /// Create a stopped manager ticking every `period`.
    ///
    /// `priority` is the OS priority (1-99) requested for the clock thread,
    /// or 0 to leave it unchanged. It only takes effect with the `realtime`
    /// feature.
    pub fn new(period: Duration, priority: u8) -> Result<Self> {
        if period.is_zero() {
            return Err(Error::InvalidConfig(
                "real-time period must be greater than zero".to_owned(),
            ));
        }
        ManagerConfig {
            control_loop_period: period.as_secs_f64(),
            thread_priority: priority,
        }
        .validate()?;

        Ok(Self {
            handle: ManagerRef::new(period),
            priority,
            state: Arc::new(ClockState {
                stop_requested: AtomicBool::new(false),
                started: AtomicBool::new(false),
                running: AtomicBool::new(false),
                error: Mutex::new(None),
                on_error: Mutex::new(None),
                stats: Mutex::new(LoopStats::new(period)),
            }),
            thread: None,
        })
    }

    /// Create a stopped manager from a validated configuration.
    pub fn from_config(config: &ManagerConfig) -> Result<Self> {
        Self::new(config.period()?, config.thread_priority)
    }

    /// Requested OS priority of the clock thread.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Start the clock thread and wait until it is ticking.
    ///
    /// Does nothing if the clock is already running. Fails with
    /// [`Error::ManagerInErrorState`] while a previous error is recorded.
    pub fn start(&mut self) -> Result<()> {
        if let Some(message) = self.state.error.lock().clone() {
            return Err(Error::ManagerInErrorState(message));
        }
        if self.is_running() {
            return Ok(());
        }
        self.join_clock();

        self.state.stop_requested.store(false, Ordering::Release);
        self.state.started.store(false, Ordering::Release);
        *self.state.stats.lock() = LoopStats::new(self.period());

        let handle = self.handle.clone();
        let state = Arc::clone(&self.state);
        let priority = self.priority;
        let thread = std::thread::Builder::new()
            .name(format!("ligament-clock-{}", self.handle.id()))
            .spawn(move || clock_loop(&handle, &state, priority))?;

        let sleeper = SpinSleeper::default();
        let poll = (self.period() / 10).max(Duration::from_micros(10));
        while !self.state.started.load(Ordering::Acquire) && !thread.is_finished() {
            sleeper.sleep(poll);
        }
        self.thread = Some(thread);

        info!(
            manager = self.handle.id(),
            period_us = self.period().as_micros() as u64,
            priority = self.priority,
            "clock started"
        );
        Ok(())
    }

    /// Ask the clock thread to exit and wait for it.
    ///
    /// The tick in progress, if any, completes first. Does nothing if the
    /// clock is not running.
    pub fn stop(&mut self) {
        if self.thread.is_none() {
            return;
        }
        self.state.stop_requested.store(true, Ordering::Release);
        self.join_clock();
        info!(manager = self.handle.id(), "clock stopped");
    }

    fn join_clock(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(manager = self.handle.id(), "clock thread panicked");
            }
        }
    }

    /// Whether the clock thread is ticking.
    pub fn is_running(&self) -> bool {
        self.thread.is_some() && self.state.running.load(Ordering::Acquire)
    }

    /// The error that stopped the clock, if any.
    pub fn error(&self) -> Option<String> {
        self.state.error.lock().clone()
    }

    /// Forget the recorded error so the clock can be started again.
    pub fn clear_error(&self) {
        *self.state.error.lock() = None;
    }

    /// Call `callback` on the clock thread when a tick fails.
    ///
    /// The callback runs in hard real-time mode and must not block.
    pub fn set_error_callback(&self, callback: impl Fn(&Error) + Send + Sync + 'static) {
        *self.state.on_error.lock() = Some(Arc::new(callback));
    }

    /// Remove the callback installed by [`Self::set_error_callback`].
    pub fn clear_error_callback(&self) {
        *self.state.on_error.lock() = None;
    }

    /// Timing statistics of the current or most recent run.
    pub fn stats(&self) -> LoopStats {
        *self.state.stats.lock()
    }
}

impl ExecutionManager for RealTimeExecutionManager {
    fn handle(&self) -> &ManagerRef {
        &self.handle
    }
}

impl Drop for RealTimeExecutionManager {
    fn drop(&mut self) {
        self.stop();
        self.handle.detach_all();
    }
}

fn clock_loop(handle: &ManagerRef, state: &ClockState, priority: u8) {
    raise_priority(priority);
    let _hard = HardModeGuard::enter();

    let period = handle.period();
    let sleeper = SpinSleeper::default();
    let mut stats = LoopStats::new(period);

    state.running.store(true, Ordering::Release);
    state.started.store(true, Ordering::Release);

    let mut deadline = Instant::now() + period;
    while !state.stop_requested.load(Ordering::Acquire) {
        let began = Instant::now();
        if let Err(err) = handle.execute_cycle() {
            error!(manager = handle.id(), error = %err, "tick failed, stopping clock");
            *state.error.lock() = Some(err.to_string());
            let callback = state.on_error.lock().clone();
            if let Some(callback) = callback {
                callback(&err);
            }
            break;
        }
        stats.record(began.elapsed());
        *state.stats.lock() = stats;

        let now = Instant::now();
        if now < deadline {
            sleeper.sleep(deadline - now);
        } else if now - deadline > period {
            // Too far behind to catch up; skip to the next release point.
            stats.missed_release_points += 1;
            *state.stats.lock() = stats;
            deadline = now;
        }
        deadline += period;
    }

    state.running.store(false, Ordering::Release);
    *state.stats.lock() = stats;
    stats.log(&format!("ligament-clock-{}", handle.id()));
}

#[cfg(feature = "realtime")]
fn raise_priority(priority: u8) {
    use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};

    if priority == 0 {
        return;
    }
    let result = ThreadPriorityValue::try_from(priority)
        .map_err(|err| format!("{err:?}"))
        .and_then(|value| {
            set_current_thread_priority(ThreadPriority::Crossplatform(value))
                .map_err(|err| format!("{err:?}"))
        });
    if let Err(err) = result {
        warn!(priority, error = %err, "failed to raise clock thread priority");
    }
}

#[cfg(not(feature = "realtime"))]
fn raise_priority(priority: u8) {
    if priority != 0 {
        warn!(
            priority,
            "built without the `realtime` feature; clock thread priority unchanged"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::mode;
    use crate::port::Output;
    use crate::system::{Node, NodeBuilder, Ports, System};
    use std::sync::atomic::AtomicUsize;

    struct Ticker {
        output: Output<u64>,
        count: u64,
    }

    impl System for Ticker {
        fn operate(&mut self) -> Result<()> {
            self.count += 1;
            self.output.set_value(self.count)
        }
    }

    fn ticker() -> Node<Ticker> {
        Node::new("ticker", |ports: &Ports| Ticker {
            output: ports.output(),
            count: 0,
        })
    }

    /// Fails on its third tick.
    struct FailsLater {
        count: u32,
    }

    impl System for FailsLater {
        fn operate(&mut self) -> Result<()> {
            self.count += 1;
            if self.count >= 3 {
                return Err(Error::ValueUndefined);
            }
            Ok(())
        }
    }

    /// Attempts a blocking call every tick.
    struct Blocking {
        calls: u32,
    }

    impl System for Blocking {
        fn operate(&mut self) -> Result<()> {
            mode::ensure_may_block()?;
            self.calls += 1;
            Ok(())
        }
    }

    /// Sleeps through its third tick.
    struct StallsOnce {
        ticks: u32,
        stall: Duration,
    }

    impl System for StallsOnce {
        fn operate(&mut self) -> Result<()> {
            self.ticks += 1;
            if self.ticks == 3 {
                mode::ensure_may_block()?;
                std::thread::sleep(self.stall);
            }
            Ok(())
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    fn manager() -> RealTimeExecutionManager {
        RealTimeExecutionManager::new(Duration::from_millis(1), 0).unwrap()
    }

    #[test]
    fn zero_period_is_rejected() {
        assert!(matches!(
            RealTimeExecutionManager::new(Duration::ZERO, 0),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            RealTimeExecutionManager::new(Duration::from_millis(1), 200),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn from_config_uses_period_and_priority() {
        let config = ManagerConfig::from_json(r#"{"control_loop_period": 0.004}"#).unwrap();
        let manager = RealTimeExecutionManager::from_config(&config).unwrap();
        assert_eq!(manager.period(), Duration::from_millis(4));
        assert_eq!(manager.priority(), 0);
    }

    #[test]
    fn ticks_until_stopped() {
        let mut manager = manager();
        let node = ticker();
        manager.start_managing(&node).unwrap();

        manager.start().unwrap();
        assert!(manager.is_running());
        manager.start().unwrap();
        assert!(wait_until(|| node.lock().count >= 5));
        manager.stop();
        assert!(!manager.is_running());

        let count = node.lock().count;
        let stats = manager.stats();
        assert!(stats.cycles >= 5);
        assert!(stats.max_us >= stats.min_us);

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(node.lock().count, count);
        manager.stop();
    }

    #[test]
    fn tick_error_stops_the_clock() {
        let mut manager = manager();
        let reported = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reported);
        manager.set_error_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let node = Node::new("fails", |_: &Ports| FailsLater { count: 0 });
        manager.start_managing(&node).unwrap();
        manager.start().unwrap();

        assert!(wait_until(|| !manager.is_running()));
        assert!(manager.error().is_some());
        assert_eq!(reported.load(Ordering::SeqCst), 1);
        assert_eq!(node.lock().count, 3);

        assert!(matches!(
            manager.start(),
            Err(Error::ManagerInErrorState(_))
        ));
        manager.clear_error();
        manager.clear_error_callback();
        node.lock().count = 0;
        manager.start().unwrap();
        assert!(wait_until(|| manager.error().is_some()));
        assert_eq!(reported.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clock_thread_runs_in_hard_mode() {
        let mut manager = manager();
        let node = Node::new("blocking", |_: &Ports| Blocking { calls: 0 });
        manager.start_managing(&node).unwrap();
        manager.start().unwrap();

        assert!(wait_until(|| !manager.is_running()));
        assert_eq!(
            manager.error(),
            Some(Error::BlockingInHardMode.to_string())
        );
        assert_eq!(node.lock().calls, 0);
    }

    #[test]
    fn may_block_nodes_run_in_soft_mode() {
        let mut manager = manager();
        let node = NodeBuilder::new("blocking")
            .may_block(true)
            .build(|_: &Ports| Blocking { calls: 0 });
        manager.start_managing(&node).unwrap();
        manager.start().unwrap();

        assert!(wait_until(|| node.lock().calls >= 3));
        assert!(manager.is_running());
        assert!(manager.error().is_none());
    }

    #[test]
    fn late_tick_skips_to_the_next_release_point() {
        let mut manager = manager();
        let node = NodeBuilder::new("stalls")
            .may_block(true)
            .build(|_: &Ports| StallsOnce {
                ticks: 0,
                stall: Duration::from_millis(5),
            });
        manager.start_managing(&node).unwrap();
        manager.start().unwrap();

        assert!(wait_until(|| manager.stats().missed_release_points >= 1));
        let after_stall = node.lock().ticks;
        assert!(after_stall >= 3);
        assert!(wait_until(|| node.lock().ticks >= after_stall + 5));

        assert!(manager.is_running());
        assert!(manager.error().is_none());
        let stats = manager.stats();
        assert!(stats.overruns >= 1);
        assert!(stats.missed_release_points >= 1);
        assert!(stats.max_us >= 5_000);
        manager.stop();
    }

    #[test]
    fn dropping_stops_and_detaches() {
        let mut manager = manager();
        let node = ticker();
        manager.start_managing(&node).unwrap();
        manager.start().unwrap();

        drop(manager);
        assert!(!node.is_execution_managed());
        let count = node.lock().count;
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(node.lock().count, count);
    }
}
