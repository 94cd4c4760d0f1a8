//! Control-Loop Statistics
//!
//! Timing figures gathered by a real-time clock thread, one sample per tick.

use std::time::Duration;

use serde::Serialize;
use tracing::info;

/// Execution-time statistics of a periodic control loop.
///
/// All durations are in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LoopStats {
    /// Nominal period of the loop.
    pub period_us: u64,
    /// Ticks executed.
    pub cycles: u64,
    /// Shortest tick.
    pub min_us: u64,
    /// Longest tick.
    pub max_us: u64,
    /// Sum of tick durations, for the mean.
    pub sum_us: u64,
    /// Sum of squared tick durations, for the standard deviation.
    pub sum_sq_us: f64,
    /// Ticks that took longer than one period.
    pub overruns: u64,
    /// Wake-ups that came more than one full period after their deadline.
    pub missed_release_points: u64,
}

impl LoopStats {
    pub fn new(period: Duration) -> Self {
        Self {
            period_us: duration_us(period),
            ..Self::default()
        }
    }

    /// Record the execution time of one tick.
    pub fn record(&mut self, elapsed: Duration) {
        let us = duration_us(elapsed);
        if self.cycles == 0 || us < self.min_us {
            self.min_us = us;
        }
        self.max_us = self.max_us.max(us);
        self.cycles += 1;
        self.sum_us += us;
        self.sum_sq_us += (us as f64) * (us as f64);
        if us > self.period_us {
            self.overruns += 1;
        }
    }

    pub fn mean_us(&self) -> f64 {
        if self.cycles == 0 {
            return 0.0;
        }
        self.sum_us as f64 / self.cycles as f64
    }

    /// Population standard deviation of the tick duration.
    pub fn stdev_us(&self) -> f64 {
        if self.cycles == 0 {
            return 0.0;
        }
        let mean = self.mean_us();
        let variance = self.sum_sq_us / self.cycles as f64 - mean * mean;
        variance.max(0.0).sqrt()
    }

    /// Emit a summary at `info` level.
    pub fn log(&self, manager: &str) {
        info!(
            manager,
            cycles = self.cycles,
            period_us = self.period_us,
            min_us = self.min_us,
            mean_us = self.mean_us(),
            max_us = self.max_us,
            stdev_us = self.stdev_us(),
            overruns = self.overruns,
            missed_release_points = self.missed_release_points,
            "control loop statistics"
        );
    }
}

fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stats_are_zero() {
        let stats = LoopStats::new(Duration::from_millis(2));
        assert_eq!(stats.period_us, 2000);
        assert_eq!(stats.mean_us(), 0.0);
        assert_eq!(stats.stdev_us(), 0.0);
    }

    #[test]
    fn records_min_max_mean_and_overruns() {
        let mut stats = LoopStats::new(Duration::from_micros(100));
        stats.record(Duration::from_micros(40));
        stats.record(Duration::from_micros(60));
        stats.record(Duration::from_micros(150));

        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.min_us, 40);
        assert_eq!(stats.max_us, 150);
        assert!((stats.mean_us() - 250.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.overruns, 1);
    }

    #[test]
    fn constant_ticks_have_no_spread() {
        let mut stats = LoopStats::new(Duration::from_millis(1));
        for _ in 0..10 {
            stats.record(Duration::from_micros(25));
        }
        assert!(stats.stdev_us().abs() < 1e-9);
    }

    #[test]
    fn serializes_to_json() {
        let mut stats = LoopStats::new(Duration::from_millis(1));
        stats.record(Duration::from_micros(10));
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["cycles"], 1);
        assert_eq!(json["period_us"], 1000);
    }
}
