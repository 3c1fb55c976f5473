//! Wall-clock budget for one invocation

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use mcpscout_config::BudgetConfig;

/// Asked at every suspension point whether work must stop now
pub trait BudgetGuard: Send + Sync {
    fn should_stop(&self) -> bool;

    /// Wall-clock time left before the guard trips, if it is time based
    fn time_left(&self) -> Option<Duration> {
        None
    }
}

/// True iff `now - start > ceiling - margin`
///
/// A margin at or above the ceiling stops immediately.
#[must_use]
pub fn is_time_up(start: Instant, ceiling: Duration, margin: Duration, now: Instant) -> bool {
    now.saturating_duration_since(start) > ceiling.saturating_sub(margin)
}

/// Stops once the elapsed time leaves less than `margin` of `ceiling`
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    start: Instant,
    ceiling: Duration,
    margin: Duration,
}

impl TimeBudget {
    #[must_use]
    pub const fn new(start: Instant, ceiling: Duration, margin: Duration) -> Self {
        Self {
            start,
            ceiling,
            margin,
        }
    }

    /// Budget starting now with the configured ceiling and margin
    #[must_use]
    pub fn from_config(budget: &BudgetConfig) -> Self {
        Self::new(
            Instant::now(),
            Duration::from_secs(budget.max_runtime_secs),
            Duration::from_secs(budget.safety_margin_secs),
        )
    }

    #[must_use]
    pub fn is_time_up_at(&self, now: Instant) -> bool {
        is_time_up(self.start, self.ceiling, self.margin, now)
    }

    /// Time left before the guard trips
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.ceiling
            .saturating_sub(self.margin)
            .saturating_sub(self.start.elapsed())
    }
}

impl BudgetGuard for TimeBudget {
    fn should_stop(&self) -> bool {
        self.is_time_up_at(Instant::now())
    }

    fn time_left(&self) -> Option<Duration> {
        Some(self.remaining())
    }
}

/// Never stops
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl BudgetGuard for Unlimited {
    fn should_stop(&self) -> bool {
        false
    }
}

/// Allows exactly `n` checks to pass, then stops on every later check.
///
/// Makes suspension points deterministic in tests.
#[derive(Debug)]
pub struct StopAfter {
    remaining: AtomicU32,
}

impl StopAfter {
    #[must_use]
    pub const fn new(checks: u32) -> Self {
        Self {
            remaining: AtomicU32::new(checks),
        }
    }
}

impl BudgetGuard for StopAfter {
    fn should_stop(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }
}
