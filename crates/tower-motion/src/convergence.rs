//! Settle and stall detection shared by every chassis controller.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::control_loop::MoveOutcome;
use crate::error::MotionError;

/// When a control loop is allowed to stop.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitPolicy {
    /// Loop period in milliseconds.
    pub period_ms: u64,
    /// Errors with magnitude at or below this count as "zero" (controller units).
    pub tolerance: f64,
    /// Settled once the near-zero counter exceeds this many ticks.
    pub settle_ticks: u32,
    /// Stalled once the rounded error has not changed for this many ticks.
    pub stall_ticks: u32,
    /// Hard wall-clock bound for the whole move.
    pub timeout_ms: Option<u64>,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            period_ms: 20,
            tolerance: 3.0,
            settle_ticks: 15,
            stall_ticks: 20,
            timeout_ms: None,
        }
    }
}

impl ExitPolicy {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), MotionError> {
        if self.period_ms == 0 {
            return Err(MotionError::InvalidPeriod("must be at least 1 ms"));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(MotionError::InvalidTolerance("must be finite and non-negative"));
        }
        if self.stall_ticks == 0 {
            return Err(MotionError::InvalidTolerance("stall window must be at least one tick"));
        }
        Ok(())
    }
}

/// Tick counters deciding when a loop has converged or stopped making progress.
///
/// The error is rounded to whole units each tick. While the rounded value is
/// unchanged the same-error counter grows, and the near-zero counter grows as
/// well when the error is within tolerance. Any change resets both.
#[derive(Debug, Clone)]
pub struct ConvergenceMonitor {
    tolerance: f64,
    settle_ticks: u32,
    stall_ticks: u32,
    last_rounded: Option<f64>,
    same_error_ticks: u32,
    near_zero_ticks: u32,
}

impl ConvergenceMonitor {
    pub fn new(policy: &ExitPolicy) -> Self {
        Self {
            tolerance: policy.tolerance,
            settle_ticks: policy.settle_ticks,
            stall_ticks: policy.stall_ticks,
            last_rounded: None,
            same_error_ticks: 0,
            near_zero_ticks: 0,
        }
    }

    /// Feeds one tick's error and reports whether the loop should exit.
    pub fn observe(&mut self, error: f64) -> Option<MoveOutcome> {
        let rounded = error.abs().round();
        if self.last_rounded == Some(rounded) {
            self.same_error_ticks += 1;
            if error.abs() <= self.tolerance {
                self.near_zero_ticks += 1;
            }
        } else {
            self.same_error_ticks = 0;
            self.near_zero_ticks = 0;
        }
        self.last_rounded = Some(rounded);

        if self.near_zero_ticks > self.settle_ticks {
            Some(MoveOutcome::Settled)
        } else if self.same_error_ticks >= self.stall_ticks {
            Some(MoveOutcome::Stalled)
        } else {
            None
        }
    }

    pub fn same_error_ticks(&self) -> u32 {
        self.same_error_ticks
    }

    pub fn near_zero_ticks(&self) -> u32 {
        self.near_zero_ticks
    }
}
