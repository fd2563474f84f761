//! Run context handed to every control loop.
//!
//! Replaces a process-wide "are we in autonomous" flag: each loop polls the
//! context it was given once per tick and exits when the run is disabled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Which competition period a loop runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Autonomous period: motion controllers own the chassis.
    Autonomous,
    /// Driver period: the operator-control loop owns the chassis.
    OperatorControl,
}

/// Cloneable handle on one run's enable flag.
#[derive(Debug, Clone)]
pub struct RunContext {
    enabled: Arc<AtomicBool>,
    mode: RunMode,
}

impl RunContext {
    /// Creates an enabled context.
    pub fn new(mode: RunMode) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
            mode,
        }
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Disables the run. Every loop holding a clone of this context zeroes its
    /// outputs and returns on its next tick.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }
}
