//! The closed-loop skeleton shared by every chassis controller.
//!
//! Each tick: wait for the period, poll the [`RunContext`], ask the
//! controller's law for an error and a pair of wheel outputs, command the
//! chassis, then feed the error to a [`ConvergenceMonitor`]. The chassis is
//! always stopped before the loop returns.

use std::fmt;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::convergence::{ConvergenceMonitor, ExitPolicy};
use crate::hal::Drivetrain;

/// Why a control loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Error stayed within tolerance for the settle window.
    Settled,
    /// Error stopped changing outside tolerance.
    Stalled,
    /// The policy's wall-clock bound elapsed.
    TimedOut,
    /// The run context was disabled.
    Cancelled,
}

impl fmt::Display for MoveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MoveOutcome::Settled => "settled",
            MoveOutcome::Stalled => "stalled",
            MoveOutcome::TimedOut => "timed out",
            MoveOutcome::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Result of one controller invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveReport {
    pub outcome: MoveOutcome,
    /// Control ticks executed.
    pub ticks: u32,
    /// Error on the final tick, in the controller's units.
    pub final_error: f64,
    pub elapsed: Duration,
}

impl MoveReport {
    /// The target was reached and held.
    pub fn reached(&self) -> bool {
        self.outcome == MoveOutcome::Settled
    }

    /// Legacy view: the move ran to its own end, whether it converged or gave up.
    pub fn completed(&self) -> bool {
        self.outcome != MoveOutcome::Cancelled
    }
}

/// One tick of a control law.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutput {
    /// Error used for convergence detection.
    pub error: f64,
    pub left: f64,
    pub right: f64,
}

/// Runs `law` every `policy.period()` until the monitor, the timeout or the
/// run context ends the move.
pub async fn drive_loop<D, F>(
    label: &'static str,
    drivetrain: &D,
    ctx: &RunContext,
    policy: &ExitPolicy,
    verbose: bool,
    mut law: F,
) -> MoveReport
where
    D: Drivetrain + ?Sized,
    F: FnMut() -> TickOutput,
{
    let start = Instant::now();
    let mut ticker = time::interval(policy.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut monitor = ConvergenceMonitor::new(policy);
    let mut ticks = 0;
    let mut final_error = 0.0;

    let outcome = loop {
        ticker.tick().await;
        if !ctx.is_enabled() {
            break MoveOutcome::Cancelled;
        }

        let out = law();
        ticks += 1;
        final_error = out.error;
        drivetrain.tank(out.left, out.right);

        if verbose {
            debug!(label, tick = ticks, error = out.error, left = out.left, right = out.right, "control tick");
        }

        if let Some(outcome) = monitor.observe(out.error) {
            break outcome;
        }
        if let Some(timeout) = policy.timeout() {
            if start.elapsed() >= timeout {
                break MoveOutcome::TimedOut;
            }
        }
    };

    drivetrain.stop();
    let report = MoveReport {
        outcome,
        ticks,
        final_error,
        elapsed: start.elapsed(),
    };
    match outcome {
        MoveOutcome::Settled | MoveOutcome::Cancelled => info!(
            label,
            outcome = %outcome,
            error = final_error,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "task complete"
        ),
        MoveOutcome::Stalled | MoveOutcome::TimedOut => warn!(
            label,
            outcome = %outcome,
            error = final_error,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "task ended without converging"
        ),
    }
    report
}
