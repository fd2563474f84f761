//! Turn in place.

use tracing::info;

use tower_kinematics::{Pose, heading_error};

use super::{MotionController, MoveOptions, RotationTuning, approach_heading};
use crate::context::RunContext;
use crate::control_loop::{MoveReport, TickOutput, drive_loop};
use crate::pid::Pid;

/// What a rotation should end up facing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RotationTarget {
    /// A field heading in degrees.
    Heading(f64),
    /// A field point; the heading is resolved once, when the turn starts.
    Facing { x: f64, y: f64 },
}

impl RotationTarget {
    /// Resolves the target heading from the starting pose. A point that
    /// coincides with the robot resolves to the current heading.
    pub fn resolve(&self, start: &Pose, options: &MoveOptions) -> f64 {
        match *self {
            RotationTarget::Heading(heading) => tower_kinematics::normalize_degrees(heading),
            RotationTarget::Facing { x, y } => {
                approach_heading(start, x, y, options).unwrap_or(start.heading)
            }
        }
    }
}

/// Per-tick law: PID on wrapped heading error, equal and opposite wheel outputs.
#[derive(Debug, Clone)]
pub struct RotationLaw {
    target: f64,
    max_output: f64,
    pid: Pid,
}

impl RotationLaw {
    pub fn new(target: f64, max_output: f64, tuning: &RotationTuning) -> Self {
        Self {
            target,
            max_output,
            pid: Pid::new(tuning.heading),
        }
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn step(&mut self, heading: f64) -> TickOutput {
        let error = heading_error(self.target, heading);
        let output = self.pid.update(error).clamp(-self.max_output, self.max_output);
        TickOutput {
            error,
            left: -output,
            right: output,
        }
    }
}

impl MotionController {
    /// Turns in place until the robot faces `target`.
    pub async fn rotate_to(&self, target: RotationTarget, options: MoveOptions, ctx: &RunContext) -> MoveReport {
        let start = self.current_pose();
        let tuning = &self.tuning.rotation;
        let mut law = RotationLaw::new(target.resolve(&start, &options), options.cap(tuning.max_output), tuning);
        info!(%start, target = law.target(), "Rotating.");
        drive_loop(
            "rotate",
            self.drivetrain.as_ref(),
            ctx,
            &tuning.exit,
            options.verbose,
            || law.step(self.fused_heading()),
        )
        .await
    }
}
