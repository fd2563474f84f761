//! Pre-tuned relative moves on raw encoder ticks.
//!
//! Used for short, empirically measured movements where pose feedback is not
//! worth the overhead. Each wheel gets a proportional output on its own tick
//! error; the output cap ramps up by a fixed slew every tick.

use tracing::info;

use tower_kinematics::WheelTicks;

use super::{MotionController, MoveOptions, RelativeTuning};
use crate::context::RunContext;
use crate::control_loop::{MoveReport, TickOutput, drive_loop};

#[derive(Debug, Clone)]
pub struct RelativeLaw {
    target: WheelTicks,
    cap: f64,
    max_output: f64,
    straight: (f64, f64),
    turn: (f64, f64),
}

impl RelativeLaw {
    /// Targets are `left`/`right` ticks relative to `start`.
    pub fn new(start: WheelTicks, left: f64, right: f64, max_output: f64, tuning: &RelativeTuning) -> Self {
        Self {
            target: WheelTicks::new(start.left + left, start.right + right),
            cap: 0.0,
            max_output,
            straight: (tuning.straight_kp, tuning.straight_slew),
            turn: (tuning.turn_kp, tuning.turn_slew),
        }
    }

    pub fn target(&self) -> WheelTicks {
        self.target
    }

    /// Current output cap after slew.
    pub fn cap(&self) -> f64 {
        self.cap
    }

    pub fn step(&mut self, ticks: WheelTicks) -> TickOutput {
        let left_error = self.target.left - ticks.left;
        let right_error = self.target.right - ticks.right;

        // a wheel already on target agrees with the other one
        let turning = left_error * right_error < 0.0;
        let (kp, slew) = if turning { self.turn } else { self.straight };
        self.cap = (self.cap + slew).min(self.max_output);

        TickOutput {
            error: (left_error.abs() + right_error.abs()) / 2.0,
            left: (left_error * kp).clamp(-self.cap, self.cap),
            right: (right_error * kp).clamp(-self.cap, self.cap),
        }
    }
}

impl MotionController {
    /// Moves each wheel by the given number of encoder ticks.
    pub async fn relative_move(&self, left: f64, right: f64, options: MoveOptions, ctx: &RunContext) -> MoveReport {
        let tuning = &self.tuning.relative;
        let start = self.drivetrain.encoder_ticks();
        let mut law = RelativeLaw::new(start, left, right, options.cap(tuning.max_output), tuning);
        info!(%start, target = %law.target(), "Relative move.");
        let drivetrain = self.drivetrain.as_ref();
        drive_loop("relative", drivetrain, ctx, &tuning.exit, options.verbose, || {
            law.step(drivetrain.encoder_ticks())
        })
        .await
    }

    /// [`MotionController::relative_move`] with wheel travel in centimetres.
    pub async fn relative_move_distance(
        &self,
        left: f64,
        right: f64,
        options: MoveOptions,
        ctx: &RunContext,
    ) -> MoveReport {
        let left = self.kinematics.distance_to_ticks(left);
        let right = self.kinematics.distance_to_ticks(right);
        self.relative_move(left, right, options, ctx).await
    }
}
