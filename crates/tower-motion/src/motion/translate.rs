//! Point-to-point translation.

use tracing::info;

use tower_kinematics::{Pose, heading_error};

use super::{MotionController, MoveOptions, TranslationTuning, approach_heading};
use crate::blackboard;
use crate::context::RunContext;
use crate::control_loop::{MoveReport, TickOutput, drive_loop};
use crate::pid::{Pid, PidGains};

/// Per-tick control law for one translation.
///
/// The origin, the planned total distance and the heading to hold are fixed
/// when the law is created. Distance-to-go is always non-negative; the common
/// output flips sign once the robot has travelled further from the origin
/// than the planned distance, and again when driving in reverse.
#[derive(Debug, Clone)]
pub struct TranslationLaw {
    target: (f64, f64),
    origin: (f64, f64),
    total_distance: f64,
    heading: f64,
    backwards: bool,
    max_output: f64,
    overshot: bool,
    distance_gains: PidGains,
    distance_pid: Pid,
    heading_pid: Pid,
}

impl TranslationLaw {
    pub fn new(start: Pose, x: f64, y: f64, options: &MoveOptions, tuning: &TranslationTuning) -> Self {
        // a zero-length move holds the current heading
        let heading = approach_heading(&start, x, y, options).unwrap_or(start.heading);
        Self {
            target: (x, y),
            origin: (start.x, start.y),
            total_distance: start.distance_to(x, y),
            heading,
            backwards: options.backwards,
            max_output: options.cap(tuning.max_output),
            overshot: false,
            distance_gains: tuning.distance,
            distance_pid: Pid::new(tuning.distance),
            heading_pid: Pid::new(tuning.heading),
        }
    }

    /// Heading held for the whole move.
    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    pub fn step(&mut self, pose: Pose) -> TickOutput {
        let error = pose.distance_to(self.target.0, self.target.1);
        let travelled = Pose::new(self.origin.0, self.origin.1, 0.0).distance_to(pose.x, pose.y);

        let overshot = travelled > self.total_distance;
        if overshot != self.overshot {
            // integral and derivative history belong to one side of the target
            self.distance_pid = Pid::new(self.distance_gains);
            self.overshot = overshot;
        }

        let mut output = self
            .distance_pid
            .update(error)
            .clamp(-self.max_output, self.max_output);
        if overshot {
            output = -output;
        }
        if self.backwards {
            output = -output;
        }

        let correction = self
            .heading_pid
            .update(heading_error(self.heading, pose.heading))
            .clamp(-self.max_output, self.max_output);

        TickOutput {
            error,
            left: (output - correction).clamp(-self.max_output, self.max_output),
            right: (output + correction).clamp(-self.max_output, self.max_output),
        }
    }
}

impl MotionController {
    /// Drives to `(x, y)` along a straight line.
    pub async fn translate_to(&self, x: f64, y: f64, options: MoveOptions, ctx: &RunContext) -> MoveReport {
        self.translate_with(x, y, options, ctx, &self.tuning.translation).await
    }

    pub(super) async fn translate_with(
        &self,
        x: f64,
        y: f64,
        options: MoveOptions,
        ctx: &RunContext,
        tuning: &TranslationTuning,
    ) -> MoveReport {
        let start = self.current_pose();
        let mut law = TranslationLaw::new(start, x, y, &options, tuning);
        info!(
            %start,
            target_x = x,
            target_y = y,
            heading = law.heading(),
            distance = law.total_distance(),
            backwards = options.backwards,
            "Translating."
        );
        let bb = &self.blackboard;
        drive_loop(
            "translate",
            self.drivetrain.as_ref(),
            ctx,
            &tuning.exit,
            options.verbose,
            || law.step(blackboard::current_pose(bb)),
        )
        .await
    }
}
