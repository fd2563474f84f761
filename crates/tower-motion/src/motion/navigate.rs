//! Turn-then-drive navigation.

use tracing::{debug, info};

use tower_kinematics::heading_error;

use super::{MotionController, MoveOptions, RotationTarget, approach_heading};
use crate::context::RunContext;
use crate::control_loop::{MoveOutcome, MoveReport};

/// Outcome of both phases of a [`MotionController::navigate_to`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavigateReport {
    /// Present only when the heading error was large enough to turn first.
    pub rotation: Option<MoveReport>,
    /// Absent only when the run was cancelled during the rotation.
    pub translation: Option<MoveReport>,
}

impl NavigateReport {
    /// Outcome of the last phase that ran.
    pub fn outcome(&self) -> MoveOutcome {
        self.translation
            .or(self.rotation)
            .map_or(MoveOutcome::Cancelled, |report| report.outcome)
    }

    pub fn reached(&self) -> bool {
        self.translation.is_some_and(|report| report.reached())
    }

    /// Legacy combined view: every phase ran to its own end.
    pub fn completed(&self) -> bool {
        self.rotation.is_none_or(|report| report.completed())
            && self.translation.is_some_and(|report| report.completed())
    }
}

impl MotionController {
    /// Drives to `(x, y)`, turning in place first when the robot faces more
    /// than `prerotate_threshold` degrees away from the approach heading.
    pub async fn navigate_to(&self, x: f64, y: f64, options: MoveOptions, ctx: &RunContext) -> NavigateReport {
        let start = self.current_pose();
        let threshold = self.tuning.navigation.prerotate_threshold;

        let rotation = match approach_heading(&start, x, y, &options) {
            Some(heading) if heading_error(heading, start.heading).abs() > threshold => {
                info!(%start, heading, "Pre-rotating before translation.");
                let rotate_options = MoveOptions {
                    backwards: false,
                    force_flip: false,
                    ..options
                };
                Some(
                    self.rotate_to(RotationTarget::Heading(heading), rotate_options, ctx)
                        .await,
                )
            }
            _ => {
                debug!(%start, target_x = x, target_y = y, "Heading within threshold; skipping rotation.");
                None
            }
        };

        if rotation.is_some_and(|report| report.outcome == MoveOutcome::Cancelled) {
            return NavigateReport {
                rotation,
                translation: None,
            };
        }

        let translation = self.translate_to(x, y, options, ctx).await;
        NavigateReport {
            rotation,
            translation: Some(translation),
        }
    }
}
