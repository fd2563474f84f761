//! Chassis motion controllers.
//!
//! Every controller owns the chassis exclusively for the duration of one call
//! and returns a [`MoveReport`]. Callers invoke them strictly one after another;
//! there is no internal lock.

mod navigate;
mod relative;
mod rotate;
mod translate;

use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use tower_kinematics::{DifferentialDrive, Pose};

use crate::blackboard::{self, Blackboard};
use crate::convergence::ExitPolicy;
use crate::error::MotionError;
use crate::estimator;
use crate::hal::{Drivetrain, HeadingSensor};
use crate::pid::PidGains;

pub use navigate::NavigateReport;
pub use relative::RelativeLaw;
pub use rotate::{RotationLaw, RotationTarget};
pub use translate::TranslationLaw;

/// Per-call options shared by the pose-based controllers.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MoveOptions {
    /// Drive to the target in reverse.
    pub backwards: bool,
    /// Mirror the computed approach heading about the x axis.
    pub force_flip: bool,
    /// Output cap in `(0, 1]`. `None` uses the tuned default.
    pub max_output: Option<f64>,
    /// Log every control tick at debug level.
    pub verbose: bool,
}

impl MoveOptions {
    pub fn backwards() -> Self {
        Self {
            backwards: true,
            ..Self::default()
        }
    }

    pub fn with_max_output(mut self, max_output: f64) -> Self {
        self.max_output = Some(max_output);
        self
    }

    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Output cap for one call. A non-finite cap falls back to `default`.
    fn cap(&self, default: f64) -> f64 {
        self.max_output
            .filter(|cap| cap.is_finite())
            .unwrap_or(default)
            .clamp(0.0, 1.0)
    }
}

/// Heading the robot should face to drive at `(x, y)` from `pose`, honouring
/// the reverse and flip hints. `None` when the target coincides with the pose.
pub fn approach_heading(pose: &Pose, x: f64, y: f64, options: &MoveOptions) -> Option<f64> {
    let mut heading = pose.heading_to(x, y)?;
    if options.backwards {
        heading += 180.0;
    }
    if options.force_flip {
        heading = -heading;
    }
    Some(tower_kinematics::normalize_degrees(heading))
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationTuning {
    /// PID on distance-to-go (cm) producing the common output.
    pub distance: PidGains,
    /// PID on heading error (deg) producing the differential output.
    pub heading: PidGains,
    pub max_output: f64,
    pub exit: ExitPolicy,
}

impl Default for TranslationTuning {
    fn default() -> Self {
        Self {
            distance: PidGains::new(0.04, 0.0, 0.2, 5.0),
            heading: PidGains::new(0.01, 0.0, 0.02, 0.0),
            max_output: 0.9,
            exit: ExitPolicy {
                period_ms: 20,
                tolerance: 3.0,
                settle_ticks: 15,
                stall_ticks: 20,
                timeout_ms: Some(5000),
            },
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct RotationTuning {
    /// PID on heading error (deg).
    pub heading: PidGains,
    pub max_output: f64,
    pub exit: ExitPolicy,
}

impl Default for RotationTuning {
    fn default() -> Self {
        Self {
            heading: PidGains::new(0.01, 0.0005, 0.04, 10.0),
            max_output: 0.9,
            exit: ExitPolicy {
                period_ms: 10,
                tolerance: 2.0,
                settle_ticks: 5,
                stall_ticks: 30,
                timeout_ms: Some(3000),
            },
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct RelativeTuning {
    /// Output per tick of error while both wheels travel the same way.
    pub straight_kp: f64,
    /// Cap increase per control tick while driving straight.
    pub straight_slew: f64,
    /// Output per tick of error while the wheels travel in opposite directions.
    pub turn_kp: f64,
    /// Cap increase per control tick while turning.
    pub turn_slew: f64,
    pub max_output: f64,
    pub exit: ExitPolicy,
}

impl Default for RelativeTuning {
    fn default() -> Self {
        Self {
            straight_kp: 0.15 / 127.0,
            straight_slew: 5.0 / 127.0,
            turn_kp: 0.7 / 127.0,
            turn_slew: 4.0 / 127.0,
            max_output: 115.0 / 127.0,
            exit: ExitPolicy {
                period_ms: 20,
                tolerance: 5.0,
                settle_ticks: 2,
                stall_ticks: 20,
                timeout_ms: Some(4000),
            },
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationTuning {
    /// Heading error (deg) above which the robot turns in place before driving.
    pub prerotate_threshold: f64,
}

impl Default for NavigationTuning {
    fn default() -> Self {
        Self {
            prerotate_threshold: 20.0,
        }
    }
}

/// Every gain and exit policy used by the chassis controllers.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MotionTuning {
    pub translation: TranslationTuning,
    pub rotation: RotationTuning,
    pub relative: RelativeTuning,
    pub navigation: NavigationTuning,
}

/// Checks that an output cap lies in `(0, 1]`.
pub fn validate_cap(cap: f64) -> Result<(), MotionError> {
    if !(cap > 0.0 && cap <= 1.0) {
        return Err(MotionError::InvalidOutputCap("must be in (0, 1]"));
    }
    Ok(())
}

impl MotionTuning {
    pub fn validate(&self) -> Result<(), MotionError> {
        self.translation.distance.validate()?;
        self.translation.heading.validate()?;
        validate_cap(self.translation.max_output)?;
        self.translation.exit.validate()?;

        self.rotation.heading.validate()?;
        validate_cap(self.rotation.max_output)?;
        self.rotation.exit.validate()?;

        let relative = &self.relative;
        for gain in [
            relative.straight_kp,
            relative.straight_slew,
            relative.turn_kp,
            relative.turn_slew,
        ] {
            if !gain.is_finite() || gain <= 0.0 {
                return Err(MotionError::InvalidGain(
                    "relative-move gains and slew rates must be positive",
                ));
            }
        }
        validate_cap(relative.max_output)?;
        relative.exit.validate()?;

        let threshold = self.navigation.prerotate_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(MotionError::InvalidTolerance(
                "pre-rotate threshold must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

/// Entry point for autonomous chassis motion.
///
/// Reads the fused pose from the blackboard written by the
/// [`PoseEstimator`](crate::estimator::PoseEstimator) and commands the
/// drivetrain directly.
pub struct MotionController {
    drivetrain: Arc<dyn Drivetrain>,
    heading_sensor: Option<Arc<dyn HeadingSensor>>,
    blackboard: Blackboard,
    kinematics: DifferentialDrive,
    tuning: MotionTuning,
}

impl MotionController {
    pub fn new(
        drivetrain: Arc<dyn Drivetrain>,
        heading_sensor: Option<Arc<dyn HeadingSensor>>,
        blackboard: Blackboard,
        kinematics: DifferentialDrive,
        tuning: MotionTuning,
    ) -> Result<Self, MotionError> {
        tuning.validate()?;
        Ok(Self {
            drivetrain,
            heading_sensor,
            blackboard,
            kinematics,
            tuning,
        })
    }

    pub fn tuning(&self) -> &MotionTuning {
        &self.tuning
    }

    pub fn current_pose(&self) -> Pose {
        blackboard::current_pose(&self.blackboard)
    }

    /// Re-zeroes the pose estimate. Called once at the start of each run.
    pub fn reset_pose(&self, pose: Pose) {
        estimator::reset(&self.blackboard, self.heading_sensor.as_deref(), pose);
    }

    /// Heading for rotation feedback: the absolute sensor mapped into the
    /// field frame when fusion is active, otherwise the estimator's heading.
    fn fused_heading(&self) -> f64 {
        let fusion = self.blackboard.read().heading_fusion;
        if fusion {
            if let Some(raw) = self.heading_sensor.as_ref().and_then(|s| s.rotation()) {
                return blackboard::field_heading(&self.blackboard, raw);
            }
        }
        self.current_pose().heading
    }
}
