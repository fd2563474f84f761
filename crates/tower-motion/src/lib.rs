//! Motion core for a tank-drive stacking robot.
//!
//! - [`estimator`] keeps the field pose on a shared [`blackboard`] up to date.
//! - [`motion`] holds the chassis controllers: translate, rotate, relative
//!   encoder moves and turn-then-drive navigation. All of them run through
//!   [`control_loop::drive_loop`] and report a [`MoveReport`].
//! - [`manipulator`] and [`opcontrol`] run the tray, lift and intake during
//!   the driver period.
//! - [`sim`] implements the [`hal`] traits for tests and desktop runs.

pub mod blackboard;
pub mod bus;
pub mod context;
pub mod control_loop;
pub mod convergence;
pub mod error;
pub mod estimator;
pub mod hal;
pub mod manipulator;
pub mod motion;
pub mod opcontrol;
pub mod pid;
pub mod sim;

pub use context::{RunContext, RunMode};
pub use control_loop::{MoveOutcome, MoveReport};
pub use error::MotionError;
pub use estimator::{EstimatorConfig, PoseEstimator};
pub use motion::{MotionController, MotionTuning, MoveOptions, NavigateReport, RotationTarget};
pub use tower_kinematics::Pose;
