//! This module defines the error types used by the `tower-motion` crate.

#![warn(missing_docs)]

/// Error type for motion configuration and task plumbing.
///
/// Motion controllers themselves never fail: every exit is reported through a
/// [`MoveReport`](crate::control_loop::MoveReport). These errors are raised
/// while validating tuning and by the long-running tasks.
#[derive(Debug, PartialEq)]
pub enum MotionError {
    /// Error for a gain that is negative or not finite.
    InvalidGain(&'static str),
    /// Error for a tolerance or band that is negative or not finite.
    InvalidTolerance(&'static str),
    /// Error for a loop period of zero.
    InvalidPeriod(&'static str),
    /// Error for an output cap outside `(0, 1]`.
    InvalidOutputCap(&'static str),
    /// Error for invalid chassis geometry.
    InvalidGeometry(tower_kinematics::KinematicsError),
    /// Error for a pose channel with no sender left.
    PoseChannelClosed,
}

impl core::fmt::Display for MotionError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MotionError::InvalidGain(msg) => write!(f, "Invalid gain: {}", msg),
            MotionError::InvalidTolerance(msg) => write!(f, "Invalid tolerance: {}", msg),
            MotionError::InvalidPeriod(msg) => write!(f, "Invalid loop period: {}", msg),
            MotionError::InvalidOutputCap(msg) => write!(f, "Invalid output cap: {}", msg),
            MotionError::InvalidGeometry(e) => write!(f, "Invalid chassis geometry: {}", e),
            MotionError::PoseChannelClosed => write!(f, "Pose channel closed"),
        }
    }
}

impl core::error::Error for MotionError {}

impl From<tower_kinematics::KinematicsError> for MotionError {
    fn from(e: tower_kinematics::KinematicsError) -> Self {
        MotionError::InvalidGeometry(e)
    }
}
