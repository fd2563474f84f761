#![warn(missing_docs)]

//! Error types for the kinematics library.
//!
//! This module defines error types that can occur while describing the
//! chassis geometry.

use core::fmt;

/// Errors that can occur in kinematic calculations.
#[derive(Debug, Clone, PartialEq)]
pub enum KinematicsError {
    /// Error for invalid wheel diameter.
    /// This variant is returned when a wheel diameter is provided that is not positive.
    InvalidWheelDiameter(&'static str),
    /// Error for invalid track width.
    /// This variant is returned when the distance between the wheels is not positive.
    InvalidTrackWidth(&'static str),
    /// Error for invalid encoder resolution.
    /// This variant is returned when the ticks per wheel revolution is not positive.
    InvalidEncoderResolution(&'static str),
}

impl fmt::Display for KinematicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KinematicsError::InvalidWheelDiameter(msg) => write!(f, "Invalid wheel diameter: {}", msg),
            KinematicsError::InvalidTrackWidth(msg) => write!(f, "Invalid track width: {}", msg),
            KinematicsError::InvalidEncoderResolution(msg) => {
                write!(f, "Invalid encoder resolution: {}", msg)
            }
        }
    }
}

impl core::error::Error for KinematicsError {}
