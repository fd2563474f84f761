#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![doc = "A `no_std` library for 2D differential-drive (tank) chassis kinematics."]
#![doc = ""]
#![doc = "This crate provides the field pose type, heading helpers, and dead reckoning"]
#![doc = "from per-wheel encoder travel for a tank chassis."]

use core::f64::consts::PI;
use core::fmt;
use libm::{atan2, cos, fabs, hypot, sin};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::KinematicsError;

/// Distances below this are treated as "no displacement" when deriving a heading.
pub const MIN_HEADING_DISTANCE: f64 = 1e-6;

/// Normalize an angle in degrees to be within `[-180, 180)`.
///
/// Angles at `180` will be normalized to `-180`.
pub fn normalize_degrees(angle: f64) -> f64 {
    let a = angle % 360.0;
    if a >= 180.0 {
        a - 360.0
    } else if a < -180.0 {
        a + 360.0
    } else {
        a
    }
}

/// Shortest signed rotation (degrees) that turns `current` onto `target`.
///
/// Positive results are counter-clockwise.
pub fn heading_error(target: f64, current: f64) -> f64 {
    normalize_degrees(target - current)
}

/// A field pose `(x, y, heading)` in centimetres and degrees (heading measured
/// counter‑clockwise from the x‑axis of the field frame).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "RawPose"))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    /// Field-frame x position (cm).
    pub x: f64,
    /// Field-frame y position (cm).
    pub y: f64,
    /// Heading (deg), normalized to `[-180, 180)`.
    pub heading: f64,
}

/// Deserialized form of [`Pose`]; the heading is normalized on conversion.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawPose {
    x: f64,
    y: f64,
    heading: f64,
}

#[cfg(feature = "serde")]
impl From<RawPose> for Pose {
    fn from(raw: RawPose) -> Self {
        Pose::new(raw.x, raw.y, raw.heading)
    }
}

impl Pose {
    /// Construct a new pose. The heading is normalized.
    ///
    /// # Arguments
    ///
    /// * `x`: Field-frame x position in centimetres.
    /// * `y`: Field-frame y position in centimetres.
    /// * `heading`: Heading in degrees.
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Pose {
            x,
            y,
            heading: normalize_degrees(heading),
        }
    }

    /// The heading in radians.
    pub fn heading_radians(&self) -> f64 {
        self.heading.to_radians()
    }

    /// Euclidean distance from this pose to the point `(x, y)`.
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        hypot(x - self.x, y - self.y)
    }

    /// Heading (deg) of the vector from this pose to the point `(x, y)`.
    ///
    /// # Returns
    ///
    /// `None` when the point coincides with the pose, since the vector has no
    /// direction.
    pub fn heading_to(&self, x: f64, y: f64) -> Option<f64> {
        let dx = x - self.x;
        let dy = y - self.y;
        if fabs(dx) < MIN_HEADING_DISTANCE && fabs(dy) < MIN_HEADING_DISTANCE {
            return None;
        }
        Some(normalize_degrees(atan2(dy, dx) * 180.0 / PI))
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(x: {:.2} cm, y: {:.2} cm, θ: {:.2}°)", self.x, self.y, self.heading)
    }
}

/// Raw per-wheel encoder readings in ticks.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelTicks {
    /// Left wheel encoder (ticks).
    pub left: f64,
    /// Right wheel encoder (ticks).
    pub right: f64,
}

impl WheelTicks {
    /// Construct wheel readings.
    pub const fn new(left: f64, right: f64) -> Self {
        WheelTicks { left, right }
    }

    /// Per-wheel change from `previous` to `self`.
    pub fn since(&self, previous: WheelTicks) -> WheelTicks {
        WheelTicks::new(self.left - previous.left, self.right - previous.right)
    }
}

impl fmt::Display for WheelTicks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(L: {:.1} ticks, R: {:.1} ticks)", self.left, self.right)
    }
}

/// Differential‑drive geometry helper.
///
/// This struct encapsulates the physical parameters of a tank chassis
/// (wheel diameter, track width and encoder resolution) and provides the
/// conversions needed for dead reckoning.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifferentialDrive {
    /// Wheel diameter (cm).
    wheel_diameter: f64,
    /// Distance between the left and right wheel contact points (cm).
    track_width: f64,
    /// Encoder ticks per wheel revolution.
    ticks_per_revolution: f64,
}

impl DifferentialDrive {
    /// Construct a new differential‑drive helper.
    ///
    /// # Arguments
    ///
    /// * `wheel_diameter`: Wheel diameter in centimetres.
    /// * `track_width`: Distance between the two drive wheels in centimetres.
    /// * `ticks_per_revolution`: Encoder ticks for one full wheel revolution.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::InvalidWheelDiameter)` if `wheel_diameter` is not positive.
    /// Returns `Err(KinematicsError::InvalidTrackWidth)` if `track_width` is not positive.
    /// Returns `Err(KinematicsError::InvalidEncoderResolution)` if `ticks_per_revolution` is not positive.
    pub const fn new(
        wheel_diameter: f64,
        track_width: f64,
        ticks_per_revolution: f64,
    ) -> Result<Self, KinematicsError> {
        if wheel_diameter <= 0.0 {
            return Err(KinematicsError::InvalidWheelDiameter("must be positive"));
        }
        if track_width <= 0.0 {
            return Err(KinematicsError::InvalidTrackWidth("must be positive"));
        }
        if ticks_per_revolution <= 0.0 {
            return Err(KinematicsError::InvalidEncoderResolution("must be positive"));
        }
        Ok(DifferentialDrive {
            wheel_diameter,
            track_width,
            ticks_per_revolution,
        })
    }

    /// Returns the wheel diameter.
    pub fn wheel_diameter(&self) -> f64 {
        self.wheel_diameter
    }

    /// Returns the track width.
    pub fn track_width(&self) -> f64 {
        self.track_width
    }

    /// Returns the encoder resolution.
    pub fn ticks_per_revolution(&self) -> f64 {
        self.ticks_per_revolution
    }

    /// Centimetres of ground travel per encoder tick.
    pub fn distance_per_tick(&self) -> f64 {
        PI * self.wheel_diameter / self.ticks_per_revolution
    }

    /// Converts encoder ticks to centimetres of wheel travel.
    pub fn ticks_to_distance(&self, ticks: f64) -> f64 {
        ticks * self.distance_per_tick()
    }

    /// Converts centimetres of wheel travel to encoder ticks.
    pub fn distance_to_ticks(&self, distance: f64) -> f64 {
        distance / self.distance_per_tick()
    }

    /// Heading change (deg) produced by the given left/right wheel travel.
    pub fn heading_change(&self, left_travel: f64, right_travel: f64) -> f64 {
        ((right_travel - left_travel) / self.track_width) * 180.0 / PI
    }

    /// Dead-reckoning update from the distance each wheel travelled.
    ///
    /// The chassis displacement is applied along the mid-point heading of the
    /// interval, which is exact for constant-curvature arcs over short ticks.
    /// The resulting heading is normalized to `[-180, 180)`.
    ///
    /// # Arguments
    ///
    /// * `current_pose`: The pose at the start of the interval.
    /// * `left_travel`: Left wheel travel in centimetres.
    /// * `right_travel`: Right wheel travel in centimetres.
    ///
    /// # Returns
    ///
    /// The pose at the end of the interval.
    pub fn update_pose(&self, current_pose: Pose, left_travel: f64, right_travel: f64) -> Pose {
        let distance = (left_travel + right_travel) / 2.0;
        let delta_heading = self.heading_change(left_travel, right_travel);
        let mid_heading = (current_pose.heading + delta_heading / 2.0).to_radians();

        Pose {
            x: current_pose.x + distance * cos(mid_heading),
            y: current_pose.y + distance * sin(mid_heading),
            heading: normalize_degrees(current_pose.heading + delta_heading),
        }
    }

    /// Convenience function to update the pose directly from encoder deltas.
    ///
    /// This converts both wheels with [`DifferentialDrive::ticks_to_distance`]
    /// and then calls [`DifferentialDrive::update_pose`].
    pub fn update_pose_from_ticks(&self, current_pose: Pose, delta: WheelTicks) -> Pose {
        self.update_pose(
            current_pose,
            self.ticks_to_distance(delta.left),
            self.ticks_to_distance(delta.right),
        )
    }
}

impl fmt::Display for DifferentialDrive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DifferentialDrive (d: {:.2} cm, track: {:.2} cm, {:.0} ticks/rev)",
            self.wheel_diameter, self.track_width, self.ticks_per_revolution
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-6;

    fn chassis() -> DifferentialDrive {
        // 4 in wheels, ~12 in track, 900 ticks/rev
        DifferentialDrive::new(10.16, 30.0, 900.0).unwrap()
    }

    #[test]
    fn test_heading_normalization() {
        assert!((normalize_degrees(0.0) - 0.0).abs() < EPSILON);
        assert!((normalize_degrees(180.0) - (-180.0)).abs() < EPSILON);
        assert!((normalize_degrees(-180.0) - (-180.0)).abs() < EPSILON);
        assert!((normalize_degrees(540.0) - (-180.0)).abs() < EPSILON);
        assert!((normalize_degrees(450.0) - 90.0).abs() < EPSILON);
        assert!((normalize_degrees(-450.0) - (-90.0)).abs() < EPSILON);
        assert!((normalize_degrees(359.0) - (-1.0)).abs() < EPSILON);
    }

    #[test]
    fn test_heading_error_takes_short_way_round() {
        assert!((heading_error(170.0, -170.0) - (-20.0)).abs() < EPSILON);
        assert!((heading_error(-170.0, 170.0) - 20.0).abs() < EPSILON);
        assert!((heading_error(90.0, 0.0) - 90.0).abs() < EPSILON);
    }

    #[test]
    fn test_heading_to_points() {
        let origin = Pose::default();
        assert!((origin.heading_to(100.0, 0.0).unwrap() - 0.0).abs() < EPSILON);
        assert!((origin.heading_to(0.0, 50.0).unwrap() - 90.0).abs() < EPSILON);
        assert!((origin.heading_to(-10.0, 0.0).unwrap() - (-180.0)).abs() < EPSILON);
        assert!((origin.heading_to(10.0, -10.0).unwrap() - (-45.0)).abs() < EPSILON);
    }

    #[test]
    fn test_heading_to_coincident_point_is_none() {
        let pose = Pose::new(12.0, -4.0, 30.0);
        assert_eq!(pose.heading_to(12.0, -4.0), None);
        assert!(pose.distance_to(12.0, -4.0).abs() < EPSILON);
    }

    #[test]
    fn test_constructor_rejects_bad_geometry() {
        assert!(matches!(
            DifferentialDrive::new(0.0, 30.0, 900.0),
            Err(KinematicsError::InvalidWheelDiameter("must be positive"))
        ));
        assert!(matches!(
            DifferentialDrive::new(10.0, -1.0, 900.0),
            Err(KinematicsError::InvalidTrackWidth("must be positive"))
        ));
        assert!(matches!(
            DifferentialDrive::new(10.0, 30.0, 0.0),
            Err(KinematicsError::InvalidEncoderResolution("must be positive"))
        ));
    }

    #[test]
    fn test_tick_conversion_round_trip() {
        let drive = chassis();
        // one revolution is one circumference
        assert!((drive.ticks_to_distance(900.0) - PI * 10.16).abs() < EPSILON);
        assert!((drive.distance_to_ticks(PI * 10.16) - 900.0).abs() < EPSILON);
    }

    #[test]
    fn test_update_pose_straight() {
        let drive = chassis();
        let pose = drive.update_pose(Pose::new(0.0, 0.0, 0.0), 10.0, 10.0);
        assert!((pose.x - 10.0).abs() < EPSILON);
        assert!(pose.y.abs() < EPSILON);
        assert!(pose.heading.abs() < EPSILON);
    }

    #[test]
    fn test_update_pose_straight_facing_y() {
        let drive = chassis();
        let pose = drive.update_pose(Pose::new(1.0, 1.0, 90.0), 5.0, 5.0);
        assert!((pose.x - 1.0).abs() < EPSILON);
        assert!((pose.y - 6.0).abs() < EPSILON);
        assert!((pose.heading - 90.0).abs() < EPSILON);
    }

    #[test]
    fn test_update_pose_point_turn_no_translation() {
        let drive = chassis();
        // a quarter of the track circumference on each wheel turns 90°
        let arc = PI * 30.0 / 4.0;
        let pose = drive.update_pose(Pose::default(), -arc, arc);
        assert!(pose.x.abs() < EPSILON);
        assert!(pose.y.abs() < EPSILON);
        assert!((pose.heading - 90.0).abs() < EPSILON);
    }

    #[test]
    fn test_update_pose_arc_uses_midpoint_heading() {
        let drive = chassis();
        // 10° heading change over ~20 cm of centre travel
        let delta = 10.0_f64.to_radians() * 30.0;
        let pose = drive.update_pose(Pose::default(), 20.0 - delta / 2.0, 20.0 + delta / 2.0);
        assert!((pose.heading - 10.0).abs() < EPSILON);
        assert!((pose.x - 20.0 * 5.0_f64.to_radians().cos()).abs() < EPSILON);
        assert!((pose.y - 20.0 * 5.0_f64.to_radians().sin()).abs() < EPSILON);
    }

    #[test]
    fn test_update_pose_from_ticks() {
        let drive = chassis();
        let before = WheelTicks::new(100.0, 100.0);
        let after = WheelTicks::new(1000.0, 1000.0);
        let pose = drive.update_pose_from_ticks(Pose::default(), after.since(before));
        assert!((pose.x - PI * 10.16).abs() < EPSILON);
        assert!(pose.y.abs() < EPSILON);
    }
}
