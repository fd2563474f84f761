use parking_lot::RwLock;
use std::sync::Arc;
use tokio::time::Instant;

use tower_kinematics::{Pose, normalize_degrees};

/// Shared robot state. The pose estimator is the only writer of `pose`.
#[derive(Clone, Debug)]
pub struct State {
    pub pose: Pose,
    /// Added to the raw sensor rotation to express it in the field frame.
    pub heading_offset: f64,
    /// False once the heading sensor failed calibration; the pose heading is
    /// then dead-reckoned only.
    pub heading_fusion: bool,
    pub updates: u64,
    pub last_update: Instant,
    pub faults: Vec<String>,
}

impl Default for State {
    fn default() -> Self {
        State {
            pose: Pose::default(),
            heading_offset: 0.0,
            heading_fusion: true,
            updates: 0,
            last_update: Instant::now(),
            faults: Vec::new(),
        }
    }
}

pub type Blackboard = Arc<RwLock<State>>;

pub fn snapshot(bb: &Blackboard) -> State {
    (*bb.read()).clone()
}

pub fn current_pose(bb: &Blackboard) -> Pose {
    bb.read().pose
}

/// Converts a raw sensor rotation into a field heading.
pub fn field_heading(bb: &Blackboard, raw_rotation: f64) -> f64 {
    normalize_degrees(raw_rotation + bb.read().heading_offset)
}

/// Sets the pose and re-zeroes the heading offset so that the sensor's
/// `raw_rotation` maps onto `pose.heading`.
pub fn reset_pose(bb: &Blackboard, pose: Pose, raw_rotation: Option<f64>) {
    let mut g = bb.write();
    g.pose = pose;
    if let Some(raw) = raw_rotation {
        g.heading_offset = pose.heading - raw;
    }
}

/// Applies one estimator update under the write lock and returns the new pose.
pub fn update_pose(bb: &Blackboard, f: impl FnOnce(&State) -> Pose) -> Pose {
    let mut g = bb.write();
    let pose = f(&g);
    g.pose = pose;
    g.updates += 1;
    g.last_update = Instant::now();
    pose
}

/// Switches the estimator to dead-reckoned heading only.
pub fn disable_heading_fusion(bb: &Blackboard) {
    bb.write().heading_fusion = false;
}

pub fn raise_fault(bb: &Blackboard, msg: &str) {
    let mut g = bb.write();
    if !g.faults.iter().any(|s| s == msg) {
        g.faults.push(msg.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faults_are_deduplicated() {
        let bb: Blackboard = Arc::default();
        raise_fault(&bb, "imu calibration timeout");
        raise_fault(&bb, "imu calibration timeout");
        assert_eq!(snapshot(&bb).faults.len(), 1);
    }

    #[test]
    fn test_reset_rezeroes_heading_offset() {
        let bb: Blackboard = Arc::default();
        reset_pose(&bb, Pose::new(0.0, 0.0, 0.0), Some(37.0));
        assert!((field_heading(&bb, 37.0) - 0.0).abs() < 1e-9);
        assert!((field_heading(&bb, 127.0) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_update_counts_estimator_ticks() {
        let bb: Blackboard = Arc::default();
        let pose = update_pose(&bb, |s| Pose::new(s.pose.x + 1.0, 0.0, 0.0));
        update_pose(&bb, |s| Pose::new(s.pose.x + 1.0, 0.0, 0.0));
        assert_eq!(pose.x, 1.0);
        assert_eq!(snapshot(&bb).updates, 2);
        assert_eq!(current_pose(&bb).x, 2.0);
    }

    #[test]
    fn test_reset_without_sensor_keeps_offset() {
        let bb: Blackboard = Arc::default();
        reset_pose(&bb, Pose::new(0.0, 0.0, 0.0), Some(10.0));
        reset_pose(&bb, Pose::new(5.0, 5.0, 45.0), None);
        assert!((snapshot(&bb).heading_offset - (-10.0)).abs() < 1e-9);
        assert_eq!(current_pose(&bb), Pose::new(5.0, 5.0, 45.0));
    }
}
