//! Background pose estimation.
//!
//! Every tick the estimator integrates the wheel-encoder deltas into the pose
//! on the blackboard, then overwrites the heading with the absolute heading
//! sensor when heading fusion is active. Motion controllers only ever read
//! the resulting pose.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use tower_kinematics::{DifferentialDrive, Pose, WheelTicks, normalize_degrees};

use crate::blackboard::{self, Blackboard};
use crate::bus::Topic;
use crate::error::MotionError;
use crate::hal::{Drivetrain, HeadingSensor, OperatorInput};

/// Rumble played when the heading sensor fails to calibrate.
pub const CALIBRATION_FAILED_RUMBLE: &str = ".. -";

/// Fault recorded on the blackboard when the heading sensor fails to calibrate.
pub const CALIBRATION_FAULT: &str = "heading sensor calibration timeout";

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    /// Estimator tick period.
    pub period_ms: u64,
    /// Upper bound on the start-up wait for the heading sensor.
    pub calibration_timeout_ms: u64,
    /// How often the sensor is polled while waiting for calibration.
    pub calibration_poll_ms: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            period_ms: 20,
            calibration_timeout_ms: 3000,
            calibration_poll_ms: 20,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), MotionError> {
        if self.period_ms == 0 || self.calibration_poll_ms == 0 {
            return Err(MotionError::InvalidPeriod("estimator periods must be at least 1 ms"));
        }
        Ok(())
    }
}

pub struct PoseEstimator {
    drivetrain: Arc<dyn Drivetrain>,
    heading_sensor: Option<Arc<dyn HeadingSensor>>,
    kinematics: DifferentialDrive,
    blackboard: Blackboard,
    topic: Option<Topic<Pose>>,
    last_ticks: WheelTicks,
    config: EstimatorConfig,
}

impl PoseEstimator {
    pub fn new(
        drivetrain: Arc<dyn Drivetrain>,
        heading_sensor: Option<Arc<dyn HeadingSensor>>,
        kinematics: DifferentialDrive,
        blackboard: Blackboard,
        config: EstimatorConfig,
    ) -> Self {
        let last_ticks = drivetrain.encoder_ticks();
        Self {
            drivetrain,
            heading_sensor,
            kinematics,
            blackboard,
            topic: None,
            last_ticks,
            config,
        }
    }

    /// Also broadcasts every estimate on `topic`.
    pub fn with_topic(mut self, topic: Topic<Pose>) -> Self {
        self.topic = Some(topic);
        self
    }

    /// One estimator tick: dead-reckon from encoder deltas, then fuse heading.
    pub fn step(&mut self) -> Pose {
        let ticks = self.drivetrain.encoder_ticks();
        let delta = ticks.since(self.last_ticks);
        self.last_ticks = ticks;
        let raw_rotation = self.heading_sensor.as_ref().and_then(|s| s.rotation());

        let kinematics = self.kinematics;
        let pose = blackboard::update_pose(&self.blackboard, |state| {
            let mut pose = kinematics.update_pose_from_ticks(state.pose, delta);
            if state.heading_fusion {
                if let Some(raw) = raw_rotation {
                    pose.heading = normalize_degrees(raw + state.heading_offset);
                }
            }
            pose
        });

        if let Some(topic) = &self.topic {
            topic.publish(pose);
        }
        pose
    }

    /// Runs the estimator forever at the configured period.
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!(period_ms = self.config.period_ms, "Pose estimator task started.");
        let mut ticker = time::interval(Duration::from_millis(self.config.period_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let pose = self.step();
            debug!(%pose, "pose estimate");
        }
    }
}

/// Re-zeroes the pose for a new run. The heading sensor's current reading
/// becomes `pose.heading`, normalized to `[-180, 180)`.
pub fn reset(blackboard: &Blackboard, heading_sensor: Option<&dyn HeadingSensor>, pose: Pose) {
    let pose = Pose::new(pose.x, pose.y, pose.heading);
    let raw = heading_sensor.and_then(|s| s.rotation());
    blackboard::reset_pose(blackboard, pose, raw);
    info!(%pose, sensor_rotation = ?raw, "Pose reset.");
}

/// Waits up to `calibration_timeout_ms` for the heading sensor.
///
/// Returns `true` once the sensor reports a reading. On timeout (or with no
/// sensor at all) heading fusion is switched off, a fault is recorded and the
/// operator controller rumbles, then `false` is returned.
pub async fn wait_for_calibration(
    heading_sensor: Option<&dyn HeadingSensor>,
    blackboard: &Blackboard,
    operator: Option<&dyn OperatorInput>,
    config: &EstimatorConfig,
) -> bool {
    let start = Instant::now();
    let timeout = Duration::from_millis(config.calibration_timeout_ms);

    if let Some(sensor) = heading_sensor {
        let mut ticker = time::interval(Duration::from_millis(config.calibration_poll_ms));
        loop {
            ticker.tick().await;
            if !sensor.is_calibrating() && sensor.rotation().is_some() {
                info!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Heading sensor calibrated."
                );
                return true;
            }
            if start.elapsed() >= timeout {
                break;
            }
        }
    }

    warn!(
        timeout_ms = config.calibration_timeout_ms,
        "Heading sensor unavailable; continuing with dead-reckoned heading."
    );
    if let Some(operator) = operator {
        operator.rumble(CALIBRATION_FAILED_RUMBLE);
    }
    blackboard::raise_fault(blackboard, CALIBRATION_FAULT);
    blackboard::disable_heading_fusion(blackboard);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::{current_pose, snapshot};
    use crate::sim::{ScriptedController, SimConfig, SimRobot};
    use tokio::time::sleep;

    const EPSILON: f64 = 1e-6;

    fn estimator(robot: &Arc<SimRobot>, bb: &Blackboard) -> PoseEstimator {
        PoseEstimator::new(
            robot.clone(),
            Some(robot.clone()),
            robot.kinematics(),
            bb.clone(),
            EstimatorConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_reckoning_tracks_straight_drive() {
        let robot = Arc::new(SimRobot::new(SimConfig::default()).unwrap());
        let bb: Blackboard = Arc::default();
        let mut estimator = estimator(&robot, &bb);
        robot.tank(0.5, 0.5);
        for _ in 0..25 {
            sleep(Duration::from_millis(20)).await;
            estimator.step();
        }
        let estimate = current_pose(&bb);
        let truth = robot.true_pose();
        assert!((estimate.x - truth.x).abs() < EPSILON);
        assert!(estimate.heading.abs() < EPSILON);
        assert_eq!(snapshot(&bb).updates, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heading_fusion_removes_encoder_drift() {
        let config = SimConfig {
            right_encoder_scale: 1.05,
            ..SimConfig::default()
        };
        let robot = Arc::new(SimRobot::new(config.clone()).unwrap());
        let bb: Blackboard = Arc::default();
        let mut fused = estimator(&robot, &bb);

        let unfused_bb: Blackboard = Arc::default();
        let mut unfused = PoseEstimator::new(
            robot.clone(),
            None,
            robot.kinematics(),
            unfused_bb.clone(),
            EstimatorConfig::default(),
        );

        robot.tank(0.6, 0.6);
        for _ in 0..50 {
            sleep(Duration::from_millis(20)).await;
            fused.step();
            unfused.step();
        }
        // the skewed right encoder makes pure dead-reckoning think it turned left
        assert!(current_pose(&unfused_bb).heading > 5.0);
        assert!(current_pose(&bb).heading.abs() < EPSILON);
        assert!(current_pose(&bb).y.abs() < current_pose(&unfused_bb).y.abs());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_maps_sensor_onto_new_heading() {
        let robot = Arc::new(SimRobot::new(SimConfig::default()).unwrap());
        let bb: Blackboard = Arc::default();
        let mut estimator = estimator(&robot, &bb);
        robot.tank(-0.3, 0.3);
        sleep(Duration::from_millis(300)).await;
        robot.stop();
        sleep(Duration::from_millis(500)).await;
        estimator.step();

        reset(&bb, Some(&*robot), Pose::new(10.0, 20.0, 90.0));
        let pose = estimator.step();
        assert!((pose.heading - 90.0).abs() < EPSILON);
        assert!((pose.x - 10.0).abs() < EPSILON);
        assert!((pose.y - 20.0).abs() < EPSILON);
    }

    #[test]
    fn test_reset_normalizes_heading() {
        let bb: Blackboard = Arc::default();
        let pose = Pose {
            x: 5.0,
            y: -5.0,
            heading: 270.0,
        };
        reset(&bb, None, pose);
        let stored = crate::blackboard::current_pose(&bb);
        assert!((stored.heading + 90.0).abs() < EPSILON);
        assert!((stored.x - 5.0).abs() < EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibration_succeeds_within_window() {
        let robot = SimRobot::new(SimConfig {
            imu_calibration_ms: 1000,
            ..SimConfig::default()
        })
        .unwrap();
        let bb: Blackboard = Arc::default();
        let controller = ScriptedController::new();
        let ok = wait_for_calibration(
            Some(&robot),
            &bb,
            Some(&controller),
            &EstimatorConfig::default(),
        )
        .await;
        assert!(ok);
        assert!(snapshot(&bb).heading_fusion);
        assert!(controller.rumbles().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibration_timeout_falls_back_to_dead_reckoning() {
        let robot = Arc::new(
            SimRobot::new(SimConfig {
                imu_faulty: true,
                ..SimConfig::default()
            })
            .unwrap(),
        );
        let bb: Blackboard = Arc::default();
        let controller = ScriptedController::new();
        let start = Instant::now();
        let ok = wait_for_calibration(
            Some(&*robot),
            &bb,
            Some(&controller),
            &EstimatorConfig::default(),
        )
        .await;
        assert!(!ok);
        assert!(start.elapsed() >= Duration::from_millis(3000));
        assert!(start.elapsed() < Duration::from_millis(3100));

        let state = snapshot(&bb);
        assert!(!state.heading_fusion);
        assert_eq!(state.faults, vec![CALIBRATION_FAULT.to_string()]);
        assert_eq!(controller.rumbles(), vec![CALIBRATION_FAILED_RUMBLE.to_string()]);

        // the estimator keeps running on encoders alone
        let mut estimator = estimator(&robot, &bb);
        robot.tank(-0.3, 0.3);
        sleep(Duration::from_millis(200)).await;
        assert!(estimator.step().heading > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimator_task_publishes_on_topic() {
        let robot = Arc::new(SimRobot::new(SimConfig::default()).unwrap());
        let bb: Blackboard = Arc::default();
        let topic: Topic<Pose> = Topic::new(8);
        let mut rx = topic.subscribe();
        let task = tokio::spawn(estimator(&robot, &bb).with_topic(topic).run());
        let first = crate::bus::recv_latest(&mut rx).await.unwrap();
        assert_eq!(*first, Pose::default());
        task.abort();
    }
}
