use anyhow::bail;
use serde::Deserialize;
use tracing::{info, warn};

use tower_motion::motion::validate_cap;
use tower_motion::{MotionController, MotionError, MoveOptions, MoveOutcome, NavigateReport, Pose, RunContext, RunMode};

/// One target of the autonomous routine.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub backwards: bool,
    #[serde(default)]
    pub max_output: Option<f64>,
}

impl Waypoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            backwards: false,
            max_output: None,
        }
    }

    fn options(&self) -> MoveOptions {
        MoveOptions {
            backwards: self.backwards,
            max_output: self.max_output,
            ..MoveOptions::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RoutineConfig {
    /// Pose the chassis is placed at before the run.
    pub start: Pose,
    pub waypoints: Vec<Waypoint>,
    /// Length of the simulated driver period after autonomous. Zero skips it.
    pub operator_control_ms: u64,
}

impl Default for RoutineConfig {
    fn default() -> Self {
        Self {
            start: Pose::default(),
            waypoints: vec![
                Waypoint::new(100.0, 0.0),
                Waypoint::new(100.0, 60.0),
                Waypoint {
                    backwards: true,
                    ..Waypoint::new(40.0, 60.0)
                },
                Waypoint::new(0.0, 0.0),
            ],
            operator_control_ms: 4000,
        }
    }
}

impl RoutineConfig {
    pub fn validate(&self) -> Result<(), MotionError> {
        for waypoint in &self.waypoints {
            if !waypoint.x.is_finite() || !waypoint.y.is_finite() {
                return Err(MotionError::InvalidTolerance("waypoint coordinates must be finite"));
            }
            if let Some(cap) = waypoint.max_output {
                validate_cap(cap)?;
            }
        }
        Ok(())
    }
}

/// Navigates through every waypoint in order. Stops early if the run is
/// cancelled; a waypoint that stalls or times out is logged and skipped.
pub async fn run_autonomous(
    motion: &MotionController,
    routine: &RoutineConfig,
    ctx: &RunContext,
) -> anyhow::Result<Vec<NavigateReport>> {
    if ctx.mode() != RunMode::Autonomous {
        bail!("autonomous routine started with a {:?} context", ctx.mode());
    }
    info!(waypoints = routine.waypoints.len(), "Autonomous routine started.");

    let mut reports = Vec::with_capacity(routine.waypoints.len());
    for (index, waypoint) in routine.waypoints.iter().enumerate() {
        let report = motion
            .navigate_to(waypoint.x, waypoint.y, waypoint.options(), ctx)
            .await;
        let pose = motion.current_pose();
        if report.reached() {
            info!(index, %pose, "Waypoint reached.");
        } else {
            warn!(index, %pose, outcome = %report.outcome(), "Waypoint not reached.");
        }
        reports.push(report);
        if report.outcome() == MoveOutcome::Cancelled {
            break;
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tower_motion::blackboard::Blackboard;
    use tower_motion::sim::{SimConfig, SimRobot};
    use tower_motion::{EstimatorConfig, MotionTuning, PoseEstimator};

    async fn setup() -> (Arc<SimRobot>, MotionController, tokio::task::JoinHandle<anyhow::Result<()>>) {
        let robot = Arc::new(SimRobot::new(SimConfig::default()).unwrap());
        let bb: Blackboard = Arc::default();
        let estimator = PoseEstimator::new(
            robot.clone(),
            Some(robot.clone()),
            robot.kinematics(),
            bb.clone(),
            EstimatorConfig::default(),
        );
        let task = tokio::spawn(estimator.run());
        let motion = MotionController::new(
            robot.clone(),
            Some(robot.clone()),
            bb,
            robot.kinematics(),
            MotionTuning::default(),
        )
        .unwrap();
        (robot, motion, task)
    }

    #[test]
    fn test_waypoint_caps_are_validated() {
        assert!(RoutineConfig::default().validate().is_ok());
        let routine = RoutineConfig {
            waypoints: vec![Waypoint {
                max_output: Some(f64::NAN),
                ..Waypoint::new(10.0, 0.0)
            }],
            ..RoutineConfig::default()
        };
        assert!(matches!(routine.validate(), Err(MotionError::InvalidOutputCap(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_routine_visits_waypoints_in_order() {
        let (robot, motion, task) = setup().await;
        let routine = RoutineConfig {
            waypoints: vec![Waypoint::new(60.0, 0.0), Waypoint::new(60.0, 40.0)],
            ..RoutineConfig::default()
        };
        let ctx = RunContext::new(RunMode::Autonomous);
        let reports = run_autonomous(&motion, &routine, &ctx).await.unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports[0].rotation.is_none());
        assert!(reports[1].rotation.is_some());
        assert!(reports.iter().all(|r| r.completed()));

        let pose = robot.true_pose();
        assert!(pose.distance_to(60.0, 40.0) < 5.0, "ended at {}", pose);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_stops_early() {
        let (_robot, motion, task) = setup().await;
        let ctx = RunContext::new(RunMode::Autonomous);
        ctx.disable();
        let reports = run_autonomous(&motion, &RoutineConfig::default(), &ctx)
            .await
            .unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].outcome(), MoveOutcome::Cancelled);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_operator_context() {
        let (_robot, motion, task) = setup().await;
        let ctx = RunContext::new(RunMode::OperatorControl);
        assert!(run_autonomous(&motion, &RoutineConfig::default(), &ctx).await.is_err());
        task.abort();
    }
}
