mod graphics; // brings `graphics.rs` in as `crate::graphics`
mod routine; // brings `routine.rs` in as `crate::routine`
mod settings; // brings `settings.rs` in as `crate::settings`

use graphics::window_conf;
use settings::RobotConfig;

use std::{sync::Arc, time::Duration};
use tokio::time::{Instant, sleep};
use tracing::{error, info, warn};
use tracing_subscriber::{self, EnvFilter};

use tower_motion::blackboard::{Blackboard, raise_fault, snapshot};
use tower_motion::bus::Topic;
use tower_motion::estimator::{self, wait_for_calibration};
use tower_motion::hal::{Button, ControllerState};
use tower_motion::manipulator::Manipulator;
use tower_motion::opcontrol::{OPERATOR_PERIOD, OperatorDevices, run_operator_control};
use tower_motion::sim::{ScriptedController, SimActuator, SimProximity, SimRobot};
use tower_motion::{MotionController, Pose, PoseEstimator, RunContext, RunMode};

/// Encoder ticks per second per unit of commanded manipulator velocity.
const ACTUATOR_TICKS_PER_UNIT: f64 = 10.0;
const ACTUATOR_MAX_VELOCITY: f64 = 200.0;
/// Detector reading with nothing in front of it.
const DETECTOR_CLEAR: f64 = 60000.0;
/// Estimates older than this are reported as a fault.
const POSE_STALE_AFTER: Duration = Duration::from_millis(100);

#[macroquad::main(window_conf)]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Tower Takeover simulator started. Setting up Tokio runtime and spawning simulation...");

    let config = match settings::load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration rejected: {:#}", e);
            return;
        }
    };

    let tokio_rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to start the Tokio runtime: {}", e);
            return;
        }
    };

    let pose_topic: Topic<Pose> = Topic::new(16);
    let pose_rx_for_vis = pose_topic.subscribe();
    let waypoints = config.routine.waypoints.clone();

    tokio_rt.spawn(async move {
        match run(config, pose_topic).await {
            Ok(_) => info!("Simulation tasks finished successfully."),
            Err(e) => error!("Simulation tasks failed: {:?}.", e),
        }
    });

    graphics::run_visualization_loop(pose_rx_for_vis, waypoints).await;
}

async fn run(config: RobotConfig, pose_topic: Topic<Pose>) -> anyhow::Result<()> {
    info!("Simulation setup started.");
    let robot = Arc::new(SimRobot::new(config.sim.clone())?);
    robot.place(config.routine.start);
    let kinematics = robot.kinematics();
    let bb: Blackboard = Arc::default();
    let operator = Arc::new(ScriptedController::new());

    let estimator_task = tokio::spawn(
        PoseEstimator::new(
            robot.clone(),
            Some(robot.clone()),
            kinematics,
            bb.clone(),
            config.estimator.clone(),
        )
        .with_topic(pose_topic)
        .run(),
    );
    let watchdog_task = tokio::spawn(watchdog(bb.clone()));

    wait_for_calibration(Some(&*robot), &bb, Some(&*operator), &config.estimator).await;
    estimator::reset(&bb, Some(&*robot), config.routine.start);

    let motion = MotionController::new(
        robot.clone(),
        Some(robot.clone()),
        bb.clone(),
        kinematics,
        config.motion.clone(),
    )?;
    let ctx = RunContext::new(RunMode::Autonomous);
    let reports = routine::run_autonomous(&motion, &config.routine, &ctx).await?;
    info!(
        reached = reports.iter().filter(|r| r.reached()).count(),
        attempted = reports.len(),
        "Autonomous routine finished."
    );

    if config.routine.operator_control_ms > 0 {
        script_tray_cycle(&operator, Duration::from_millis(config.routine.operator_control_ms));
        let devices = OperatorDevices {
            drivetrain: robot.clone(),
            operator: operator.clone(),
            tray: Arc::new(SimActuator::new(ACTUATOR_TICKS_PER_UNIT, ACTUATOR_MAX_VELOCITY)),
            lift: Arc::new(SimActuator::new(ACTUATOR_TICKS_PER_UNIT, ACTUATOR_MAX_VELOCITY)),
            intake: Arc::new(SimActuator::new(ACTUATOR_TICKS_PER_UNIT, ACTUATOR_MAX_VELOCITY)),
            detector: Arc::new(SimProximity::new(DETECTOR_CLEAR)),
        };
        let ctx = RunContext::new(RunMode::OperatorControl);
        let stop_after = Duration::from_millis(config.routine.operator_control_ms);
        tokio::spawn({
            let ctx = ctx.clone();
            async move {
                sleep(stop_after).await;
                ctx.disable();
            }
        });
        let mut manipulator = Manipulator::new(config.manipulator.clone());
        run_operator_control(&devices, &mut manipulator, &ctx).await?;
    }

    let faults = snapshot(&bb).faults;
    if !faults.is_empty() {
        warn!(?faults, "Faults raised during the run.");
    }

    // keep estimating so the window shows the final pose
    tokio::select! {
        result = estimator_task => result??,
        result = watchdog_task => result??,
    }
    Ok(())
}

/// Scripted driver period: deploy the tray, hold, then retract it.
fn script_tray_cycle(operator: &ScriptedController, length: Duration) {
    let ticks = (length.as_millis() / OPERATOR_PERIOD.as_millis()).max(2) as usize;
    let toggle = ControllerState::default().with(Button::TrayToggle, true);
    operator.push(toggle);
    for _ in 1..ticks / 2 {
        operator.push(ControllerState::default());
    }
    operator.push(toggle);
    operator.push(ControllerState::default());
}

async fn watchdog(bb: Blackboard) -> anyhow::Result<()> {
    info!("Watchdog task started.");
    let mut tick = tokio::time::interval(Duration::from_millis(25));
    loop {
        tick.tick().await;
        let age = Instant::now().saturating_duration_since(snapshot(&bb).last_update);
        if age > POSE_STALE_AFTER {
            warn!(?age, "Pose estimate is stale.");
            raise_fault(&bb, "pose estimate stale");
        }
    }
}
