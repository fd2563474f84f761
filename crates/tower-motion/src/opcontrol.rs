//! Driver-period loop: tank drive from the sticks plus the manipulator.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::context::{RunContext, RunMode};
use crate::hal::{Actuator, ActuatorCommand, Drivetrain, OperatorInput, ProximitySensor};
use crate::manipulator::{EdgeTracker, Manipulator, ManipulatorCommand, ManipulatorConfig, ManipulatorSensors};

/// Operator-control tick period.
pub const OPERATOR_PERIOD: Duration = Duration::from_millis(20);

/// Devices owned by the operator-control loop.
pub struct OperatorDevices {
    pub drivetrain: Arc<dyn Drivetrain>,
    pub operator: Arc<dyn OperatorInput>,
    pub tray: Arc<dyn Actuator>,
    pub lift: Arc<dyn Actuator>,
    pub intake: Arc<dyn Actuator>,
    pub detector: Arc<dyn ProximitySensor>,
}

impl OperatorDevices {
    fn sample(&self, config: &ManipulatorConfig) -> ManipulatorSensors {
        ManipulatorSensors {
            tray_position: self.tray.position(),
            tray_velocity: self.tray.velocity(),
            lift_position: self.lift.position(),
            intake_position_error: self.intake.position_error(),
            covered: self.detector.reading() < config.alignment.covered_threshold,
        }
    }

    fn apply(&self, command: &ManipulatorCommand) {
        if let Some(c) = command.tray {
            self.tray.command(c);
        }
        if let Some(c) = command.lift {
            self.lift.command(c);
        }
        if let Some(c) = command.intake {
            self.intake.command(c);
        }
    }

    fn idle(&self) {
        self.drivetrain.stop();
        for actuator in [&self.tray, &self.lift, &self.intake] {
            actuator.command(ActuatorCommand::IDLE);
        }
    }
}

/// Runs operator control until `ctx` is disabled, then zeroes every output.
pub async fn run_operator_control(
    devices: &OperatorDevices,
    manipulator: &mut Manipulator,
    ctx: &RunContext,
) -> anyhow::Result<()> {
    if ctx.mode() != RunMode::OperatorControl {
        bail!("operator control started with a {:?} context", ctx.mode());
    }
    info!("Operator control started.");

    let mut ticker = time::interval(OPERATOR_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut edges = EdgeTracker::new();
    let mut ticks: u64 = 0;

    loop {
        ticker.tick().await;
        if !ctx.is_enabled() {
            break;
        }
        let events = edges.next(devices.operator.state());
        let sensors = devices.sample(manipulator.config());
        let command = manipulator.update(&events, &sensors);
        devices.apply(&command);
        devices.drivetrain.tank(events.left_y(), events.right_y());

        ticks += 1;
        debug!(
            tick = ticks,
            tray = %manipulator.tray_state(),
            alignment = %manipulator.alignment_state(),
            "operator tick"
        );
    }

    devices.idle();
    info!(ticks, "Operator control stopped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{Button, ControllerState};
    use crate::manipulator::{AlignmentState, TrayState};
    use crate::sim::{ScriptedController, SimActuator, SimConfig, SimProximity, SimRobot};
    use tokio::time::sleep;

    struct Bench {
        robot: Arc<SimRobot>,
        controller: Arc<ScriptedController>,
        tray: Arc<SimActuator>,
        lift: Arc<SimActuator>,
        intake: Arc<SimActuator>,
        detector: Arc<SimProximity>,
    }

    impl Bench {
        fn new() -> Self {
            Self {
                robot: Arc::new(SimRobot::new(SimConfig::default()).unwrap()),
                controller: Arc::new(ScriptedController::new()),
                tray: Arc::new(SimActuator::new(10.0, 200.0)),
                lift: Arc::new(SimActuator::new(1.0, 200.0)),
                intake: Arc::new(SimActuator::new(1.0, 200.0)),
                detector: Arc::new(SimProximity::new(60000.0)),
            }
        }

        fn devices(&self) -> OperatorDevices {
            OperatorDevices {
                drivetrain: self.robot.clone(),
                operator: self.controller.clone(),
                tray: self.tray.clone(),
                lift: self.lift.clone(),
                intake: self.intake.clone(),
                detector: self.detector.clone(),
            }
        }
    }

    fn disable_after(ctx: &RunContext, after: Duration) {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            sleep(after).await;
            ctx.disable();
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_drives_and_deploys_tray() {
        let bench = Bench::new();
        let sticks = ControllerState::default().with_sticks(0.5, 0.5);
        bench.controller.push(sticks.with(Button::TrayToggle, true));
        bench.controller.push(sticks);

        let ctx = RunContext::new(RunMode::OperatorControl);
        disable_after(&ctx, Duration::from_millis(500));
        let mut manipulator = Manipulator::default();
        run_operator_control(&bench.devices(), &mut manipulator, &ctx)
            .await
            .unwrap();

        assert_eq!(manipulator.tray_state(), TrayState::Extending);
        assert!(bench.tray.position() > 0.0);
        // the lift parks below zero while the tray extends
        assert!(bench.lift.position() < 0.0);
        assert!(bench.robot.true_pose().x > 10.0);

        // every output is zeroed on exit
        assert_eq!(bench.tray.last_command(), Some(ActuatorCommand::IDLE));
        assert_eq!(bench.intake.last_command(), Some(ActuatorCommand::IDLE));
        let before = bench.robot.true_pose().x;
        sleep(Duration::from_secs(1)).await;
        assert!(bench.robot.true_pose().x - before < 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_center_piece_seeks_until_covered() {
        let bench = Bench::new();
        bench
            .controller
            .push(ControllerState::default().with(Button::CenterPiece, true));
        bench.controller.push(ControllerState::default());

        let ctx = RunContext::new(RunMode::OperatorControl);
        disable_after(&ctx, Duration::from_millis(300));
        let mut manipulator = Manipulator::default();
        run_operator_control(&bench.devices(), &mut manipulator, &ctx)
            .await
            .unwrap();

        assert!(manipulator.alignment_armed());
        assert_eq!(manipulator.alignment_state(), AlignmentState::Uncovered);
        // seeking runs the intake backwards
        assert!(bench.intake.position() < 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refuses_autonomous_context() {
        let bench = Bench::new();
        let ctx = RunContext::new(RunMode::Autonomous);
        let mut manipulator = Manipulator::default();
        let result = run_operator_control(&bench.devices(), &mut manipulator, &ctx).await;
        assert!(result.is_err());
        assert_eq!(bench.intake.last_command(), None);
    }
}
