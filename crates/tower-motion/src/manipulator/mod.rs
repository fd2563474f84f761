//! Manipulator coordination during operator control.
//!
//! [`Manipulator::update`] runs once per operator-control tick. It advances
//! the tray and alignment state machines and arbitrates the shared motors.
//! Intake precedence each tick: the tray's stacking modes, then the
//! alignment assist, then the operator's button mapping, then idle.

pub mod alignment;
pub mod input;
pub mod tray;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MotionError;
use crate::hal::{ActuatorCommand, Button};

pub use alignment::{AlignmentConfig, AlignmentMachine, AlignmentState, AlignmentStep};
pub use input::{EdgeTracker, OperatorEvents};
pub use tray::{TrayConfig, TrayEvent, TrayState};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct LiftConfig {
    pub velocity: f64,
    /// Lift positions above this mean the robot is placing into a tower.
    pub stacking_height: f64,
    /// Width of the band just below stacking height where the lift is held down.
    pub hold_band: f64,
    /// Voltage (mV) holding the lift down inside the band.
    pub hold_voltage: f64,
    /// Lift target while the tray is extending.
    pub park_position: f64,
    pub park_velocity: f64,
}

impl Default for LiftConfig {
    fn default() -> Self {
        Self {
            velocity: 100.0,
            stacking_height: 700.0,
            hold_band: 300.0,
            hold_voltage: -2000.0,
            park_position: -150.0,
            park_velocity: 100.0,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeConfig {
    pub velocity: f64,
    /// Reduced speed while the lift is above stacking height.
    pub tower_velocity: f64,
    /// Slow stack adjustment while the tray is extending.
    pub stack_velocity: f64,
    /// Velocity per unit of stick average while the tray is returning.
    pub stick_scale: f64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            velocity: 200.0,
            tower_velocity: 100.0,
            stack_velocity: 50.0,
            stick_scale: 350.0,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManipulatorConfig {
    pub tray: TrayConfig,
    pub lift: LiftConfig,
    pub intake: IntakeConfig,
    pub alignment: AlignmentConfig,
}

impl ManipulatorConfig {
    pub fn validate(&self) -> Result<(), MotionError> {
        if !self.tray.watermark.is_finite() || self.tray.watermark <= self.tray.returned_position {
            return Err(MotionError::InvalidTolerance("tray watermark must exceed the returned position"));
        }
        if !self.tray.returned_velocity.is_finite() || self.tray.returned_velocity < 0.0 {
            return Err(MotionError::InvalidTolerance("tray returned velocity must be non-negative"));
        }
        if !self.lift.hold_band.is_finite() || self.lift.hold_band < 0.0 {
            return Err(MotionError::InvalidTolerance("lift hold band must be non-negative"));
        }
        if !self.alignment.settle_error.is_finite() || self.alignment.settle_error < 0.0 {
            return Err(MotionError::InvalidTolerance("alignment settle error must be non-negative"));
        }
        if self.alignment.timeout_ticks == 0 {
            return Err(MotionError::InvalidPeriod("alignment timeout must be at least one tick"));
        }
        Ok(())
    }
}

/// Sensor readings sampled at the start of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManipulatorSensors {
    pub tray_position: f64,
    pub tray_velocity: f64,
    pub lift_position: f64,
    /// Remaining error of the intake's last position move.
    pub intake_position_error: f64,
    /// Thresholded game-piece detector.
    pub covered: bool,
}

/// Motor commands for one tick. `None` leaves a motor on its previous command.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManipulatorCommand {
    pub tray: Option<ActuatorCommand>,
    pub lift: Option<ActuatorCommand>,
    pub intake: Option<ActuatorCommand>,
}

#[derive(Debug, Clone, Default)]
pub struct Manipulator {
    config: ManipulatorConfig,
    tray: TrayState,
    alignment: AlignmentMachine,
}

impl Manipulator {
    pub fn new(config: ManipulatorConfig) -> Self {
        Self {
            config,
            tray: TrayState::Returned,
            alignment: AlignmentMachine::new(),
        }
    }

    pub fn config(&self) -> &ManipulatorConfig {
        &self.config
    }

    pub fn tray_state(&self) -> TrayState {
        self.tray
    }

    pub fn alignment_state(&self) -> AlignmentState {
        self.alignment.state()
    }

    pub fn alignment_armed(&self) -> bool {
        self.alignment.is_armed()
    }

    /// Advances both state machines by one tick and returns the motor commands.
    pub fn update(&mut self, events: &OperatorEvents, sensors: &ManipulatorSensors) -> ManipulatorCommand {
        // explicit toggles first, then the measured position
        let mut tray_command = if events.changed_to_pressed(Button::TrayToggle) {
            self.apply_tray(TrayEvent::Toggle(self.config.tray.deploy))
        } else if events.changed_to_pressed(Button::TrayToggleAlt) {
            self.apply_tray(TrayEvent::Toggle(self.config.tray.deploy_alt))
        } else {
            None
        };
        self.apply_tray(TrayEvent::Measured {
            position: sensors.tray_position,
            velocity: sensors.tray_velocity,
        });
        if tray_command.is_none() && self.tray == TrayState::Returned {
            tray_command = Some(self.tray_assist(events, sensors));
        }

        let alignment = self.step_alignment(events, sensors);

        let intake = match self.tray {
            TrayState::Extending => self.stack_adjust(events),
            TrayState::Returning => Some(self.returning_intake(events)),
            TrayState::Returned if alignment.active => alignment.command,
            TrayState::Returned if events.is_pressed(Button::Shift) => Some(ActuatorCommand::IDLE),
            TrayState::Returned => Some(self.operator_intake(events, sensors)),
        };

        ManipulatorCommand {
            tray: tray_command,
            lift: Some(self.lift(events, sensors)),
            intake,
        }
    }

    /// The alignment machine only runs while it can own the intake, i.e. with
    /// the tray Returned. Any other tray state disarms it.
    fn step_alignment(&mut self, events: &OperatorEvents, sensors: &ManipulatorSensors) -> AlignmentStep {
        let config = &self.config.alignment;
        if self.tray != TrayState::Returned {
            if self.alignment.is_armed() {
                debug!(tray = %self.tray, "alignment disarmed");
                self.alignment.disarm();
            }
            return AlignmentStep::default();
        }
        if events.changed_to_pressed(Button::CenterPiece) {
            self.alignment.arm(config);
        } else if events.is_pressed(Button::CenterPiece) {
            self.alignment.refresh(config);
        }
        self.alignment.step(sensors.covered, sensors.intake_position_error, config)
    }

    fn apply_tray(&mut self, event: TrayEvent) -> Option<ActuatorCommand> {
        let (next, command) = tray::transition(self.tray, event, &self.config.tray);
        if next != self.tray {
            debug!(from = %self.tray, to = %next, "tray state");
            self.tray = next;
        }
        command
    }

    /// Tray command while Returned: manual slew under shift, otherwise follow the lift.
    /// With the lift down the tray is only pulled back to zero once it is
    /// inside the assist preset; a tray left further out by hand stays put.
    fn tray_assist(&self, events: &OperatorEvents, sensors: &ManipulatorSensors) -> ActuatorCommand {
        let tray = &self.config.tray;
        if events.is_pressed(Button::Shift) {
            if events.is_pressed(Button::IntakeIn) {
                tray.slew(true, sensors.tray_position)
            } else if events.is_pressed(Button::IntakeOut) {
                tray.slew(false, sensors.tray_position)
            } else {
                ActuatorCommand::IDLE
            }
        } else if sensors.lift_position > self.config.lift.stacking_height {
            ActuatorCommand::MoveAbsolute {
                position: tray.assist_position,
                velocity: tray.assist_velocity,
            }
        } else if sensors.tray_position <= tray.assist_position {
            ActuatorCommand::MoveAbsolute {
                position: 0.0,
                velocity: tray.assist_velocity,
            }
        } else {
            ActuatorCommand::IDLE
        }
    }

    fn lift(&self, events: &OperatorEvents, sensors: &ManipulatorSensors) -> ActuatorCommand {
        let lift = &self.config.lift;
        let position = sensors.lift_position;
        if self.tray == TrayState::Extending {
            ActuatorCommand::MoveAbsolute {
                position: lift.park_position,
                velocity: lift.park_velocity,
            }
        } else if events.is_pressed(Button::LiftUp) {
            ActuatorCommand::Velocity(lift.velocity)
        } else if events.is_pressed(Button::LiftDown) {
            ActuatorCommand::Velocity(-lift.velocity)
        } else if position < lift.stacking_height && position > lift.stacking_height - lift.hold_band {
            ActuatorCommand::Voltage(lift.hold_voltage)
        } else {
            ActuatorCommand::IDLE
        }
    }

    /// Intake while stacking: slow adjustment only. Leaves the intake alone
    /// while the shift override is held or was just released.
    fn stack_adjust(&self, events: &OperatorEvents) -> Option<ActuatorCommand> {
        if events.is_pressed(Button::Shift) || events.changed_to_released(Button::Shift) {
            return None;
        }
        let speed = self.config.intake.stack_velocity;
        Some(if events.is_pressed(Button::IntakeIn) {
            ActuatorCommand::Velocity(speed)
        } else if events.is_pressed(Button::IntakeOut) || events.is_pressed(Button::IntakeShift) {
            ActuatorCommand::Velocity(-speed)
        } else {
            ActuatorCommand::IDLE
        })
    }

    /// Intake while the tray returns: buttons, or backing out with the drive sticks.
    fn returning_intake(&self, events: &OperatorEvents) -> ActuatorCommand {
        let intake = &self.config.intake;
        if events.is_pressed(Button::IntakeIn) && !events.is_pressed(Button::IntakeOut) {
            ActuatorCommand::Velocity(intake.velocity)
        } else if events.is_pressed(Button::IntakeOut) || events.is_pressed(Button::IntakeShift) {
            ActuatorCommand::Velocity(-intake.velocity)
        } else if events.stick_average() > 0.0 {
            ActuatorCommand::IDLE
        } else {
            ActuatorCommand::Velocity(events.stick_average() * intake.stick_scale)
        }
    }

    fn operator_intake(&self, events: &OperatorEvents, sensors: &ManipulatorSensors) -> ActuatorCommand {
        let intake = &self.config.intake;
        let high = sensors.lift_position > self.config.lift.stacking_height;
        let intake_in = events.is_pressed(Button::IntakeIn);
        let intake_out = events.is_pressed(Button::IntakeOut);
        if intake_in && !intake_out {
            ActuatorCommand::Velocity(if high { intake.tower_velocity } else { intake.velocity })
        } else if intake_out && high {
            ActuatorCommand::Velocity(-intake.tower_velocity)
        } else if intake_out || (events.is_pressed(Button::IntakeShift) && high) {
            ActuatorCommand::Velocity(-intake.velocity)
        } else {
            ActuatorCommand::IDLE
        }
    }
}
