//! Hardware seams.
//!
//! The motion core never talks to motor or sensor drivers directly. Device
//! drivers (or the [`sim`](crate::sim) module) implement these traits. All
//! methods take `&self` because the pose estimator task and the active motion
//! controller read the same devices concurrently; implementations are
//! expected to use interior mutability.

pub use tower_kinematics::WheelTicks;

/// A tank chassis: two motor groups with one encoder per side.
pub trait Drivetrain: Send + Sync {
    /// Commands both sides with normalized outputs in `[-1, 1]`.
    fn tank(&self, left: f64, right: f64);

    /// Zeroes both sides.
    fn stop(&self) {
        self.tank(0.0, 0.0);
    }

    /// Cumulative encoder ticks for each side.
    fn encoder_ticks(&self) -> WheelTicks;
}

/// Absolute heading sensor (gyro / inertial unit).
pub trait HeadingSensor: Send + Sync {
    /// Continuous rotation in degrees, counter-clockwise positive.
    ///
    /// Returns `None` while the sensor is unavailable.
    fn rotation(&self) -> Option<f64>;

    /// True while the sensor is still calibrating after power-up.
    fn is_calibrating(&self) -> bool;
}

/// A command for a single manipulator motor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCommand {
    /// Run at a signed velocity (motor units, e.g. rpm).
    Velocity(f64),
    /// Apply a signed open-loop voltage (millivolts).
    Voltage(f64),
    /// Move to an absolute encoder position at the given speed.
    MoveAbsolute {
        /// Target position (ticks).
        position: f64,
        /// Maximum speed for the move.
        velocity: f64,
    },
    /// Move by `delta` ticks from the current target at the given speed.
    MoveRelative {
        /// Relative distance (ticks).
        delta: f64,
        /// Maximum speed for the move.
        velocity: f64,
    },
}

impl ActuatorCommand {
    /// The idle command: zero voltage.
    pub const IDLE: ActuatorCommand = ActuatorCommand::Voltage(0.0);
}

/// A manipulator motor (tray, lift or intake).
pub trait Actuator: Send + Sync {
    /// Issues a new command, replacing whatever the motor was doing.
    fn command(&self, command: ActuatorCommand);

    /// Encoder position (ticks).
    fn position(&self) -> f64;

    /// Measured velocity (motor units).
    fn velocity(&self) -> f64;

    /// Remaining error of the last position move; zero when not moving to a position.
    fn position_error(&self) -> f64;
}

/// An analog reflectance/proximity sensor used as a binary detector.
pub trait ProximitySensor: Send + Sync {
    /// Raw calibrated reading. Lower values mean an object is in front of the sensor.
    fn reading(&self) -> f64;
}

/// Buttons on the operator controller that the motion core listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    /// Lift up (R1).
    LiftUp,
    /// Lift down (R2).
    LiftDown,
    /// Intake in (L1).
    IntakeIn,
    /// Intake out (L2).
    IntakeOut,
    /// Secondary intake out (D-pad right).
    IntakeShift,
    /// Manual override for the tray (Y).
    Shift,
    /// Tray deploy / retract toggle (X).
    TrayToggle,
    /// Slower, further tray deploy / retract toggle (A).
    TrayToggleAlt,
    /// Begin game-piece centering (B).
    CenterPiece,
}

impl Button {
    /// Number of buttons.
    pub const COUNT: usize = 9;

    /// Every button, in index order.
    pub const ALL: [Button; Button::COUNT] = [
        Button::LiftUp,
        Button::LiftDown,
        Button::IntakeIn,
        Button::IntakeOut,
        Button::IntakeShift,
        Button::Shift,
        Button::TrayToggle,
        Button::TrayToggleAlt,
        Button::CenterPiece,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Level state of the operator controller at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerState {
    buttons: [bool; Button::COUNT],
    /// Left stick vertical axis in `[-1, 1]`.
    pub left_y: f64,
    /// Right stick vertical axis in `[-1, 1]`.
    pub right_y: f64,
}

impl ControllerState {
    /// True while `button` is held.
    pub fn is_pressed(&self, button: Button) -> bool {
        self.buttons[button.index()]
    }

    /// Sets the level of `button`.
    pub fn set(&mut self, button: Button, pressed: bool) {
        self.buttons[button.index()] = pressed;
    }

    /// Builder-style [`ControllerState::set`].
    pub fn with(mut self, button: Button, pressed: bool) -> Self {
        self.set(button, pressed);
        self
    }

    /// Builder-style stick assignment, clamped to `[-1, 1]`.
    pub fn with_sticks(mut self, left_y: f64, right_y: f64) -> Self {
        self.left_y = left_y.clamp(-1.0, 1.0);
        self.right_y = right_y.clamp(-1.0, 1.0);
        self
    }
}

/// Operator controller.
pub trait OperatorInput: Send + Sync {
    /// Current button levels and stick positions.
    fn state(&self) -> ControllerState;

    /// Plays a rumble pattern (`.` short, `-` long, ` ` pause).
    fn rumble(&self, pattern: &str);
}
