//! Deterministic simulated robot.
//!
//! The chassis plant is a first-order lag from commanded output to wheel
//! velocity. State advances lazily: every trait call integrates the plant up
//! to `tokio::time::Instant::now()` in small fixed substeps, so a paused tokio
//! clock gives bit-for-bit repeatable runs.

use std::collections::VecDeque;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use tower_kinematics::{DifferentialDrive, KinematicsError, Pose, WheelTicks};

use crate::hal::{
    Actuator, ActuatorCommand, ControllerState, Drivetrain, HeadingSensor, OperatorInput,
    ProximitySensor,
};

const SUBSTEP_S: f64 = 0.005;

/// Physical parameters of the simulated chassis.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Wheel diameter (cm).
    pub wheel_diameter: f64,
    /// Distance between the wheel contact patches (cm).
    pub track_width: f64,
    pub ticks_per_revolution: f64,
    /// Wheel surface speed at full output (cm/s).
    pub max_wheel_speed: f64,
    /// Time constant of the wheel velocity response.
    pub time_constant_ms: f64,
    /// Scale applied to the right encoder only. Values other than 1 make the
    /// dead-reckoned heading drift.
    pub right_encoder_scale: f64,
    /// Uniform per-substep encoder slip, as a fraction of travel.
    pub encoder_noise: f64,
    pub seed: u64,
    /// How long the heading sensor reports calibrating after start-up.
    pub imu_calibration_ms: u64,
    /// A faulty heading sensor never finishes calibrating.
    pub imu_faulty: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            wheel_diameter: 10.16,
            track_width: 30.0,
            ticks_per_revolution: 900.0,
            max_wheel_speed: 150.0,
            time_constant_ms: 100.0,
            right_encoder_scale: 1.0,
            encoder_noise: 0.0,
            seed: 2019,
            imu_calibration_ms: 0,
            imu_faulty: false,
        }
    }
}

impl SimConfig {
    pub fn kinematics(&self) -> Result<DifferentialDrive, KinematicsError> {
        DifferentialDrive::new(self.wheel_diameter, self.track_width, self.ticks_per_revolution)
    }
}

#[derive(Debug)]
struct Plant {
    last: Instant,
    command: (f64, f64),
    velocity: (f64, f64),
    /// Encoder-measured wheel travel (cm).
    measured: (f64, f64),
    pose: Pose,
    /// Unwrapped true rotation (deg).
    rotation: f64,
    peak_output: f64,
    rng: StdRng,
}

/// Simulated tank chassis with wheel encoders and a heading sensor.
#[derive(Debug)]
pub struct SimRobot {
    config: SimConfig,
    kinematics: DifferentialDrive,
    started: Instant,
    plant: Mutex<Plant>,
}

impl SimRobot {
    pub fn new(config: SimConfig) -> Result<Self, KinematicsError> {
        let kinematics = config.kinematics()?;
        let now = Instant::now();
        let plant = Plant {
            last: now,
            command: (0.0, 0.0),
            velocity: (0.0, 0.0),
            measured: (0.0, 0.0),
            pose: Pose::default(),
            rotation: 0.0,
            peak_output: 0.0,
            rng: StdRng::seed_from_u64(config.seed),
        };
        Ok(Self {
            config,
            kinematics,
            started: now,
            plant: Mutex::new(plant),
        })
    }

    pub fn kinematics(&self) -> DifferentialDrive {
        self.kinematics
    }

    /// Ground-truth pose of the chassis.
    pub fn true_pose(&self) -> Pose {
        let mut plant = self.plant.lock();
        self.advance(&mut plant);
        plant.pose
    }

    /// Moves the chassis without touching the encoders or the heading sensor.
    pub fn place(&self, pose: Pose) {
        let mut plant = self.plant.lock();
        self.advance(&mut plant);
        plant.pose = pose;
    }

    /// Largest output magnitude commanded so far.
    pub fn peak_output(&self) -> f64 {
        self.plant.lock().peak_output
    }

    fn advance(&self, plant: &mut Plant) {
        let now = Instant::now();
        let mut remaining = now.saturating_duration_since(plant.last).as_secs_f64();
        plant.last = now;

        let tau = (self.config.time_constant_ms / 1000.0).max(1e-3);
        let top = self.config.max_wheel_speed;
        let noise = self.config.encoder_noise;
        while remaining > 0.0 {
            let h = remaining.min(SUBSTEP_S);
            remaining -= h;
            let alpha = (h / tau).min(1.0);
            plant.velocity.0 += (plant.command.0 * top - plant.velocity.0) * alpha;
            plant.velocity.1 += (plant.command.1 * top - plant.velocity.1) * alpha;

            let left = plant.velocity.0 * h;
            let right = plant.velocity.1 * h;
            plant.pose = self.kinematics.update_pose(plant.pose, left, right);
            plant.rotation += self.kinematics.heading_change(left, right);

            let (slip_left, slip_right) = if noise > 0.0 {
                (
                    plant.rng.random_range(-noise..=noise),
                    plant.rng.random_range(-noise..=noise),
                )
            } else {
                (0.0, 0.0)
            };
            plant.measured.0 += left * (1.0 + slip_left);
            plant.measured.1 += right * self.config.right_encoder_scale * (1.0 + slip_right);
        }
    }

    fn sensor_ready(&self) -> bool {
        !self.config.imu_faulty
            && self.started.elapsed().as_millis() >= u128::from(self.config.imu_calibration_ms)
    }
}

impl Drivetrain for SimRobot {
    fn tank(&self, left: f64, right: f64) {
        let mut plant = self.plant.lock();
        self.advance(&mut plant);
        let left = left.clamp(-1.0, 1.0);
        let right = right.clamp(-1.0, 1.0);
        plant.peak_output = plant.peak_output.max(left.abs()).max(right.abs());
        plant.command = (left, right);
    }

    fn encoder_ticks(&self) -> WheelTicks {
        let mut plant = self.plant.lock();
        self.advance(&mut plant);
        WheelTicks::new(
            self.kinematics.distance_to_ticks(plant.measured.0),
            self.kinematics.distance_to_ticks(plant.measured.1),
        )
    }
}

impl HeadingSensor for SimRobot {
    fn rotation(&self) -> Option<f64> {
        if !self.sensor_ready() {
            return None;
        }
        let mut plant = self.plant.lock();
        self.advance(&mut plant);
        Some(plant.rotation)
    }

    fn is_calibrating(&self) -> bool {
        !self.sensor_ready()
    }
}

#[derive(Debug, Clone, Copy)]
enum ActuatorMode {
    Free { speed: f64 },
    Target { position: f64, speed: f64 },
}

#[derive(Debug)]
struct ActuatorState {
    last: Instant,
    position: f64,
    speed: f64,
    mode: ActuatorMode,
    last_command: Option<ActuatorCommand>,
}

/// A manipulator motor that tracks commands ideally at a fixed rate.
#[derive(Debug)]
pub struct SimActuator {
    /// Encoder ticks per second for one unit of commanded velocity.
    ticks_per_unit: f64,
    /// Velocity reached at the full 12000 mV.
    max_velocity: f64,
    state: Mutex<ActuatorState>,
}

impl SimActuator {
    pub fn new(ticks_per_unit: f64, max_velocity: f64) -> Self {
        Self {
            ticks_per_unit,
            max_velocity,
            state: Mutex::new(ActuatorState {
                last: Instant::now(),
                position: 0.0,
                speed: 0.0,
                mode: ActuatorMode::Free { speed: 0.0 },
                last_command: None,
            }),
        }
    }

    pub fn last_command(&self) -> Option<ActuatorCommand> {
        self.state.lock().last_command
    }

    /// Overrides the encoder position.
    pub fn set_position(&self, position: f64) {
        let mut state = self.state.lock();
        self.advance(&mut state);
        state.position = position;
    }

    fn advance(&self, state: &mut ActuatorState) {
        let now = Instant::now();
        let dt = now.saturating_duration_since(state.last).as_secs_f64();
        state.last = now;
        match state.mode {
            ActuatorMode::Free { speed } => {
                state.speed = speed;
                state.position += speed * self.ticks_per_unit * dt;
            }
            ActuatorMode::Target { position, speed } => {
                let step = speed.abs() * self.ticks_per_unit * dt;
                let remaining = position - state.position;
                if remaining.abs() <= step {
                    state.position = position;
                    state.speed = 0.0;
                } else {
                    state.position += step * remaining.signum();
                    state.speed = speed.abs() * remaining.signum();
                }
            }
        }
    }
}

impl Actuator for SimActuator {
    fn command(&self, command: ActuatorCommand) {
        let mut state = self.state.lock();
        self.advance(&mut state);
        state.mode = match command {
            ActuatorCommand::Velocity(v) => ActuatorMode::Free { speed: v },
            ActuatorCommand::Voltage(mv) => ActuatorMode::Free {
                speed: mv / 12000.0 * self.max_velocity,
            },
            ActuatorCommand::MoveAbsolute { position, velocity } => ActuatorMode::Target {
                position,
                speed: velocity,
            },
            ActuatorCommand::MoveRelative { delta, velocity } => {
                let base = match state.mode {
                    ActuatorMode::Target { position, .. } => position,
                    ActuatorMode::Free { .. } => state.position,
                };
                ActuatorMode::Target {
                    position: base + delta,
                    speed: velocity,
                }
            }
        };
        if state.last_command != Some(command) {
            debug!(?command, "sim actuator command");
        }
        state.last_command = Some(command);
    }

    fn position(&self) -> f64 {
        let mut state = self.state.lock();
        self.advance(&mut state);
        state.position
    }

    fn velocity(&self) -> f64 {
        let mut state = self.state.lock();
        self.advance(&mut state);
        state.speed
    }

    fn position_error(&self) -> f64 {
        let mut state = self.state.lock();
        self.advance(&mut state);
        match state.mode {
            ActuatorMode::Target { position, .. } => position - state.position,
            ActuatorMode::Free { .. } => 0.0,
        }
    }
}

/// Proximity sensor whose reading is set by the test or scenario.
#[derive(Debug)]
pub struct SimProximity {
    reading: Mutex<f64>,
}

impl SimProximity {
    pub fn new(reading: f64) -> Self {
        Self {
            reading: Mutex::new(reading),
        }
    }

    pub fn set(&self, reading: f64) {
        *self.reading.lock() = reading;
    }
}

impl ProximitySensor for SimProximity {
    fn reading(&self) -> f64 {
        *self.reading.lock()
    }
}

/// Operator controller that replays queued states, then holds the last one.
#[derive(Debug, Default)]
pub struct ScriptedController {
    script: Mutex<VecDeque<ControllerState>>,
    current: Mutex<ControllerState>,
    rumbles: Mutex<Vec<String>>,
}

impl ScriptedController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, state: ControllerState) {
        self.script.lock().push_back(state);
    }

    pub fn rumbles(&self) -> Vec<String> {
        self.rumbles.lock().clone()
    }
}

impl OperatorInput for ScriptedController {
    fn state(&self) -> ControllerState {
        let mut current = self.current.lock();
        if let Some(next) = self.script.lock().pop_front() {
            *current = next;
        }
        *current
    }

    fn rumble(&self, pattern: &str) {
        self.rumbles.lock().push(pattern.to_string());
    }
}
