//! Game-piece alignment state machine.
//!
//! A one-shot pipeline `Uncovered -> Covered -> Setting -> SettingCovered ->
//! Finished`, armed by the operator and disarmed by a tick timeout or by
//! reaching `Finished`.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::hal::ActuatorCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignmentState {
    #[default]
    Uncovered,
    Covered,
    Setting,
    SettingCovered,
    Finished,
}

impl fmt::Display for AlignmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlignmentState::Uncovered => "uncovered",
            AlignmentState::Covered => "covered",
            AlignmentState::Setting => "setting",
            AlignmentState::SettingCovered => "setting covered",
            AlignmentState::Finished => "finished",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentEvent {
    /// Thresholded detector reading.
    Detector { covered: bool },
    /// The last relative move is within tolerance.
    MoveSettled,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentConfig {
    /// Detector readings below this count as covered.
    pub covered_threshold: f64,
    /// Intake velocity while searching for the piece.
    pub seek_velocity: f64,
    /// Corrective move issued when the piece is first detected.
    pub correction_delta: f64,
    pub correction_velocity: f64,
    /// Final centering move issued once the piece clears the detector.
    pub centering_delta: f64,
    pub centering_velocity: f64,
    /// Centering is done once the move error is within this many ticks.
    pub settle_error: f64,
    /// Control ticks before an armed alignment gives up.
    pub timeout_ticks: u32,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            covered_threshold: 46000.0,
            seek_velocity: -100.0,
            correction_delta: 120.0,
            correction_velocity: 100.0,
            centering_delta: -280.0,
            centering_velocity: 100.0,
            settle_error: 20.0,
            timeout_ticks: 50,
        }
    }
}

/// Pure transition function: `(state, event) -> (next, command)`.
pub fn transition(
    state: AlignmentState,
    event: AlignmentEvent,
    config: &AlignmentConfig,
) -> (AlignmentState, Option<ActuatorCommand>) {
    use AlignmentEvent::{Detector, MoveSettled};
    use AlignmentState::*;

    match (state, event) {
        (Uncovered, Detector { covered: true }) => (Covered, None),
        (Covered, Detector { covered: false }) => (Uncovered, None),
        (Covered, Detector { covered: true }) => (
            Setting,
            Some(ActuatorCommand::MoveRelative {
                delta: config.correction_delta,
                velocity: config.correction_velocity,
            }),
        ),
        (Setting, Detector { covered: false }) => (
            SettingCovered,
            Some(ActuatorCommand::MoveRelative {
                delta: config.centering_delta,
                velocity: config.centering_velocity,
            }),
        ),
        (SettingCovered, MoveSettled) => (Finished, None),
        (state, _) => (state, None),
    }
}

/// What one alignment tick did.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlignmentStep {
    /// True when the machine owned the intake this tick.
    pub active: bool,
    /// States entered this tick, in order.
    pub entered: Vec<AlignmentState>,
    pub command: Option<ActuatorCommand>,
}

#[derive(Debug, Clone, Default)]
pub struct AlignmentMachine {
    state: AlignmentState,
    remaining_ticks: u32,
}

impl AlignmentMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AlignmentState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.remaining_ticks > 0
    }

    /// Starts a new alignment from `Uncovered`.
    pub fn arm(&mut self, config: &AlignmentConfig) {
        self.state = AlignmentState::Uncovered;
        self.remaining_ticks = config.timeout_ticks;
        debug!("alignment armed");
    }

    /// Restarts the timeout of an armed alignment.
    pub fn refresh(&mut self, config: &AlignmentConfig) {
        if self.is_armed() {
            self.remaining_ticks = config.timeout_ticks;
        }
    }

    pub fn disarm(&mut self) {
        self.remaining_ticks = 0;
    }

    /// Runs one tick with the detector reading and the intake's remaining
    /// move error.
    pub fn step(&mut self, covered: bool, move_error: f64, config: &AlignmentConfig) -> AlignmentStep {
        if !self.is_armed() {
            return AlignmentStep::default();
        }
        self.remaining_ticks -= 1;

        let mut step = AlignmentStep {
            active: true,
            ..AlignmentStep::default()
        };

        if self.state == AlignmentState::SettingCovered {
            if move_error.abs() <= config.settle_error {
                self.apply(AlignmentEvent::MoveSettled, config, &mut step);
            }
        } else {
            // Uncovered -> Covered -> Setting can chain within one tick
            for _ in 0..2 {
                if !self.apply(AlignmentEvent::Detector { covered }, config, &mut step) {
                    break;
                }
            }
        }

        if step.command.is_none() && self.state == AlignmentState::Uncovered {
            step.command = Some(ActuatorCommand::Velocity(config.seek_velocity));
        }

        if self.state == AlignmentState::Finished {
            self.disarm();
        } else if !self.is_armed() {
            debug!(state = %self.state, "alignment timed out");
        }
        step
    }

    fn apply(&mut self, event: AlignmentEvent, config: &AlignmentConfig, step: &mut AlignmentStep) -> bool {
        let (next, command) = transition(self.state, event, config);
        if command.is_some() {
            step.command = command;
        }
        if next == self.state {
            return false;
        }
        debug!(from = %self.state, to = %next, "alignment state");
        self.state = next;
        step.entered.push(next);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::AlignmentState::*;
    use super::*;

    #[test]
    fn test_transition_table() {
        let config = AlignmentConfig::default();
        let covered = AlignmentEvent::Detector { covered: true };
        let uncovered = AlignmentEvent::Detector { covered: false };

        assert_eq!(transition(Uncovered, covered, &config), (Covered, None));
        assert_eq!(transition(Covered, uncovered, &config), (Uncovered, None));
        assert!(matches!(
            transition(Covered, covered, &config),
            (Setting, Some(ActuatorCommand::MoveRelative { .. }))
        ));
        assert_eq!(
            transition(Setting, uncovered, &config),
            (
                SettingCovered,
                Some(ActuatorCommand::MoveRelative {
                    delta: -280.0,
                    velocity: 100.0
                })
            )
        );
        assert_eq!(transition(SettingCovered, AlignmentEvent::MoveSettled, &config), (Finished, None));
        // Finished ignores everything
        assert_eq!(transition(Finished, covered, &config), (Finished, None));
        assert_eq!(transition(Finished, AlignmentEvent::MoveSettled, &config), (Finished, None));
    }

    #[test]
    fn test_detector_sequence_runs_pipeline_once() {
        let config = AlignmentConfig::default();
        let mut machine = AlignmentMachine::new();
        machine.arm(&config);

        let mut visited = vec![machine.state()];
        let mut commands = Vec::new();
        for covered in [false, true, false] {
            let step = machine.step(covered, 280.0, &config);
            visited.extend(step.entered);
            commands.extend(step.command);
        }
        // the centering move has finished
        let step = machine.step(false, 3.0, &config);
        visited.extend(step.entered);
        assert_eq!(step.command, None);

        assert_eq!(visited, vec![Uncovered, Covered, Setting, SettingCovered, Finished]);
        assert_eq!(
            commands,
            vec![
                ActuatorCommand::Velocity(-100.0),
                ActuatorCommand::MoveRelative {
                    delta: 120.0,
                    velocity: 100.0
                },
                ActuatorCommand::MoveRelative {
                    delta: -280.0,
                    velocity: 100.0
                },
            ]
        );
        assert!(!machine.is_armed());

        // no further automatic motion until re-armed
        for covered in [true, false, true] {
            let step = machine.step(covered, 0.0, &config);
            assert!(!step.active);
            assert_eq!(step.command, None);
            assert!(step.entered.is_empty());
        }
        assert_eq!(machine.state(), Finished);
    }

    #[test]
    fn test_timeout_disarms() {
        let config = AlignmentConfig {
            timeout_ticks: 3,
            ..AlignmentConfig::default()
        };
        let mut machine = AlignmentMachine::new();
        machine.arm(&config);
        for _ in 0..3 {
            assert!(machine.step(false, 0.0, &config).active);
        }
        assert!(!machine.is_armed());
        assert!(!machine.step(false, 0.0, &config).active);
    }

    #[test]
    fn test_refresh_only_extends_an_armed_run() {
        let config = AlignmentConfig {
            timeout_ticks: 2,
            ..AlignmentConfig::default()
        };
        let mut machine = AlignmentMachine::new();
        machine.refresh(&config);
        assert!(!machine.is_armed());

        machine.arm(&config);
        machine.step(false, 0.0, &config);
        machine.refresh(&config);
        machine.step(false, 0.0, &config);
        assert!(machine.is_armed());
    }

    #[test]
    fn test_rearm_restarts_from_uncovered() {
        let config = AlignmentConfig::default();
        let mut machine = AlignmentMachine::new();
        machine.arm(&config);
        machine.step(true, 0.0, &config);
        assert_eq!(machine.state(), Setting);
        machine.arm(&config);
        assert_eq!(machine.state(), Uncovered);
    }
}
