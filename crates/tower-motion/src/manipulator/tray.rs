//! Tray position state machine.
//!
//! - `Returned -> Extending` on a deploy toggle.
//! - `Extending | Returning -> Returning` on a retract toggle.
//! - `Returning -> Returned` once the tray is settled near zero.
//!
//! Extending is never left automatically. Crossing the high watermark while
//! not returning forces Extending.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::hal::ActuatorCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrayState {
    #[default]
    Returned,
    Returning,
    Extending,
}

impl fmt::Display for TrayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrayState::Returned => "returned",
            TrayState::Returning => "returning",
            TrayState::Extending => "extending",
        };
        f.write_str(s)
    }
}

/// A deploy target for the tray motor.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeployPreset {
    pub position: f64,
    pub velocity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrayEvent {
    /// The operator toggled the tray. Deploys with the preset when Returned,
    /// otherwise retracts.
    Toggle(DeployPreset),
    /// Measured tray motor position and velocity.
    Measured { position: f64, velocity: f64 },
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct TrayConfig {
    /// Normal stacking deploy.
    pub deploy: DeployPreset,
    /// Slower, further deploy for tall stacks.
    pub deploy_alt: DeployPreset,
    pub return_velocity: f64,
    /// Returning becomes Returned at or below this position...
    pub returned_position: f64,
    /// ...while moving no faster than this.
    pub returned_velocity: f64,
    /// Positions at or above this force Extending unless returning.
    pub watermark: f64,
    /// Assist target while the lift is above stacking height.
    pub assist_position: f64,
    pub assist_velocity: f64,
    /// Manual slew speeds under the shift override.
    pub slew_forward: f64,
    pub slew_forward_slow: f64,
    /// Forward slew slows down past this position.
    pub slew_slow_above: f64,
    pub slew_reverse: f64,
    pub slew_reverse_slow: f64,
    /// Reverse slew slows down below this position.
    pub slew_slow_below: f64,
}

impl Default for TrayConfig {
    fn default() -> Self {
        Self {
            deploy: DeployPreset {
                position: 6300.0,
                velocity: 90.0,
            },
            deploy_alt: DeployPreset {
                position: 6600.0,
                velocity: 65.0,
            },
            return_velocity: 100.0,
            returned_position: 100.0,
            returned_velocity: 5.0,
            watermark: 6000.0,
            assist_position: 600.0,
            assist_velocity: 100.0,
            slew_forward: 100.0,
            slew_forward_slow: 40.0,
            slew_slow_above: 4500.0,
            slew_reverse: -100.0,
            slew_reverse_slow: -60.0,
            slew_slow_below: 1000.0,
        }
    }
}

impl TrayConfig {
    /// Manual slew command for the shift override.
    pub fn slew(&self, forward: bool, position: f64) -> ActuatorCommand {
        let velocity = if forward {
            if position > self.slew_slow_above {
                self.slew_forward_slow
            } else {
                self.slew_forward
            }
        } else if position < self.slew_slow_below {
            self.slew_reverse_slow
        } else {
            self.slew_reverse
        };
        ActuatorCommand::Velocity(velocity)
    }
}

/// Pure transition function. Returns the next state and the motion command
/// the transition requires, if any.
pub fn transition(
    state: TrayState,
    event: TrayEvent,
    config: &TrayConfig,
) -> (TrayState, Option<ActuatorCommand>) {
    match event {
        TrayEvent::Toggle(preset) if state == TrayState::Returned => (
            TrayState::Extending,
            Some(ActuatorCommand::MoveAbsolute {
                position: preset.position,
                velocity: preset.velocity,
            }),
        ),
        TrayEvent::Toggle(_) => (
            TrayState::Returning,
            Some(ActuatorCommand::MoveAbsolute {
                position: 0.0,
                velocity: config.return_velocity,
            }),
        ),
        TrayEvent::Measured { position, velocity } => {
            if state != TrayState::Extending
                && position <= config.returned_position
                && velocity.abs() <= config.returned_velocity
            {
                (TrayState::Returned, None)
            } else if state != TrayState::Returning && position >= config.watermark {
                (TrayState::Extending, None)
            } else {
                (state, None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measured(position: f64, velocity: f64) -> TrayEvent {
        TrayEvent::Measured { position, velocity }
    }

    #[test]
    fn test_deploy_from_returned_issues_preset_move() {
        let config = TrayConfig::default();
        let (next, command) = transition(TrayState::Returned, TrayEvent::Toggle(config.deploy), &config);
        assert_eq!(next, TrayState::Extending);
        assert_eq!(
            command,
            Some(ActuatorCommand::MoveAbsolute {
                position: 6300.0,
                velocity: 90.0
            })
        );
    }

    #[test]
    fn test_toggle_while_out_retracts() {
        let config = TrayConfig::default();
        for state in [TrayState::Extending, TrayState::Returning] {
            let (next, command) = transition(state, TrayEvent::Toggle(config.deploy_alt), &config);
            assert_eq!(next, TrayState::Returning);
            assert_eq!(
                command,
                Some(ActuatorCommand::MoveAbsolute {
                    position: 0.0,
                    velocity: 100.0
                })
            );
        }
    }

    #[test]
    fn test_returning_settles_into_returned() {
        let config = TrayConfig::default();
        // still moving
        assert_eq!(transition(TrayState::Returning, measured(80.0, 40.0), &config).0, TrayState::Returning);
        assert_eq!(transition(TrayState::Returning, measured(80.0, 2.0), &config).0, TrayState::Returned);
    }

    #[test]
    fn test_extending_is_never_left_automatically() {
        let config = TrayConfig::default();
        assert_eq!(transition(TrayState::Extending, measured(0.0, 0.0), &config).0, TrayState::Extending);
    }

    #[test]
    fn test_watermark_forces_extending() {
        let config = TrayConfig::default();
        assert_eq!(
            transition(TrayState::Returned, measured(6100.0, 0.0), &config),
            (TrayState::Extending, None)
        );
        // returning through the watermark is expected
        assert_eq!(transition(TrayState::Returning, measured(6100.0, -100.0), &config).0, TrayState::Returning);
    }

    #[test]
    fn test_slew_speeds() {
        let config = TrayConfig::default();
        assert_eq!(config.slew(true, 1000.0), ActuatorCommand::Velocity(100.0));
        assert_eq!(config.slew(true, 5000.0), ActuatorCommand::Velocity(40.0));
        assert_eq!(config.slew(false, 5000.0), ActuatorCommand::Velocity(-100.0));
        assert_eq!(config.slew(false, 500.0), ActuatorCommand::Velocity(-60.0));
    }
}
