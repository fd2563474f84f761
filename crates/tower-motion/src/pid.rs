//! Discrete PID term used by the chassis controllers.
//!
//! Errors are sampled once per tick, so the derivative is the tick-to-tick
//! change and the integral is a plain running sum. The integral only
//! accumulates while the error is inside `integral_band`; outside it the sum is
//! cleared so the term cannot wind up during long approaches.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::MotionError;

/// Proportional, integral and derivative gains.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// The integral accumulates only while `|error| <= integral_band`.
    pub integral_band: f64,
}

impl PidGains {
    pub const fn new(kp: f64, ki: f64, kd: f64, integral_band: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral_band,
        }
    }

    pub fn validate(&self) -> Result<(), MotionError> {
        for gain in [self.kp, self.ki, self.kd] {
            if !gain.is_finite() || gain < 0.0 {
                return Err(MotionError::InvalidGain("gains must be finite and non-negative"));
            }
        }
        if !self.integral_band.is_finite() || self.integral_band < 0.0 {
            return Err(MotionError::InvalidTolerance(
                "integral band must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

/// Per-invocation PID state. Created fresh by every controller call.
#[derive(Debug, Clone)]
pub struct Pid {
    gains: PidGains,
    integral: f64,
    last_error: Option<f64>,
}

impl Pid {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: 0.0,
            last_error: None,
        }
    }

    /// Computes the output for this tick's error.
    pub fn update(&mut self, error: f64) -> f64 {
        if error.abs() <= self.gains.integral_band {
            self.integral += error;
        } else {
            self.integral = 0.0;
        }
        let derivative = match self.last_error {
            Some(last) => error - last,
            None => 0.0,
        };
        self.last_error = Some(error);

        self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// True while the integral term is contributing.
    pub fn integrating(&self) -> bool {
        self.gains.ki != 0.0 && self.integral != 0.0
    }
}
