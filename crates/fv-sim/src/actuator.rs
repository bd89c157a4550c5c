//! Thermoelectric valve motor: first-order lag toward the command, rate limited.

use fv_core::FULL_OPEN_PERCENT;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Motor dynamics: `dp/dt = (cmd - p) / tau`, clamped to `±rate_limit`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValveMotor {
    /// Time constant (seconds).
    pub tau_s: f64,
    /// Maximum stroke speed (%/s).
    pub rate_limit: f64,
}

impl ValveMotor {
    pub fn new(tau_s: f64, rate_limit: f64) -> SimResult<Self> {
        if !(tau_s > 0.0) {
            return Err(SimError::InvalidArg {
                what: "valve tau must be positive",
            });
        }
        if !(rate_limit > 0.0) {
            return Err(SimError::InvalidArg {
                what: "valve rate limit must be positive",
            });
        }
        Ok(Self { tau_s, rate_limit })
    }

    /// Position derivative in %/s.
    pub fn dpdt(&self, position: f64, command: f64) -> f64 {
        let raw = (command - position) / self.tau_s;
        raw.clamp(-self.rate_limit, self.rate_limit)
    }

    /// Explicit step, position kept within `[0, 100]`.
    pub fn step(&self, position: f64, dt: f64, command: f64) -> f64 {
        (position + self.dpdt(position, command) * dt).clamp(0.0, f64::from(FULL_OPEN_PERCENT))
    }

    /// Time for a full stroke at the rate limit.
    pub fn full_stroke_s(&self) -> f64 {
        f64::from(FULL_OPEN_PERCENT) / self.rate_limit
    }
}
