//! On/off control with a dead band.

use fv_core::Real;

use crate::config::ControllerConfig;
use crate::strategy::{ControlInput, Decision};

/// Opens to `max_step_percent` below `target - hysteresis`, closes at or above the target,
/// and holds the commanded position in between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HysteresisGate {
    pub hysteresis: Real,
    pub max_step_percent: u8,
}

impl HysteresisGate {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            hysteresis: config.hysteresis(),
            max_step_percent: config.max_step_percent(),
        }
    }

    pub fn decide(&self, input: &ControlInput) -> Decision {
        if !input.heating_enabled || input.current_temperature >= input.target_temperature {
            Decision::Set(0.0)
        } else if input.error() > self.hysteresis {
            Decision::Set(Real::from(self.max_step_percent))
        } else {
            Decision::Hold
        }
    }
}
