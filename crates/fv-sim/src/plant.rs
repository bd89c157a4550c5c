//! Lumped floor-heating room.
//!
//! Three states: valve position, slab temperature, room air temperature.
//!
//! ```text
//!   valve ──▶ heater power ──▶ slab ──UA_sr──▶ room ──UA_ro──▶ outdoor
//! ```

use serde::{Deserialize, Serialize};

use crate::actuator::ValveMotor;
use crate::error::{SimError, SimResult};
use crate::model::TransientModel;

/// Physical parameters of one room.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantParams {
    /// Heat delivered to the slab with the valve fully open (W).
    pub heater_power_w: f64,
    /// Slab heat capacity (J/K).
    pub slab_capacity_j_per_k: f64,
    /// Room air and furniture heat capacity (J/K).
    pub room_capacity_j_per_k: f64,
    /// Slab to room conductance (W/K).
    pub slab_to_room_w_per_k: f64,
    /// Room to outdoor conductance (W/K).
    pub room_to_outdoor_w_per_k: f64,
    pub valve_tau_s: f64,
    /// Valve stroke speed limit (%/s).
    pub valve_rate_limit: f64,
}

impl Default for PlantParams {
    fn default() -> Self {
        Self {
            heater_power_w: 3_000.0,
            slab_capacity_j_per_k: 6.0e6,
            room_capacity_j_per_k: 2.0e6,
            slab_to_room_w_per_k: 300.0,
            room_to_outdoor_w_per_k: 100.0,
            valve_tau_s: 60.0,
            valve_rate_limit: 0.5,
        }
    }
}

impl PlantParams {
    pub fn validate(&self) -> SimResult<()> {
        let positive = [
            (self.heater_power_w, "heater_power_w must be positive"),
            (self.slab_capacity_j_per_k, "slab_capacity_j_per_k must be positive"),
            (self.room_capacity_j_per_k, "room_capacity_j_per_k must be positive"),
            (self.slab_to_room_w_per_k, "slab_to_room_w_per_k must be positive"),
            (self.room_to_outdoor_w_per_k, "room_to_outdoor_w_per_k must be positive"),
        ];
        for (value, what) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::InvalidArg { what });
            }
        }
        ValveMotor::new(self.valve_tau_s, self.valve_rate_limit)?;
        Ok(())
    }

    /// Room temperature reached at a constant opening, in °C.
    pub fn steady_room_temperature(&self, valve_percent: f64, outdoor_c: f64) -> f64 {
        outdoor_c + valve_percent / 100.0 * self.heater_power_w / self.room_to_outdoor_w_per_k
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlantState {
    /// Actual valve position (%).
    pub valve: f64,
    pub slab_c: f64,
    pub room_c: f64,
}

/// Floor-heating room as a [`TransientModel`]. Command and outdoor temperature are
/// held constant over a step.
#[derive(Clone, Debug)]
pub struct FloorHeatingPlant {
    pub params: PlantParams,
    motor: ValveMotor,
    initial: PlantState,
    pub command_percent: f64,
    pub outdoor_c: f64,
}

impl FloorHeatingPlant {
    pub fn new(params: PlantParams, initial: PlantState, outdoor_c: f64) -> SimResult<Self> {
        params.validate()?;
        if !(initial.slab_c.is_finite() && initial.room_c.is_finite() && outdoor_c.is_finite()) {
            return Err(SimError::NonPhysical {
                what: "initial temperatures must be finite",
            });
        }
        let motor = ValveMotor::new(params.valve_tau_s, params.valve_rate_limit)?;
        Ok(Self {
            params,
            motor,
            initial,
            command_percent: initial.valve,
            outdoor_c,
        })
    }
}

impl TransientModel for FloorHeatingPlant {
    type State = PlantState;

    fn initial_state(&self) -> PlantState {
        self.initial
    }

    fn rhs(&mut self, _t: f64, x: &PlantState) -> SimResult<PlantState> {
        if !(x.room_c.is_finite() && x.slab_c.is_finite()) {
            return Err(SimError::NonPhysical {
                what: "temperature diverged",
            });
        }
        let p = &self.params;
        let opening = x.valve.clamp(0.0, 100.0) / 100.0;
        let heat_in = opening * p.heater_power_w;
        let slab_to_room = p.slab_to_room_w_per_k * (x.slab_c - x.room_c);
        let room_to_outdoor = p.room_to_outdoor_w_per_k * (x.room_c - self.outdoor_c);
        Ok(PlantState {
            valve: self.motor.dpdt(x.valve, self.command_percent),
            slab_c: (heat_in - slab_to_room) / p.slab_capacity_j_per_k,
            room_c: (slab_to_room - room_to_outdoor) / p.room_capacity_j_per_k,
        })
    }

    fn add(&self, a: &PlantState, b: &PlantState) -> PlantState {
        PlantState {
            valve: a.valve + b.valve,
            slab_c: a.slab_c + b.slab_c,
            room_c: a.room_c + b.room_c,
        }
    }

    fn scale(&self, a: &PlantState, scale: f64) -> PlantState {
        PlantState {
            valve: a.valve * scale,
            slab_c: a.slab_c * scale,
            room_c: a.room_c * scale,
        }
    }
}
