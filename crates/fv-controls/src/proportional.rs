//! Stateless proportional control beyond the dead band.

use fv_core::{Real, clamp_percent};

use crate::config::ControllerConfig;
use crate::strategy::ControlInput;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProportionalStrategy {
    pub hysteresis: Real,
    /// %/°C
    pub gain: Real,
    pub max_step_percent: u8,
}

impl ProportionalStrategy {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            hysteresis: config.hysteresis(),
            gain: config.proportional_gain(),
            max_step_percent: config.max_step_percent(),
        }
    }

    /// `clamp((error - hysteresis) * gain, 0, max_step_percent)`, zero inside the dead band.
    pub fn output(&self, input: &ControlInput) -> Real {
        let error = input.error();
        if !input.heating_enabled || !error.is_finite() || error <= self.hysteresis {
            return 0.0;
        }
        clamp_percent((error - self.hysteresis) * self.gain, self.max_step_percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fv_core::Timestamp;

    fn input(current: Real, target: Real) -> ControlInput {
        ControlInput {
            now: Timestamp::ZERO,
            current_temperature: current,
            target_temperature: target,
            heating_enabled: true,
            commanded_position: 0,
            feedforward_signal: None,
        }
    }

    #[test]
    fn formula_matches_worked_example() {
        let strategy = ProportionalStrategy {
            hysteresis: 0.5,
            gain: 20.0,
            max_step_percent: 40,
        };
        assert!((strategy.output(&input(20.5, 22.0)) - 20.0).abs() < 1e-12);
    }

    #[test]
    fn saturates_at_max_step() {
        let strategy = ProportionalStrategy {
            hysteresis: 0.5,
            gain: 20.0,
            max_step_percent: 40,
        };
        assert_eq!(strategy.output(&input(15.0, 22.0)), 40.0);
    }

    #[test]
    fn zero_inside_dead_band() {
        let strategy = ProportionalStrategy {
            hysteresis: 0.5,
            gain: 20.0,
            max_step_percent: 80,
        };
        assert_eq!(strategy.output(&input(21.5, 22.0)), 0.0);
        assert_eq!(strategy.output(&input(23.0, 22.0)), 0.0);
    }
}
