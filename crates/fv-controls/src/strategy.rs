//! Closed set of control strategies, selected by [`ControlMode`].

use fv_core::{Real, Timestamp, quantize_percent};

use crate::binary::HysteresisGate;
use crate::config::{ControlMode, ControllerConfig};
use crate::pid::{PidController, PidTerms, PidUpdate};
use crate::proportional::ProportionalStrategy;
use crate::state::PidMemory;

/// Everything a strategy may look at for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlInput {
    pub now: Timestamp,
    pub current_temperature: Real,
    pub target_temperature: Real,
    pub heating_enabled: bool,
    /// Last percent delivered to the valve, held by the binary dead band.
    pub commanded_position: u8,
    pub feedforward_signal: Option<Real>,
}

impl ControlInput {
    /// `target - current` in °C.
    pub fn error(&self) -> Real {
        self.target_temperature - self.current_temperature
    }
}

/// Raw strategy decision, before quantization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Open to this many percent.
    Set(Real),
    /// Keep the commanded position.
    Hold,
    /// No new decision this tick; the previous desired position stands.
    Skip,
}

impl Decision {
    /// Turn the decision into a whole percent within `[0, max_percent]`.
    ///
    /// `None` for [`Decision::Skip`].
    pub fn resolve(self, commanded: u8, resolution: u8, max_percent: u8) -> Option<u8> {
        match self {
            Decision::Set(v) => Some(quantize_percent(v, resolution, max_percent)),
            Decision::Hold => Some(commanded.min(max_percent)),
            Decision::Skip => None,
        }
    }
}

/// Result of one strategy evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyOutput {
    pub decision: Decision,
    /// Only set by the PID strategy when it produced an output.
    pub pid_terms: Option<PidTerms>,
}

impl StrategyOutput {
    fn plain(decision: Decision) -> Self {
        Self {
            decision,
            pid_terms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlStrategy {
    Binary(HysteresisGate),
    Proportional(ProportionalStrategy),
    Pid(PidController),
}

impl ControlStrategy {
    pub fn from_config(config: &ControllerConfig) -> Self {
        match config.mode() {
            ControlMode::Binary => ControlStrategy::Binary(HysteresisGate::from_config(config)),
            ControlMode::Proportional => {
                ControlStrategy::Proportional(ProportionalStrategy::from_config(config))
            }
            ControlMode::Pid => ControlStrategy::Pid(PidController::from_config(config)),
        }
    }

    pub fn mode(&self) -> ControlMode {
        match self {
            ControlStrategy::Binary(_) => ControlMode::Binary,
            ControlStrategy::Proportional(_) => ControlMode::Proportional,
            ControlStrategy::Pid(_) => ControlMode::Pid,
        }
    }

    /// Evaluate the strategy and advance the PID memory.
    ///
    /// The measurement sample is recorded on every call in every mode. The integral is
    /// only touched by the PID strategy, and never while heating is disabled.
    pub fn evaluate(&self, input: &ControlInput, memory: &mut PidMemory) -> StrategyOutput {
        if !input.heating_enabled {
            memory.observe(input.now, input.current_temperature);
            return StrategyOutput::plain(Decision::Set(0.0));
        }
        match self {
            ControlStrategy::Binary(gate) => {
                memory.observe(input.now, input.current_temperature);
                StrategyOutput::plain(gate.decide(input))
            }
            ControlStrategy::Proportional(strategy) => {
                memory.observe(input.now, input.current_temperature);
                StrategyOutput::plain(Decision::Set(strategy.output(input)))
            }
            ControlStrategy::Pid(pid) => {
                let (next, update) = pid.update(memory, input);
                *memory = next;
                match update {
                    PidUpdate::Output(terms) => StrategyOutput {
                        decision: Decision::Set(terms.output),
                        pid_terms: Some(terms),
                    },
                    PidUpdate::Skipped(_) => StrategyOutput::plain(Decision::Skip),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(now: f64, current: f64, target: f64, commanded: u8) -> ControlInput {
        ControlInput {
            now: Timestamp::from_secs(now),
            current_temperature: current,
            target_temperature: target,
            heating_enabled: true,
            commanded_position: commanded,
            feedforward_signal: None,
        }
    }

    #[test]
    fn strategy_follows_mode() {
        for mode in ControlMode::ALL {
            let cfg = ControllerConfig::builder().with_mode(mode).build().unwrap();
            assert_eq!(ControlStrategy::from_config(&cfg).mode(), mode);
        }
    }

    #[test]
    fn disabled_heating_closes_in_every_mode() {
        for mode in ControlMode::ALL {
            let cfg = ControllerConfig::builder().with_mode(mode).build().unwrap();
            let strategy = ControlStrategy::from_config(&cfg);
            let mut memory = PidMemory::default();
            memory.integral_error = 100.0;
            let mut tick = input(0.0, 15.0, 22.0, 80);
            tick.heating_enabled = false;
            let out = strategy.evaluate(&tick, &mut memory);
            assert_eq!(out.decision, Decision::Set(0.0));
            assert_eq!(memory.integral_error, 100.0);
        }
    }

    #[test]
    fn pid_skip_makes_no_decision() {
        let strategy = ControlStrategy::from_config(&ControllerConfig::default());
        let mut memory = PidMemory::default();
        let out = strategy.evaluate(&input(0.0, 20.0, 21.0, 35), &mut memory);
        assert_eq!(out.decision, Decision::Skip);
        assert_eq!(out.decision.resolve(35, 1, 80), None);
        assert!(out.pid_terms.is_none());
    }

    #[test]
    fn binary_mode_still_records_samples() {
        let cfg = ControllerConfig::builder()
            .with_mode(ControlMode::Binary)
            .build()
            .unwrap();
        let strategy = ControlStrategy::from_config(&cfg);
        let mut memory = PidMemory::default();
        strategy.evaluate(&input(60.0, 20.4, 22.0, 0), &mut memory);
        assert_eq!(memory.last_derivative_sample_temperature, Some(20.4));
        assert_eq!(memory.integral_error, 0.0);
    }

    #[test]
    fn resolve_quantizes_and_caps() {
        assert_eq!(Decision::Set(47.4).resolve(0, 1, 80), Some(47));
        assert_eq!(Decision::Set(47.4).resolve(0, 20, 80), Some(40));
        assert_eq!(Decision::Set(95.0).resolve(0, 1, 80), Some(80));
        assert_eq!(Decision::Hold.resolve(100, 1, 60), Some(60));
    }
}
