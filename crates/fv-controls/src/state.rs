//! Per-room mutable controller state.

use fv_core::{Real, Timestamp};
use serde::{Deserialize, Serialize};

use crate::config::ControllerConfig;
use crate::error::{ControlError, ControlResult};
use crate::exercise::{ExercisePhase, ExerciseState};
use crate::pid::PidTerms;

/// Memory carried by the PID between ticks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PidMemory {
    /// Accumulated error (°C·s), bounded by `ControllerConfig::integral_limit`.
    pub integral_error: Real,
    /// Error at the last PID update.
    pub last_error: Option<Real>,
    /// Measured temperature at the last sample, used for the derivative on measurement.
    pub last_derivative_sample_temperature: Option<Real>,
    /// Time of the last sample.
    pub last_sample_time: Option<Timestamp>,
}

impl PidMemory {
    /// Forget all history. The next sample primes the derivative again.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record a measurement without touching the integral.
    pub fn observe(&mut self, now: Timestamp, temperature: Real) {
        self.last_derivative_sample_temperature = Some(temperature);
        self.last_sample_time = Some(now);
    }

    /// Re-apply the anti-windup bound, e.g. after `ki` or `max_step_percent` changed.
    pub fn clamp_integral(&mut self, limit: Real) {
        self.integral_error = self.integral_error.clamp(-limit, limit);
    }
}

/// Mutable state of one room's controller.
///
/// A default-constructed state (integral 0, valve closed, no history) is a valid
/// starting point after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    pub current_temperature: Option<Real>,
    pub target_temperature: Option<Real>,
    pub heating_enabled: bool,
    /// Last percent delivered to the valve sink.
    pub commanded_position: u8,
    /// Last computed percent before rate limiting.
    pub desired_position: u8,
    pub pid: PidMemory,
    /// Breakdown of the last PID evaluation, for diagnostics.
    pub last_pid_terms: Option<PidTerms>,
    /// Externally supplied feedforward scalar (e.g. outdoor temperature deficit).
    pub feedforward_signal: Option<Real>,
    /// Only advances when a command is actually delivered.
    pub last_command_time: Option<Timestamp>,
    pub exercise: ExerciseState,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            current_temperature: None,
            target_temperature: None,
            heating_enabled: true,
            commanded_position: 0,
            desired_position: 0,
            pid: PidMemory::default(),
            last_pid_terms: None,
            feedforward_signal: None,
            last_command_time: None,
            exercise: ExerciseState::default(),
        }
    }
}

impl ControllerState {
    pub fn new(target_temperature: Real) -> Self {
        Self {
            target_temperature: Some(target_temperature),
            ..Self::default()
        }
    }

    /// `target - current`, when both are known.
    pub fn error(&self) -> Option<Real> {
        match (self.target_temperature, self.current_temperature) {
            (Some(target), Some(current)) => Some(target - current),
            _ => None,
        }
    }

    /// Reset the memory that would cause a discontinuity across a mode change.
    pub fn reset_transient(&mut self) {
        self.pid.reset();
        self.last_pid_terms = None;
    }

    /// Pull the desired position and the integral back within a (possibly new)
    /// configuration. The commanded position reflects what the valve was told and is
    /// only corrected by emitting a new command.
    pub fn conform_to(&mut self, config: &ControllerConfig) {
        self.desired_position = self.desired_position.min(config.max_step_percent());
        self.pid.clamp_integral(config.integral_limit());
    }

    /// Verify the state invariants against `config`.
    ///
    /// While an exercise is running the valve is driven to 100% and 0%, so the
    /// commanded position is only bounded by `max_step_percent` when idle.
    pub fn check_invariants(&self, config: &ControllerConfig) -> ControlResult<()> {
        let max = config.max_step_percent();
        if self.desired_position > max {
            return Err(ControlError::StateError {
                what: format!(
                    "desired position {}% above max step {}%",
                    self.desired_position, max
                ),
            });
        }
        if self.exercise.phase == ExercisePhase::Idle && self.commanded_position > max {
            return Err(ControlError::StateError {
                what: format!(
                    "commanded position {}% above max step {}%",
                    self.commanded_position, max
                ),
            });
        }
        let bound = config.integral_limit();
        if self.pid.integral_error.abs() > bound * (1.0 + 1e-9) {
            return Err(ControlError::StateError {
                what: format!(
                    "integral {} outside anti-windup bound {}",
                    self.pid.integral_error, bound
                ),
            });
        }
        Ok(())
    }
}
