//! PID controller with feedforward for slow floor-heating loops.
//!
//! - **P**: `kp * error`
//! - **I**: `ki * integral`, integral clamped to `ControllerConfig::integral_limit`
//! - **D**: on measurement, `-kd * d(temperature)/dt`, so setpoint steps cause no kick
//! - **FF**: `ka * feedforward_signal`, zero when no signal is supplied
//!
//! Output is clamped to `[0, max_step_percent]`. While the output is saturated in the
//! direction of the error, the integral accumulation of that tick is rolled back.

use fv_core::Real;
use serde::{Deserialize, Serialize};

use crate::config::ControllerConfig;
use crate::error::{ControlError, ControlResult};
use crate::state::PidMemory;
use crate::strategy::ControlInput;

/// PID controller parameters, derived from a validated [`ControllerConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct PidController {
    /// Proportional gain (%/°C).
    pub kp: Real,
    /// Integral gain (%/(°C·s)).
    pub ki: Real,
    /// Derivative gain (%·s/°C).
    pub kd: Real,
    /// Feedforward gain.
    pub ka: Real,
    /// Output ceiling, the room's `max_step_percent`.
    pub out_max: Real,
    /// Integral windup limit.
    pub integral_limit: Real,
    /// Longest elapsed time accepted for an I/D update (seconds).
    pub max_dt: Real,
}

/// Contribution of each term to one PID evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidTerms {
    pub p: Real,
    pub i: Real,
    pub d: Real,
    pub ff: Real,
    /// Unclamped sum.
    pub raw: Real,
    /// Clamped output in percent.
    pub output: Real,
    /// The integral accumulation of this tick was rolled back.
    pub windup_blocked: bool,
}

/// Why a PID tick produced no new output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidSkip {
    /// First sample after construction, restart, or mode change.
    NoHistory,
    /// Zero or negative elapsed time: duplicate delivery or clock anomaly.
    NonPositiveDt,
    /// Elapsed time above `max_dt`, e.g. missed ticks after a restart.
    DtTooLarge,
}

/// Result of a PID tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PidUpdate {
    Output(PidTerms),
    /// Keep the previously commanded value.
    Skipped(PidSkip),
}

impl PidController {
    /// Create a PID controller.
    ///
    /// # Errors
    ///
    /// Returns an error if a gain is non-finite, `out_max` is outside `[0, 100]`, or
    /// `max_dt` is not positive.
    pub fn new(
        kp: Real,
        ki: Real,
        kd: Real,
        ka: Real,
        out_max: Real,
        max_dt: Real,
    ) -> ControlResult<Self> {
        if ![kp, ki, kd, ka].iter().all(|g| g.is_finite()) {
            return Err(ControlError::InvalidArg {
                what: "PID gains must be finite",
            });
        }
        if !(0.0..=100.0).contains(&out_max) {
            return Err(ControlError::InvalidArg {
                what: "out_max must be within [0, 100]",
            });
        }
        if !(max_dt > 0.0) {
            return Err(ControlError::InvalidArg {
                what: "max_dt must be positive",
            });
        }
        let integral_limit = if ki == 0.0 { 0.0 } else { out_max / ki.abs() };
        Ok(Self {
            kp,
            ki,
            kd,
            ka,
            out_max,
            integral_limit,
            max_dt,
        })
    }

    /// Build from a validated configuration. Cannot fail.
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            kp: config.kp(),
            ki: config.ki(),
            kd: config.kd(),
            ka: config.ka(),
            out_max: Real::from(config.max_step_percent()),
            integral_limit: config.integral_limit(),
            max_dt: config.pid_max_dt_s(),
        }
    }

    /// Compute the controller output for one tick.
    ///
    /// # Returns
    ///
    /// Updated memory and the tick result. On `NonPositiveDt` the memory is returned
    /// unchanged, so a duplicated event never moves the integral.
    pub fn update(&self, memory: &PidMemory, input: &ControlInput) -> (PidMemory, PidUpdate) {
        let temperature = input.current_temperature;
        let error = input.error();

        let (last_time, last_temperature) = match (
            memory.last_sample_time,
            memory.last_derivative_sample_temperature,
        ) {
            (Some(t), Some(temp)) => (t, temp),
            _ => {
                let mut primed = memory.clone();
                primed.observe(input.now, temperature);
                primed.last_error = Some(error);
                return (primed, PidUpdate::Skipped(PidSkip::NoHistory));
            }
        };

        let dt = input.now.secs_since(last_time);
        if !(dt > 0.0) || !dt.is_finite() {
            return (memory.clone(), PidUpdate::Skipped(PidSkip::NonPositiveDt));
        }
        if dt > self.max_dt {
            let mut resynced = memory.clone();
            resynced.observe(input.now, temperature);
            resynced.last_error = Some(error);
            return (resynced, PidUpdate::Skipped(PidSkip::DtTooLarge));
        }

        // Proportional term
        let p = self.kp * error;

        // Integral term, clamped so |ki * integral| <= out_max
        let candidate_integral =
            (memory.integral_error + error * dt).clamp(-self.integral_limit, self.integral_limit);
        let i = self.ki * candidate_integral;

        // Derivative on measurement: warming reduces output
        let derivative = (temperature - last_temperature) / dt;
        let d = -self.kd * derivative;

        let ff = self.ka * input.feedforward_signal.unwrap_or(0.0);

        let raw = p + i + d + ff;
        let output = raw.clamp(0.0, self.out_max);

        // Anti-windup: do not integrate while saturated in the direction of the error
        let windup_blocked = output != raw
            && ((raw > self.out_max && error > 0.0) || (raw < 0.0 && error < 0.0));
        let integral_error = if windup_blocked {
            memory.integral_error
        } else {
            candidate_integral
        };

        let new_memory = PidMemory {
            integral_error,
            last_error: Some(error),
            last_derivative_sample_temperature: Some(temperature),
            last_sample_time: Some(input.now),
        };

        let terms = PidTerms {
            p,
            i,
            d,
            ff,
            raw,
            output,
            windup_blocked,
        };

        (new_memory, PidUpdate::Output(terms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fv_core::Timestamp;

    fn input(now: f64, current: f64, target: f64) -> ControlInput {
        ControlInput {
            now: Timestamp::from_secs(now),
            current_temperature: current,
            target_temperature: target,
            heating_enabled: true,
            commanded_position: 0,
            feedforward_signal: None,
        }
    }

    fn primed(pid: &PidController, now: f64, current: f64, target: f64) -> PidMemory {
        let (memory, update) = pid.update(&PidMemory::default(), &input(now, current, target));
        assert_eq!(update, PidUpdate::Skipped(PidSkip::NoHistory));
        memory
    }

    #[test]
    fn pid_controller_creation() {
        let pid = PidController::new(20.0, 0.01, 500.0, 0.0, 80.0, 3600.0).unwrap();
        assert_eq!(pid.kp, 20.0);
        assert_eq!(pid.integral_limit, 8000.0);
    }

    #[test]
    fn invalid_controller_params() {
        assert!(PidController::new(f64::NAN, 0.0, 0.0, 0.0, 80.0, 60.0).is_err());
        assert!(PidController::new(1.0, 0.0, 0.0, 0.0, 120.0, 60.0).is_err());
        assert!(PidController::new(1.0, 0.0, 0.0, 0.0, 80.0, 0.0).is_err());
    }

    #[test]
    fn first_sample_primes_history() {
        let pid = PidController::from_config(&ControllerConfig::default());
        let memory = primed(&pid, 0.0, 20.0, 21.0);
        assert_eq!(memory.last_derivative_sample_temperature, Some(20.0));
        assert_eq!(memory.last_error, Some(1.0));
        assert_eq!(memory.integral_error, 0.0);
    }

    #[test]
    fn proportional_and_integral_action() {
        let pid = PidController::new(10.0, 0.01, 0.0, 0.0, 100.0, 3600.0).unwrap();
        let memory = primed(&pid, 0.0, 20.0, 21.0);
        let (memory, update) = pid.update(&memory, &input(300.0, 20.0, 21.0));
        let PidUpdate::Output(terms) = update else {
            panic!("expected output");
        };
        assert!((terms.p - 10.0).abs() < 1e-12);
        assert!((memory.integral_error - 300.0).abs() < 1e-9);
        assert!((terms.i - 3.0).abs() < 1e-9);
        assert!((terms.output - 13.0).abs() < 1e-9);
    }

    #[test]
    fn warming_room_reduces_output() {
        let pid = PidController::new(10.0, 0.0, 600.0, 0.0, 100.0, 3600.0).unwrap();
        let memory = primed(&pid, 0.0, 20.0, 22.0);
        // +0.1 °C over 300 s
        let (_, update) = pid.update(&memory, &input(300.0, 20.1, 22.0));
        let PidUpdate::Output(terms) = update else {
            panic!("expected output");
        };
        assert!((terms.d + 0.2).abs() < 1e-9);
        assert!(terms.output < terms.p);
    }

    #[test]
    fn setpoint_step_has_no_derivative_kick() {
        let pid = PidController::from_config(&ControllerConfig::default());
        let memory = primed(&pid, 0.0, 18.0, 18.0);
        let (_, update) = pid.update(&memory, &input(300.0, 18.0, 22.0));
        let PidUpdate::Output(terms) = update else {
            panic!("expected output");
        };
        assert_eq!(terms.d, 0.0);
    }

    #[test]
    fn feedforward_adds_to_output() {
        let pid = PidController::new(0.0, 0.0, 0.0, 2.0, 100.0, 3600.0).unwrap();
        let memory = primed(&pid, 0.0, 21.0, 21.0);
        let mut tick = input(60.0, 21.0, 21.0);
        tick.feedforward_signal = Some(15.0);
        let (_, update) = pid.update(&memory, &tick);
        let PidUpdate::Output(terms) = update else {
            panic!("expected output");
        };
        assert_eq!(terms.ff, 30.0);
        assert_eq!(terms.output, 30.0);
    }

    #[test]
    fn duplicate_tick_leaves_memory_untouched() {
        let pid = PidController::from_config(&ControllerConfig::default());
        let memory = primed(&pid, 0.0, 20.0, 21.0);
        let (memory, _) = pid.update(&memory, &input(300.0, 20.0, 21.0));
        let (again, update) = pid.update(&memory, &input(300.0, 20.0, 21.0));
        assert_eq!(update, PidUpdate::Skipped(PidSkip::NonPositiveDt));
        assert_eq!(again, memory);
    }

    #[test]
    fn clock_going_backwards_is_skipped() {
        let pid = PidController::from_config(&ControllerConfig::default());
        let memory = primed(&pid, 1000.0, 20.0, 21.0);
        let (again, update) = pid.update(&memory, &input(900.0, 20.0, 21.0));
        assert_eq!(update, PidUpdate::Skipped(PidSkip::NonPositiveDt));
        assert_eq!(again, memory);
    }

    #[test]
    fn long_gap_resyncs_without_integrating() {
        let pid = PidController::from_config(&ControllerConfig::default());
        let memory = primed(&pid, 0.0, 20.0, 21.0);
        let (memory, update) = pid.update(&memory, &input(10.0 * 3600.0, 19.0, 21.0));
        assert_eq!(update, PidUpdate::Skipped(PidSkip::DtTooLarge));
        assert_eq!(memory.integral_error, 0.0);
        assert_eq!(memory.last_derivative_sample_temperature, Some(19.0));
    }

    #[test]
    fn saturation_blocks_integral_growth() {
        let pid = PidController::from_config(&ControllerConfig::default());
        let mut memory = primed(&pid, 0.0, 15.0, 22.0);
        for k in 1..=500 {
            let (next, update) = pid.update(&memory, &input(k as f64 * 300.0, 15.0, 22.0));
            let PidUpdate::Output(terms) = update else {
                panic!("expected output");
            };
            assert_eq!(terms.output, 80.0);
            assert!(terms.windup_blocked);
            memory = next;
        }
        assert_eq!(memory.integral_error, 0.0);
    }

    #[test]
    fn no_overshoot_after_long_saturation() {
        let pid = PidController::from_config(&ControllerConfig::default());
        let mut memory = primed(&pid, 0.0, 15.0, 22.0);
        let mut now = 0.0;
        for _ in 0..500 {
            now += 300.0;
            memory = pid.update(&memory, &input(now, 15.0, 22.0)).0;
        }

        // Window closed: the room is back within 0.1 °C of the setpoint.
        for _ in 0..3 {
            now += 300.0;
            let (next, update) = pid.update(&memory, &input(now, 21.9, 22.0));
            let PidUpdate::Output(terms) = update else {
                panic!("expected output");
            };
            assert!(terms.output < 5.0, "output {}", terms.output);
            assert!(terms.i < 1.0, "residual integral term {}", terms.i);
            memory = next;
        }
    }

    #[test]
    fn integral_unwinds_while_saturated_low() {
        // Saturated at zero with a positive error: integration must continue.
        let pid = PidController::new(1.0, 0.01, 0.0, -10.0, 80.0, 3600.0).unwrap();
        let memory = primed(&pid, 0.0, 20.0, 21.0);
        let mut tick = input(300.0, 20.0, 21.0);
        tick.feedforward_signal = Some(5.0);
        let (memory, update) = pid.update(&memory, &tick);
        let PidUpdate::Output(terms) = update else {
            panic!("expected output");
        };
        assert_eq!(terms.output, 0.0);
        assert!(!terms.windup_blocked);
        assert!((memory.integral_error - 300.0).abs() < 1e-9);
    }
}
