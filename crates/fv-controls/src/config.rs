//! Controller configuration.
//!
//! `ControllerConfig` is the one canonical set of tuning parameters for a room. It is
//! only obtainable through [`ControllerConfigBuilder::build`] (or `Default`), so every
//! instance reaching the control loop has passed validation.

use std::fmt;
use std::str::FromStr;

use fv_core::time::{SECONDS_PER_DAY, minutes};
use fv_core::{FULL_OPEN_PERCENT, Real};
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};

pub const DEFAULT_TARGET_MIN: Real = 6.0;
pub const DEFAULT_TARGET_MAX: Real = 28.0;
pub const DEFAULT_HYSTERESIS: Real = 0.5;
pub const DEFAULT_MAX_STEP_PERCENT: u8 = 80;
pub const DEFAULT_MIN_CYCLE_DURATION_S: Real = 600.0;
pub const DEFAULT_KP: Real = 20.0;
pub const DEFAULT_KI: Real = 0.01;
pub const DEFAULT_KD: Real = 500.0;
pub const DEFAULT_KA: Real = 0.0;
pub const DEFAULT_PROPORTIONAL_GAIN: Real = 10.0;
pub const DEFAULT_EXERCISE_INTERVAL_S: Real = 7.0 * SECONDS_PER_DAY;
pub const DEFAULT_PID_MAX_DT_S: Real = 3_600.0;
pub const DEFAULT_FEEDBACK_TOLERANCE_PERCENT: Real = 5.0;

/// Control strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Hysteresis on/off between closed and `max_step_percent`.
    Binary,
    /// Opening proportional to the error beyond the dead band.
    Proportional,
    /// PID on measurement with feedforward.
    #[default]
    Pid,
}

impl ControlMode {
    pub const ALL: [ControlMode; 3] = [
        ControlMode::Binary,
        ControlMode::Proportional,
        ControlMode::Pid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ControlMode::Binary => "binary",
            ControlMode::Proportional => "proportional",
            ControlMode::Pid => "pid",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlMode {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" => Ok(ControlMode::Binary),
            "proportional" => Ok(ControlMode::Proportional),
            "pid" => Ok(ControlMode::Pid),
            _ => Err(ControlError::UnknownMode {
                name: s.to_string(),
            }),
        }
    }
}

/// Discrete valve opening presets: closed, then five levels in 20% increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValveStep {
    #[serde(rename = "*")]
    Off,
    #[serde(rename = "1")]
    Step1,
    #[serde(rename = "2")]
    Step2,
    #[serde(rename = "3")]
    Step3,
    #[serde(rename = "4")]
    Step4,
    #[serde(rename = "5")]
    Step5,
}

impl ValveStep {
    pub const ALL: [ValveStep; 6] = [
        ValveStep::Off,
        ValveStep::Step1,
        ValveStep::Step2,
        ValveStep::Step3,
        ValveStep::Step4,
        ValveStep::Step5,
    ];

    /// Opening in percent for this preset.
    pub fn percent(self) -> u8 {
        match self {
            ValveStep::Off => 0,
            ValveStep::Step1 => 20,
            ValveStep::Step2 => 40,
            ValveStep::Step3 => 60,
            ValveStep::Step4 => 80,
            ValveStep::Step5 => 100,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ValveStep::Off => "*",
            ValveStep::Step1 => "1",
            ValveStep::Step2 => "2",
            ValveStep::Step3 => "3",
            ValveStep::Step4 => "4",
            ValveStep::Step5 => "5",
        }
    }

    pub fn from_label(label: &str) -> ControlResult<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.label() == label.trim())
            .ok_or_else(|| ControlError::UnknownValveStep {
                label: label.to_string(),
            })
    }

    /// Preset whose opening equals `percent` exactly, if any.
    pub fn from_percent(percent: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.percent() == percent)
    }
}

impl fmt::Display for ValveStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}%)", self.label(), self.percent())
    }
}

/// Validated tuning parameters for one room.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerConfig {
    mode: ControlMode,
    target_min: Real,
    target_max: Real,
    hysteresis: Real,
    max_step_percent: u8,
    min_cycle_duration_s: Real,
    kp: Real,
    ki: Real,
    kd: Real,
    ka: Real,
    proportional_gain: Real,
    exercise_enabled: bool,
    exercise_interval_s: Real,
    exercise_open_duration_s: Real,
    exercise_close_duration_s: Real,
    pid_max_dt_s: Real,
    output_resolution_percent: u8,
    feedback_tolerance_percent: Real,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mode: ControlMode::Pid,
            target_min: DEFAULT_TARGET_MIN,
            target_max: DEFAULT_TARGET_MAX,
            hysteresis: DEFAULT_HYSTERESIS,
            max_step_percent: DEFAULT_MAX_STEP_PERCENT,
            min_cycle_duration_s: DEFAULT_MIN_CYCLE_DURATION_S,
            kp: DEFAULT_KP,
            ki: DEFAULT_KI,
            kd: DEFAULT_KD,
            ka: DEFAULT_KA,
            proportional_gain: DEFAULT_PROPORTIONAL_GAIN,
            exercise_enabled: true,
            exercise_interval_s: DEFAULT_EXERCISE_INTERVAL_S,
            exercise_open_duration_s: minutes(5.0),
            exercise_close_duration_s: minutes(5.0),
            pid_max_dt_s: DEFAULT_PID_MAX_DT_S,
            output_resolution_percent: 1,
            feedback_tolerance_percent: DEFAULT_FEEDBACK_TOLERANCE_PERCENT,
        }
    }
}

impl ControllerConfig {
    /// Start a builder from the defaults.
    pub fn builder() -> ControllerConfigBuilder {
        ControllerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Start a builder from this configuration, for live updates of single fields.
    pub fn to_builder(&self) -> ControllerConfigBuilder {
        ControllerConfigBuilder {
            config: self.clone(),
        }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn target_min(&self) -> Real {
        self.target_min
    }

    pub fn target_max(&self) -> Real {
        self.target_max
    }

    pub fn hysteresis(&self) -> Real {
        self.hysteresis
    }

    pub fn max_step_percent(&self) -> u8 {
        self.max_step_percent
    }

    /// Preset matching `max_step_percent`, if it sits on one.
    pub fn valve_step(&self) -> Option<ValveStep> {
        ValveStep::from_percent(self.max_step_percent)
    }

    pub fn min_cycle_duration_s(&self) -> Real {
        self.min_cycle_duration_s
    }

    pub fn kp(&self) -> Real {
        self.kp
    }

    pub fn ki(&self) -> Real {
        self.ki
    }

    pub fn kd(&self) -> Real {
        self.kd
    }

    pub fn ka(&self) -> Real {
        self.ka
    }

    pub fn proportional_gain(&self) -> Real {
        self.proportional_gain
    }

    pub fn exercise_enabled(&self) -> bool {
        self.exercise_enabled
    }

    pub fn exercise_interval_s(&self) -> Real {
        self.exercise_interval_s
    }

    pub fn exercise_open_duration_s(&self) -> Real {
        self.exercise_open_duration_s
    }

    pub fn exercise_close_duration_s(&self) -> Real {
        self.exercise_close_duration_s
    }

    /// Longest elapsed time the PID accepts for an I/D update.
    pub fn pid_max_dt_s(&self) -> Real {
        self.pid_max_dt_s
    }

    pub fn output_resolution_percent(&self) -> u8 {
        self.output_resolution_percent
    }

    pub fn feedback_tolerance_percent(&self) -> Real {
        self.feedback_tolerance_percent
    }

    /// Bound on the integral accumulator so that `|ki * integral| <= max_step_percent`.
    ///
    /// With `ki == 0` the integral is pinned at zero.
    pub fn integral_limit(&self) -> Real {
        if self.ki == 0.0 {
            0.0
        } else {
            Real::from(self.max_step_percent) / self.ki.abs()
        }
    }

    /// Clamp a requested setpoint into `[target_min, target_max]`.
    pub fn clamp_target(&self, target: Real) -> Real {
        target.clamp(self.target_min, self.target_max)
    }

    /// Check every field. Called by the builder; exposed for configs assembled elsewhere.
    pub fn validate(&self) -> ControlResult<()> {
        finite("target_min", self.target_min)?;
        finite("target_max", self.target_max)?;
        if self.target_min >= self.target_max {
            return Err(invalid("target_min", "must be less than target_max"));
        }
        finite("hysteresis", self.hysteresis)?;
        if self.hysteresis <= 0.0 {
            return Err(invalid("hysteresis", "must be positive"));
        }
        if self.max_step_percent > FULL_OPEN_PERCENT {
            return Err(invalid("max_step_percent", "must be within [0, 100]"));
        }
        finite("min_cycle_duration", self.min_cycle_duration_s)?;
        if self.min_cycle_duration_s < 0.0 {
            return Err(invalid("min_cycle_duration", "must be non-negative"));
        }
        finite("kp", self.kp)?;
        finite("ki", self.ki)?;
        finite("kd", self.kd)?;
        finite("ka", self.ka)?;
        finite("proportional_gain", self.proportional_gain)?;
        if self.proportional_gain < 0.0 {
            return Err(invalid("proportional_gain", "must be non-negative"));
        }
        positive("exercise_interval", self.exercise_interval_s)?;
        positive("exercise_open_duration", self.exercise_open_duration_s)?;
        positive("exercise_close_duration", self.exercise_close_duration_s)?;
        positive("pid_max_dt", self.pid_max_dt_s)?;
        if !(1..=FULL_OPEN_PERCENT).contains(&self.output_resolution_percent) {
            return Err(invalid("output_resolution", "must be within [1, 100]"));
        }
        finite("feedback_tolerance", self.feedback_tolerance_percent)?;
        if self.feedback_tolerance_percent < 0.0 {
            return Err(invalid("feedback_tolerance", "must be non-negative"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ControlError {
    ControlError::InvalidConfig {
        field,
        reason: reason.to_string(),
    }
}

fn finite(field: &'static str, v: Real) -> ControlResult<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(ControlError::InvalidConfig {
            field,
            reason: format!("must be finite (got {v})"),
        })
    }
}

fn positive(field: &'static str, v: Real) -> ControlResult<()> {
    finite(field, v)?;
    if v <= 0.0 {
        return Err(invalid(field, "must be positive"));
    }
    Ok(())
}

/// Builder for [`ControllerConfig`]. Validation runs once, in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct ControllerConfigBuilder {
    config: ControllerConfig,
}

impl ControllerConfigBuilder {
    pub fn with_mode(mut self, mode: ControlMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the allowed setpoint range in °C.
    pub fn with_target_range(mut self, min: Real, max: Real) -> Self {
        self.config.target_min = min;
        self.config.target_max = max;
        self
    }

    /// Set the dead band width in °C.
    pub fn with_hysteresis(mut self, hysteresis: Real) -> Self {
        self.config.hysteresis = hysteresis;
        self
    }

    pub fn with_max_step_percent(mut self, percent: u8) -> Self {
        self.config.max_step_percent = percent;
        self
    }

    pub fn with_valve_step(mut self, step: ValveStep) -> Self {
        self.config.max_step_percent = step.percent();
        self
    }

    /// Set the minimum spacing between valve commands, in seconds.
    pub fn with_min_cycle_duration(mut self, secs: Real) -> Self {
        self.config.min_cycle_duration_s = secs;
        self
    }

    pub fn with_pid_gains(mut self, kp: Real, ki: Real, kd: Real) -> Self {
        self.config.kp = kp;
        self.config.ki = ki;
        self.config.kd = kd;
        self
    }

    pub fn with_feedforward_gain(mut self, ka: Real) -> Self {
        self.config.ka = ka;
        self
    }

    /// Set the proportional-mode gain in %/°C.
    pub fn with_proportional_gain(mut self, gain: Real) -> Self {
        self.config.proportional_gain = gain;
        self
    }

    pub fn with_exercise(mut self, enabled: bool) -> Self {
        self.config.exercise_enabled = enabled;
        self
    }

    pub fn with_exercise_interval(mut self, secs: Real) -> Self {
        self.config.exercise_interval_s = secs;
        self
    }

    /// Set how long the valve is held fully open, then fully closed, during an exercise.
    pub fn with_exercise_durations(mut self, open_s: Real, close_s: Real) -> Self {
        self.config.exercise_open_duration_s = open_s;
        self.config.exercise_close_duration_s = close_s;
        self
    }

    pub fn with_pid_max_dt(mut self, secs: Real) -> Self {
        self.config.pid_max_dt_s = secs;
        self
    }

    /// Set the actuator resolution: 1 for whole percents, 20 for the six presets.
    pub fn with_output_resolution(mut self, percent: u8) -> Self {
        self.config.output_resolution_percent = percent;
        self
    }

    pub fn with_feedback_tolerance(mut self, percent: Real) -> Self {
        self.config.feedback_tolerance_percent = percent;
        self
    }

    pub fn build(self) -> ControlResult<ControllerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ControllerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.mode(), ControlMode::Pid);
        assert_eq!(cfg.kp(), 20.0);
        assert_eq!(cfg.ki(), 0.01);
        assert_eq!(cfg.kd(), 500.0);
        assert_eq!(cfg.ka(), 0.0);
        assert_eq!(cfg.max_step_percent(), 80);
        assert_eq!(cfg.valve_step(), Some(ValveStep::Step4));
        assert_eq!(cfg.exercise_interval_s(), 604_800.0);
    }

    #[test]
    fn builder_sets_fields() {
        let cfg = ControllerConfig::builder()
            .with_mode(ControlMode::Binary)
            .with_hysteresis(0.3)
            .with_valve_step(ValveStep::Step2)
            .with_min_cycle_duration(120.0)
            .build()
            .unwrap();
        assert_eq!(cfg.mode(), ControlMode::Binary);
        assert_eq!(cfg.hysteresis(), 0.3);
        assert_eq!(cfg.max_step_percent(), 40);
        assert_eq!(cfg.min_cycle_duration_s(), 120.0);
    }

    #[test]
    fn invalid_configs_rejected() {
        assert!(ControllerConfig::builder().with_hysteresis(0.0).build().is_err());
        assert!(ControllerConfig::builder().with_hysteresis(-0.5).build().is_err());
        assert!(
            ControllerConfig::builder()
                .with_max_step_percent(101)
                .build()
                .is_err()
        );
        assert!(
            ControllerConfig::builder()
                .with_target_range(22.0, 18.0)
                .build()
                .is_err()
        );
        assert!(
            ControllerConfig::builder()
                .with_pid_gains(f64::NAN, 0.0, 0.0)
                .build()
                .is_err()
        );
        assert!(
            ControllerConfig::builder()
                .with_output_resolution(0)
                .build()
                .is_err()
        );
        assert!(
            ControllerConfig::builder()
                .with_exercise_durations(0.0, 300.0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn invalid_hysteresis_names_field() {
        let err = ControllerConfig::builder()
            .with_hysteresis(0.0)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ControlError::InvalidConfig {
                field: "hysteresis",
                ..
            }
        ));
    }

    #[test]
    fn negative_gains_allowed() {
        let cfg = ControllerConfig::builder()
            .with_pid_gains(-5.0, -0.02, 0.0)
            .with_feedforward_gain(-1.0)
            .build()
            .unwrap();
        assert_eq!(cfg.integral_limit(), 80.0 / 0.02);
    }

    #[test]
    fn integral_limit_zero_without_ki() {
        let cfg = ControllerConfig::builder()
            .with_pid_gains(20.0, 0.0, 0.0)
            .build()
            .unwrap();
        assert_eq!(cfg.integral_limit(), 0.0);
    }

    #[test]
    fn clamp_target_to_range() {
        let cfg = ControllerConfig::default();
        assert_eq!(cfg.clamp_target(35.0), 28.0);
        assert_eq!(cfg.clamp_target(2.0), 6.0);
        assert_eq!(cfg.clamp_target(21.5), 21.5);
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("PID".parse::<ControlMode>().unwrap(), ControlMode::Pid);
        assert_eq!(
            " binary ".parse::<ControlMode>().unwrap(),
            ControlMode::Binary
        );
        assert!("bang-bang".parse::<ControlMode>().is_err());
    }

    #[test]
    fn valve_step_presets() {
        let percents: Vec<u8> = ValveStep::ALL.iter().map(|s| s.percent()).collect();
        assert_eq!(percents, vec![0, 20, 40, 60, 80, 100]);
        assert_eq!(ValveStep::from_label("*").unwrap(), ValveStep::Off);
        assert_eq!(ValveStep::from_label("3").unwrap(), ValveStep::Step3);
        assert!(ValveStep::from_label("6").is_err());
        assert_eq!(ValveStep::from_percent(60), Some(ValveStep::Step3));
        assert_eq!(ValveStep::from_percent(55), None);
    }
}
