//! Site file schema.
//!
//! A site lists rooms with their controller settings and, for simulation, the physical
//! parameters of each room. Every controller field is optional; missing fields take the
//! controller defaults.

use fv_controls::{ControlMode, ControllerConfig, ValveStep};
use fv_sim::{PlantParams, SimOptions};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TARGET_C: f64 = 21.5;
pub const DEFAULT_OUTDOOR_C: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Site {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub rooms: Vec<RoomDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomDef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_target")]
    pub target_c: f64,
    #[serde(default)]
    pub controller: ControllerDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plant: Option<PlantParams>,
    /// Starting room and slab temperature for simulation (°C).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_c: Option<f64>,
}

fn default_target() -> f64 {
    DEFAULT_TARGET_C
}

impl RoomDef {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Controller settings as written in a site file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerDef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ControlMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hysteresis: Option<f64>,
    /// Preset label `*`, `1`..`5`. Mutually exclusive with `max_step_percent`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valve_step: Option<ValveStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_step_percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_cycle_duration_s: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ki: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ka: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proportional_gain: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exercise: Option<ExerciseDef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid_max_dt_s: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_resolution_percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_tolerance_percent: Option<f64>,
}

impl ControllerDef {
    /// Fully spelled-out settings of `config`.
    pub fn from_config(config: &ControllerConfig) -> Self {
        let (valve_step, max_step_percent) = match config.valve_step() {
            Some(step) => (Some(step), None),
            None => (None, Some(config.max_step_percent())),
        };
        Self {
            mode: Some(config.mode()),
            target_min: Some(config.target_min()),
            target_max: Some(config.target_max()),
            hysteresis: Some(config.hysteresis()),
            valve_step,
            max_step_percent,
            min_cycle_duration_s: Some(config.min_cycle_duration_s()),
            kp: Some(config.kp()),
            ki: Some(config.ki()),
            kd: Some(config.kd()),
            ka: Some(config.ka()),
            proportional_gain: Some(config.proportional_gain()),
            exercise: Some(ExerciseDef {
                enabled: config.exercise_enabled(),
                interval_days: config.exercise_interval_s() / fv_core::SECONDS_PER_DAY,
                open_duration_s: config.exercise_open_duration_s(),
                close_duration_s: config.exercise_close_duration_s(),
            }),
            pid_max_dt_s: Some(config.pid_max_dt_s()),
            output_resolution_percent: Some(config.output_resolution_percent()),
            feedback_tolerance_percent: Some(config.feedback_tolerance_percent()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExerciseDef {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_days")]
    pub interval_days: f64,
    #[serde(default = "default_phase_s")]
    pub open_duration_s: f64,
    #[serde(default = "default_phase_s")]
    pub close_duration_s: f64,
}

fn default_true() -> bool {
    true
}

fn default_interval_days() -> f64 {
    7.0
}

fn default_phase_s() -> f64 {
    300.0
}

/// Simulation settings for `fv-cli simulate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationDef {
    #[serde(default = "default_outdoor")]
    pub outdoor_c: f64,
    /// Use the outdoor deficit as the PID feedforward signal.
    #[serde(default)]
    pub feedforward: bool,
    #[serde(default)]
    pub options: SimOptions,
    #[serde(default)]
    pub events: Vec<EventDef>,
}

fn default_outdoor() -> f64 {
    DEFAULT_OUTDOOR_C
}

impl Default for SimulationDef {
    fn default() -> Self {
        Self {
            outdoor_c: DEFAULT_OUTDOOR_C,
            feedforward: false,
            options: SimOptions::default(),
            events: Vec::new(),
        }
    }
}

/// A scripted host event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventDef {
    /// Seconds from the start of the run.
    pub at_s: f64,
    pub room: String,
    #[serde(flatten)]
    pub kind: EventKindDef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKindDef {
    Target { celsius: f64 },
    Mode { mode: ControlMode },
    Heating { enabled: bool },
    ManualOverride { percent: u8 },
    Exercise,
    ValveStep { step: ValveStep },
}
