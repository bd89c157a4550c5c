//! Diagnostics exposed by a room: exercise telemetry, statistics and snapshots.

use std::collections::VecDeque;

use fv_controls::{ControlMode, ExercisePhase, PidTerms, ValveStep};
use fv_core::{Real, RoomId, Timestamp, mean};
use serde::Serialize;

/// Commanded positions kept for the running average.
pub const POSITION_HISTORY_LEN: usize = 10;
/// Readings kept for the temperature trend.
pub const TEMPERATURE_HISTORY_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExerciseTelemetry {
    pub room_id: RoomId,
    pub last_exercise_time: Option<Timestamp>,
    pub days_since: Option<Real>,
    /// 0 when overdue, `None` when exercising is disabled or never ran.
    pub next_due_in_days: Option<Real>,
    pub state: ExercisePhase,
}

/// Running statistics of one room.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomStatistics {
    adjustments: u64,
    positions: VecDeque<u8>,
    temperatures: VecDeque<Real>,
    reported_position: Option<u8>,
}

impl RoomStatistics {
    pub fn record_command(&mut self, percent: u8) {
        self.adjustments += 1;
        push_bounded(&mut self.positions, percent, POSITION_HISTORY_LEN);
    }

    pub fn record_temperature(&mut self, celsius: Real) {
        push_bounded(&mut self.temperatures, celsius, TEMPERATURE_HISTORY_LEN);
    }

    pub fn record_feedback(&mut self, percent: u8) {
        self.reported_position = Some(percent);
    }

    /// Number of commands delivered to the valve.
    pub fn adjustments(&self) -> u64 {
        self.adjustments
    }

    /// Mean of the last commanded positions.
    pub fn average_position(&self) -> Option<Real> {
        let values: Vec<Real> = self.positions.iter().map(|p| Real::from(*p)).collect();
        mean(&values)
    }

    /// Last minus first of the recent readings, in °C. Needs two readings.
    pub fn temperature_trend(&self) -> Option<Real> {
        match (self.temperatures.front(), self.temperatures.back()) {
            (Some(first), Some(last)) if self.temperatures.len() >= 2 => Some(last - first),
            _ => None,
        }
    }

    pub fn reported_position(&self) -> Option<u8> {
        self.reported_position
    }
}

fn push_bounded<T>(buf: &mut VecDeque<T>, value: T, cap: usize) {
    if buf.len() == cap {
        buf.pop_front();
    }
    buf.push_back(value);
}

/// Serializable view of a room for hosts and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub mode: ControlMode,
    pub heating_enabled: bool,
    pub current_temperature: Option<Real>,
    pub target_temperature: Option<Real>,
    /// `target - current`.
    pub temperature_difference: Option<Real>,
    pub commanded_position: u8,
    pub desired_position: u8,
    pub max_step_percent: u8,
    pub valve_step: Option<ValveStep>,
    pub integral_error: Real,
    pub pid_terms: Option<PidTerms>,
    pub adjustments: u64,
    pub average_position: Option<Real>,
    pub temperature_trend: Option<Real>,
    pub reported_position: Option<u8>,
    pub exercise: ExerciseTelemetry,
}
