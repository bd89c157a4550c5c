//! Rate limiting of valve commands.
//!
//! The heating slab reacts over hours, so commands are spaced by at least
//! `min_cycle_duration`. Between commands the valve holds its last opening; when the
//! guard opens again only the most recent desired value is sent.

use fv_core::{Real, Timestamp};
use serde::{Deserialize, Serialize};

use crate::config::ControllerConfig;

/// Slack when comparing elapsed time against the spacing, so a wake-up scheduled for
/// the exact remaining time is not rejected by rounding.
pub const SPACING_EPSILON_S: Real = 1e-6;

/// What to do with a desired position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GuardDecision {
    /// Send the desired position now.
    Emit,
    /// Desired equals commanded; nothing to send.
    Unchanged,
    /// A change is pending; the guard opens in `remaining_s` seconds.
    Withhold { remaining_s: Real },
}

/// Minimum-spacing gate with a one-shot bypass.
///
/// The bypass stays armed until a command is actually emitted, so a resynchronizing
/// event that produces no change (e.g. the PID still priming after a mode change) lets
/// the first real change through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InertiaGuard {
    /// Minimum spacing between commands in seconds.
    pub min_cycle_s: Real,
    /// Let the next change through regardless of spacing.
    pub bypass_armed: bool,
}

impl InertiaGuard {
    pub fn new(min_cycle_s: Real) -> Self {
        Self {
            min_cycle_s: min_cycle_s.max(0.0),
            bypass_armed: false,
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(config.min_cycle_duration_s())
    }

    /// Whether the spacing since `last_command_time` allows a new command.
    ///
    /// With no previous command the guard is open. A clock that moved backwards also
    /// opens it, so a restarted host is not locked out for the length of the anomaly.
    pub fn should_emit(
        now: Timestamp,
        last_command_time: Option<Timestamp>,
        min_cycle_s: Real,
    ) -> bool {
        match last_command_time {
            None => true,
            Some(last) => {
                let elapsed = now.secs_since(last);
                !(elapsed >= 0.0) || elapsed + SPACING_EPSILON_S >= min_cycle_s
            }
        }
    }

    /// Seconds until [`should_emit`](Self::should_emit) turns true.
    pub fn time_until_open(&self, now: Timestamp, last_command_time: Option<Timestamp>) -> Real {
        if Self::should_emit(now, last_command_time, self.min_cycle_s) {
            return 0.0;
        }
        match last_command_time {
            Some(last) => (self.min_cycle_s - now.secs_since(last)).max(0.0),
            None => 0.0,
        }
    }

    pub fn set_min_cycle(&mut self, min_cycle_s: Real) {
        self.min_cycle_s = min_cycle_s.max(0.0);
    }

    /// Arm the one-shot bypass: mode change, target change, manual override, exercise end.
    pub fn arm_bypass(&mut self) {
        self.bypass_armed = true;
    }

    /// Decide whether `desired` may be sent. An `Emit` consumes the armed bypass.
    pub fn decide(
        &mut self,
        now: Timestamp,
        desired: u8,
        commanded: u8,
        last_command_time: Option<Timestamp>,
    ) -> GuardDecision {
        if desired == commanded {
            return GuardDecision::Unchanged;
        }
        if self.bypass_armed || Self::should_emit(now, last_command_time, self.min_cycle_s) {
            self.bypass_armed = false;
            GuardDecision::Emit
        } else {
            GuardDecision::Withhold {
                remaining_s: self.time_until_open(now, last_command_time),
            }
        }
    }
}
