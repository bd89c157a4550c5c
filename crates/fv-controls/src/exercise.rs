//! Anti-calcification valve exercise.
//!
//! The cycle is `Idle -> Opening -> Closing -> Restoring -> Idle`. Each transition is a
//! pure function returning the next state and the command to send; waits are returned
//! as durations for the host scheduler instead of being slept. The caller commits the
//! new state only after the command was delivered, so a failed delivery leaves the phase
//! unchanged and can be retried.

use fv_core::time::SECONDS_PER_DAY;
use fv_core::{FULL_OPEN_PERCENT, Real, Timestamp};
use serde::{Deserialize, Serialize};

use crate::config::ControllerConfig;
use crate::error::{ControlError, ControlResult};

/// Delay before retrying an exercise step whose valve command failed.
pub const EXERCISE_RETRY_DELAY_S: Real = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExercisePhase {
    #[default]
    Idle,
    Opening,
    Closing,
    Restoring,
}

impl ExercisePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ExercisePhase::Idle => "idle",
            ExercisePhase::Opening => "opening",
            ExercisePhase::Closing => "closing",
            ExercisePhase::Restoring => "restoring",
        }
    }
}

impl std::fmt::Display for ExercisePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exercise bookkeeping carried in `ControllerState`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExerciseState {
    pub phase: ExercisePhase,
    /// Commanded position when the cycle started, restored at the end.
    pub saved_position: Option<u8>,
    pub last_exercise_time: Option<Timestamp>,
    pub phase_started: Option<Timestamp>,
}

impl ExerciseState {
    pub fn is_active(&self) -> bool {
        self.phase != ExercisePhase::Idle
    }

    pub fn days_since(&self, now: Timestamp) -> Option<Real> {
        self.last_exercise_time
            .map(|last| now.secs_since(last) / SECONDS_PER_DAY)
    }
}

/// Command produced by an exercise transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExerciseAction {
    /// Percent to send to the valve.
    pub command: u8,
    /// Schedule the next step after this many seconds; `None` ends the cycle.
    pub wait_s: Option<Real>,
}

/// Exercise timing, derived from the configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExerciseStateMachine {
    pub enabled: bool,
    pub interval_s: Real,
    pub open_duration_s: Real,
    pub close_duration_s: Real,
}

impl ExerciseStateMachine {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            enabled: config.exercise_enabled(),
            interval_s: config.exercise_interval_s(),
            open_duration_s: config.exercise_open_duration_s(),
            close_duration_s: config.exercise_close_duration_s(),
        }
    }

    /// An exercise is due when enabled, idle, and either none was ever recorded or a
    /// full interval has passed since the last one.
    pub fn is_due(&self, state: &ExerciseState, now: Timestamp) -> bool {
        if !self.enabled || state.is_active() {
            return false;
        }
        state
            .last_exercise_time
            .is_none_or(|last| now.secs_since(last) >= self.interval_s)
    }

    /// Days until the next scheduled exercise, 0 when overdue.
    pub fn next_due_in_days(&self, state: &ExerciseState, now: Timestamp) -> Option<Real> {
        if !self.enabled {
            return None;
        }
        state
            .last_exercise_time
            .map(|last| ((self.interval_s - now.secs_since(last)) / SECONDS_PER_DAY).max(0.0))
    }

    /// `Idle -> Opening`: remember `commanded`, open fully.
    pub fn start(
        &self,
        state: &ExerciseState,
        now: Timestamp,
        commanded: u8,
    ) -> ControlResult<(ExerciseState, ExerciseAction)> {
        if state.is_active() {
            return Err(ControlError::ExerciseState {
                what: format!("cannot start while {}", state.phase),
            });
        }
        let next = ExerciseState {
            phase: ExercisePhase::Opening,
            saved_position: Some(commanded),
            last_exercise_time: state.last_exercise_time,
            phase_started: Some(now),
        };
        let action = ExerciseAction {
            command: FULL_OPEN_PERCENT,
            wait_s: Some(self.open_duration_s),
        };
        Ok((next, action))
    }

    /// Advance on a timer: `Opening -> Closing` or `Closing -> Restoring`.
    ///
    /// From `Restoring` the restore command is produced again.
    pub fn on_timer(
        &self,
        state: &ExerciseState,
        now: Timestamp,
    ) -> ControlResult<(ExerciseState, ExerciseAction)> {
        let (phase, action) = match state.phase {
            ExercisePhase::Idle => {
                return Err(ControlError::ExerciseState {
                    what: "timer fired while idle".to_string(),
                });
            }
            ExercisePhase::Opening => (
                ExercisePhase::Closing,
                ExerciseAction {
                    command: 0,
                    wait_s: Some(self.close_duration_s),
                },
            ),
            ExercisePhase::Closing | ExercisePhase::Restoring => (
                ExercisePhase::Restoring,
                ExerciseAction {
                    command: state.saved_position.unwrap_or(0),
                    wait_s: None,
                },
            ),
        };
        let next = ExerciseState {
            phase,
            phase_started: Some(now),
            ..state.clone()
        };
        Ok((next, action))
    }

    /// `Restoring -> Idle`, once the restore command was delivered.
    pub fn finish_restore(
        &self,
        state: &ExerciseState,
        now: Timestamp,
    ) -> ControlResult<ExerciseState> {
        if state.phase != ExercisePhase::Restoring {
            return Err(ControlError::ExerciseState {
                what: format!("cannot finish restore while {}", state.phase),
            });
        }
        Ok(ExerciseState {
            phase: ExercisePhase::Idle,
            saved_position: None,
            last_exercise_time: Some(now),
            phase_started: None,
        })
    }

    /// Abort a running cycle.
    ///
    /// Returns the idle state and, if the valve was moved away from the saved position,
    /// the position to restore. `last_exercise_time` is left unchanged.
    pub fn cancel(&self, state: &ExerciseState, commanded: u8) -> (ExerciseState, Option<u8>) {
        if !state.is_active() {
            return (state.clone(), None);
        }
        let restore = state.saved_position.filter(|saved| *saved != commanded);
        let next = ExerciseState {
            phase: ExercisePhase::Idle,
            saved_position: None,
            last_exercise_time: state.last_exercise_time,
            phase_started: None,
        };
        (next, restore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fv_core::time::days;

    fn machine() -> ExerciseStateMachine {
        ExerciseStateMachine::from_config(&ControllerConfig::default())
    }

    fn t(secs: f64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn full_cycle_restores_saved_position() {
        let m = machine();
        let idle = ExerciseState {
            last_exercise_time: Some(t(0.0)),
            ..ExerciseState::default()
        };
        let now = t(days(7.0));
        assert!(m.is_due(&idle, now));

        let (opening, open) = m.start(&idle, now, 60).unwrap();
        assert_eq!(opening.phase, ExercisePhase::Opening);
        assert_eq!(open, ExerciseAction { command: 100, wait_s: Some(300.0) });

        let (closing, close) = m.on_timer(&opening, now + 300.0).unwrap();
        assert_eq!(closing.phase, ExercisePhase::Closing);
        assert_eq!(close, ExerciseAction { command: 0, wait_s: Some(300.0) });

        let (restoring, restore) = m.on_timer(&closing, now + 600.0).unwrap();
        assert_eq!(restoring.phase, ExercisePhase::Restoring);
        assert_eq!(restore, ExerciseAction { command: 60, wait_s: None });

        let done = m.finish_restore(&restoring, now + 600.0).unwrap();
        assert_eq!(done.phase, ExercisePhase::Idle);
        assert_eq!(done.last_exercise_time, Some(now + 600.0));
        assert!(!m.is_due(&done, now + 601.0));
    }

    #[test]
    fn never_exercised_is_due_at_once() {
        let m = machine();
        let state = ExerciseState::default();
        assert!(m.is_due(&state, t(0.0)));
        assert!(m.is_due(&state, t(days(30.0))));
        assert_eq!(m.next_due_in_days(&state, t(0.0)), None);
    }

    #[test]
    fn not_due_before_interval() {
        let m = machine();
        let state = ExerciseState {
            last_exercise_time: Some(t(100.0)),
            ..ExerciseState::default()
        };
        assert!(!m.is_due(&state, t(100.0 + days(6.9))));
        assert!(m.is_due(&state, t(100.0 + days(7.0))));
    }

    #[test]
    fn disabled_never_due() {
        let cfg = ControllerConfig::builder().with_exercise(false).build().unwrap();
        let m = ExerciseStateMachine::from_config(&cfg);
        let state = ExerciseState {
            last_exercise_time: Some(t(0.0)),
            ..ExerciseState::default()
        };
        assert!(!m.is_due(&state, t(days(100.0))));
        assert_eq!(m.next_due_in_days(&state, t(0.0)), None);
    }

    #[test]
    fn cannot_start_twice() {
        let m = machine();
        let (opening, _) = m.start(&ExerciseState::default(), t(0.0), 0).unwrap();
        assert!(m.start(&opening, t(1.0), 100).is_err());
        assert!(m.on_timer(&ExerciseState::default(), t(0.0)).is_err());
        assert!(m.finish_restore(&opening, t(1.0)).is_err());
    }

    #[test]
    fn cancel_after_opening_restores() {
        let m = machine();
        let (opening, _) = m.start(&ExerciseState::default(), t(0.0), 40).unwrap();
        let (idle, restore) = m.cancel(&opening, 100);
        assert_eq!(idle.phase, ExercisePhase::Idle);
        assert_eq!(restore, Some(40));
        assert_eq!(idle.last_exercise_time, None);
    }

    #[test]
    fn cancel_without_movement_needs_no_restore() {
        let m = machine();
        let (opening, _) = m.start(&ExerciseState::default(), t(0.0), 40).unwrap();
        assert_eq!(m.cancel(&opening, 40).1, None);
        assert_eq!(m.cancel(&ExerciseState::default(), 40).1, None);
    }

    #[test]
    fn telemetry_helpers() {
        let m = machine();
        let state = ExerciseState {
            last_exercise_time: Some(t(0.0)),
            ..ExerciseState::default()
        };
        assert_eq!(state.days_since(t(days(2.0))), Some(2.0));
        assert_eq!(m.next_due_in_days(&state, t(days(2.0))), Some(5.0));
        assert_eq!(m.next_due_in_days(&state, t(days(9.0))), Some(0.0));
    }
}
