//! Events delivered to a room controller.

use fv_controls::{ControlMode, ControllerConfig};
use fv_core::{Real, Temperature};

/// What a scheduled wake-up is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerPurpose {
    /// Advance the valve exercise to its next phase.
    ExerciseStep,
    /// The inertia guard has reopened; emit the pending desired position.
    GuardReopen,
}

/// Handle for a one-shot wake-up.
///
/// Cancelling bumps the room's generation for that purpose, so tokens issued earlier
/// are recognised as stale when they fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub purpose: TimerPurpose,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// New sensor reading; `None` when the sensor reports unavailable.
    TemperatureUpdated(Option<Temperature>),
    /// New setpoint in °C.
    TargetChanged(Real),
    ModeChanged(ControlMode),
    /// Periodic tick; the room pulls its reading from its `TemperatureSource`.
    ScheduledTick,
    Timer(TimerToken),
    HeatingEnabled(bool),
    /// Command this opening now, bypassing the spacing once.
    ManualOverride(u8),
    /// Start a valve exercise regardless of the interval.
    ExerciseRequested,
    ConfigChanged(ControllerConfig),
    /// External feedforward scalar, e.g. outdoor temperature deficit.
    FeedforwardUpdated(Option<Real>),
    /// Read the actuator's reported position and compare it with the commanded one.
    ValveFeedback,
}

impl RoomEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RoomEvent::TemperatureUpdated(_) => "temperature_updated",
            RoomEvent::TargetChanged(_) => "target_changed",
            RoomEvent::ModeChanged(_) => "mode_changed",
            RoomEvent::ScheduledTick => "scheduled_tick",
            RoomEvent::Timer(_) => "timer",
            RoomEvent::HeatingEnabled(_) => "heating_enabled",
            RoomEvent::ManualOverride(_) => "manual_override",
            RoomEvent::ExerciseRequested => "exercise_requested",
            RoomEvent::ConfigChanged(_) => "config_changed",
            RoomEvent::FeedforwardUpdated(_) => "feedforward_updated",
            RoomEvent::ValveFeedback => "valve_feedback",
        }
    }
}
