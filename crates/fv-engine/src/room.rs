//! Per-room control loop.
//!
//! A `RoomController` owns one room's configuration and state and the capability
//! objects it talks through. Every entry point takes `&mut self`, so evaluations of one
//! room never overlap. At most one valve command is emitted per event.
//!
//! Evaluation order for every event that reaches the strategy path:
//!
//! 1. a running exercise suppresses the strategy entirely
//! 2. a due exercise is started and nothing else happens
//! 3. the configured strategy computes the desired opening
//! 4. the inertia guard decides whether it is emitted now or on a later wake-up

use fv_controls::exercise::EXERCISE_RETRY_DELAY_S;
use fv_controls::{
    ControlInput, ControlMode, ControlStrategy, ControllerConfig, ControllerState, ExerciseAction,
    ExerciseState, ExerciseStateMachine, GuardDecision, InertiaGuard,
};
use fv_core::{Real, RoomId, Temperature, Timestamp, ensure_finite, to_celsius};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::event::{RoomEvent, TimerPurpose, TimerToken};
use crate::ports::{Clock, NoFeedback, Scheduler, TemperatureSource, ValveFeedback, ValveSink};
use crate::telemetry::{ExerciseTelemetry, RoomSnapshot, RoomStatistics};

/// Orchestrator for one room.
///
/// `T` supplies readings on scheduled ticks, `V` receives valve commands, `C` provides
/// time and one-shot wake-ups, `F` reports the actuator's actual position.
#[derive(Debug)]
pub struct RoomController<T, V, C, F = NoFeedback> {
    id: RoomId,
    config: ControllerConfig,
    state: ControllerState,
    strategy: ControlStrategy,
    guard: InertiaGuard,
    exercise: ExerciseStateMachine,
    stats: RoomStatistics,
    exercise_generation: u64,
    reopen_generation: u64,
    reopen_pending: bool,
    sensor: T,
    valve: V,
    clock: C,
    feedback: F,
}

impl<T, V, C> RoomController<T, V, C, NoFeedback>
where
    T: TemperatureSource,
    V: ValveSink,
    C: Clock + Scheduler,
{
    pub fn new(
        id: impl Into<RoomId>,
        config: ControllerConfig,
        sensor: T,
        valve: V,
        clock: C,
    ) -> Self {
        RoomController::with_feedback(id, config, sensor, valve, clock, NoFeedback)
    }
}

impl<T, V, C, F> RoomController<T, V, C, F>
where
    T: TemperatureSource,
    V: ValveSink,
    C: Clock + Scheduler,
    F: ValveFeedback,
{
    pub fn with_feedback(
        id: impl Into<RoomId>,
        config: ControllerConfig,
        sensor: T,
        valve: V,
        clock: C,
        feedback: F,
    ) -> Self {
        Self {
            id: id.into(),
            strategy: ControlStrategy::from_config(&config),
            guard: InertiaGuard::from_config(&config),
            exercise: ExerciseStateMachine::from_config(&config),
            config,
            state: ControllerState::default(),
            stats: RoomStatistics::default(),
            exercise_generation: 0,
            reopen_generation: 0,
            reopen_pending: false,
            sensor,
            valve,
            clock,
            feedback,
        }
    }

    /// Set the initial setpoint, clamped into the configured range.
    pub fn with_target(mut self, target: Real) -> Self {
        if target.is_finite() {
            self.state.target_temperature = Some(self.config.clamp_target(target));
        }
        self
    }

    /// Resume from persisted state.
    ///
    /// No wake-ups survive a restart, so an exercise recorded as running is abandoned
    /// and its saved position becomes the desired one.
    pub fn with_state(mut self, mut state: ControllerState) -> Self {
        if state.exercise.is_active() {
            let (idle, restore) = self.exercise.cancel(&state.exercise, state.commanded_position);
            state.exercise = idle;
            if let Some(saved) = restore {
                state.desired_position = saved;
            }
        }
        state.conform_to(&self.config);
        if let Some(target) = state.target_temperature {
            state.target_temperature = Some(self.config.clamp_target(target));
        }
        if state.desired_position != state.commanded_position {
            self.guard.arm_bypass();
        }
        self.state = state;
        self
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn statistics(&self) -> &RoomStatistics {
        &self.stats
    }

    pub fn mode(&self) -> ControlMode {
        self.strategy.mode()
    }

    /// Route an event to its entry point. Returns the percent commanded, if any.
    pub fn handle(&mut self, event: RoomEvent) -> EngineResult<Option<u8>> {
        debug!(room = %self.id, event = event.kind(), "handling event");
        match event {
            RoomEvent::TemperatureUpdated(reading) => self.on_temperature_update(reading),
            RoomEvent::TargetChanged(target) => self.on_target_changed(target),
            RoomEvent::ModeChanged(mode) => self.on_mode_changed(mode),
            RoomEvent::ScheduledTick => self.on_scheduled_tick(),
            RoomEvent::Timer(token) => self.on_timer(token),
            RoomEvent::HeatingEnabled(enabled) => self.set_heating_enabled(enabled),
            RoomEvent::ManualOverride(percent) => self.manual_override(percent),
            RoomEvent::ExerciseRequested => self.request_exercise(),
            RoomEvent::ConfigChanged(config) => self.update_config(config),
            RoomEvent::FeedforwardUpdated(signal) => {
                self.set_feedforward(signal);
                Ok(None)
            }
            RoomEvent::ValveFeedback => {
                self.reconcile_feedback();
                Ok(None)
            }
        }
    }

    /// A new reading was pushed by the host.
    pub fn on_temperature_update(
        &mut self,
        reading: Option<Temperature>,
    ) -> EngineResult<Option<u8>> {
        let now = self.clock.now();
        self.on_reading(now, reading)
    }

    /// Periodic tick: pull a reading from the sensor port and evaluate.
    pub fn on_scheduled_tick(&mut self) -> EngineResult<Option<u8>> {
        let now = self.clock.now();
        let reading = self.sensor.read(&self.id);
        self.on_reading(now, reading)
    }

    /// New setpoint. Re-evaluates immediately, bypassing the command spacing once.
    ///
    /// A setpoint equal to the current one changes nothing.
    pub fn on_target_changed(&mut self, target: Real) -> EngineResult<Option<u8>> {
        let now = self.clock.now();
        if !target.is_finite() {
            warn!(room = %self.id, target, "ignoring non-finite target");
            return Ok(None);
        }
        let clamped = self.config.clamp_target(target);
        if clamped != target {
            warn!(
                room = %self.id,
                requested = target,
                clamped,
                "target outside allowed range, clamped"
            );
        }
        if self.state.target_temperature == Some(clamped) {
            debug!(room = %self.id, target = clamped, "target unchanged");
            return Ok(None);
        }
        info!(room = %self.id, target = clamped, "target changed");
        self.state.target_temperature = Some(clamped);
        self.guard.arm_bypass();
        self.evaluate(now)
    }

    /// Switch strategy. Resets PID memory and cancels a running exercise.
    pub fn on_mode_changed(&mut self, mode: ControlMode) -> EngineResult<Option<u8>> {
        if mode == self.config.mode() {
            debug!(room = %self.id, %mode, "mode unchanged");
            return Ok(None);
        }
        let config = self.config.to_builder().with_mode(mode).build()?;
        self.apply_config(config)
    }

    /// Replace the whole configuration. A different mode has mode-change semantics.
    pub fn update_config(&mut self, config: ControllerConfig) -> EngineResult<Option<u8>> {
        config.validate()?;
        self.apply_config(config)
    }

    /// Turn heating on or off. Off closes the valve immediately and stops exercising.
    pub fn set_heating_enabled(&mut self, enabled: bool) -> EngineResult<Option<u8>> {
        if enabled == self.state.heating_enabled {
            debug!(room = %self.id, enabled, "heating state unchanged");
            return Ok(None);
        }
        let now = self.clock.now();
        info!(room = %self.id, enabled, "heating toggled");
        self.state.heating_enabled = enabled;
        self.guard.arm_bypass();
        if enabled {
            return self.evaluate(now);
        }
        self.cancel_exercise();
        self.state.reset_transient();
        self.state.desired_position = 0;
        self.apply_guard(now)
    }

    /// Command `percent` now. Capped at `max_step_percent`; ends a running exercise.
    pub fn manual_override(&mut self, percent: u8) -> EngineResult<Option<u8>> {
        let now = self.clock.now();
        let max = self.config.max_step_percent();
        let capped = percent.min(max);
        if capped != percent {
            warn!(room = %self.id, requested = percent, capped, "manual override above max step");
        }
        self.cancel_exercise();
        info!(room = %self.id, percent = capped, "manual override");
        self.state.desired_position = capped;
        self.guard.arm_bypass();
        self.apply_guard(now)
    }

    /// Start an exercise now, regardless of the interval.
    pub fn request_exercise(&mut self) -> EngineResult<Option<u8>> {
        let now = self.clock.now();
        if !self.exercise.enabled {
            warn!(room = %self.id, "exercise requested but exercising is disabled");
            return Ok(None);
        }
        if !self.state.heating_enabled {
            warn!(room = %self.id, "exercise requested while heating is off");
            return Ok(None);
        }
        if self.state.exercise.is_active() {
            debug!(room = %self.id, phase = %self.state.exercise.phase, "exercise already running");
            return Ok(None);
        }
        info!(room = %self.id, "exercise requested");
        self.start_exercise(now).map(Some)
    }

    /// Store the feedforward scalar used by the next PID evaluation.
    pub fn set_feedforward(&mut self, signal: Option<Real>) {
        match signal {
            Some(v) if !v.is_finite() => {
                warn!(room = %self.id, value = v, "ignoring non-finite feedforward signal");
            }
            _ => self.state.feedforward_signal = signal,
        }
    }

    /// Compare the actuator's reported position with the commanded one.
    ///
    /// Only logged and recorded, never used for control.
    pub fn reconcile_feedback(&mut self) -> Option<u8> {
        let Some(reported) = self.feedback.read(&self.id) else {
            debug!(room = %self.id, "no valve feedback");
            return None;
        };
        self.stats.record_feedback(reported);
        let commanded = self.state.commanded_position;
        let deviation = (Real::from(reported) - Real::from(commanded)).abs();
        if deviation > self.config.feedback_tolerance_percent() {
            warn!(
                room = %self.id,
                reported,
                commanded,
                "valve position differs from commanded"
            );
        }
        Some(reported)
    }

    /// A wake-up requested through the scheduler has fired.
    pub fn on_timer(&mut self, token: TimerToken) -> EngineResult<Option<u8>> {
        let now = self.clock.now();
        match token.purpose {
            TimerPurpose::ExerciseStep => {
                if token.generation != self.exercise_generation {
                    debug!(room = %self.id, ?token, "stale exercise timer");
                    return Ok(None);
                }
                if !self.state.exercise.is_active() {
                    return Ok(None);
                }
                let (next, action) = self.exercise.on_timer(&self.state.exercise, now)?;
                self.exercise_step(now, next, action).map(Some)
            }
            TimerPurpose::GuardReopen => {
                if token.generation != self.reopen_generation {
                    debug!(room = %self.id, ?token, "stale guard timer");
                    return Ok(None);
                }
                self.reopen_pending = false;
                if self.state.exercise.is_active() {
                    return Ok(None);
                }
                self.apply_guard(now)
            }
        }
    }

    /// Drop pending wake-ups, e.g. before the room is removed.
    pub fn shutdown(&mut self) {
        self.cancel_timer(TimerPurpose::ExerciseStep);
        self.cancel_timer(TimerPurpose::GuardReopen);
        self.reopen_pending = false;
    }

    pub fn exercise_telemetry(&self) -> ExerciseTelemetry {
        let now = self.clock.now();
        ExerciseTelemetry {
            room_id: self.id.clone(),
            last_exercise_time: self.state.exercise.last_exercise_time,
            days_since: self.state.exercise.days_since(now),
            next_due_in_days: self.exercise.next_due_in_days(&self.state.exercise, now),
            state: self.state.exercise.phase,
        }
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            mode: self.config.mode(),
            heating_enabled: self.state.heating_enabled,
            current_temperature: self.state.current_temperature,
            target_temperature: self.state.target_temperature,
            temperature_difference: self.state.error(),
            commanded_position: self.state.commanded_position,
            desired_position: self.state.desired_position,
            max_step_percent: self.config.max_step_percent(),
            valve_step: self.config.valve_step(),
            integral_error: self.state.pid.integral_error,
            pid_terms: self.state.last_pid_terms,
            adjustments: self.stats.adjustments(),
            average_position: self.stats.average_position(),
            temperature_trend: self.stats.temperature_trend(),
            reported_position: self.stats.reported_position(),
            exercise: self.exercise_telemetry(),
        }
    }

    fn on_reading(
        &mut self,
        now: Timestamp,
        reading: Option<Temperature>,
    ) -> EngineResult<Option<u8>> {
        let celsius = match reading.map(|t| ensure_finite(to_celsius(t), "room temperature")) {
            Some(Ok(c)) => c,
            Some(Err(e)) => {
                warn!(room = %self.id, error = %e, "skipping tick");
                return self.exercise_only(now);
            }
            None => {
                warn!(room = %self.id, "temperature unavailable, skipping tick");
                return self.exercise_only(now);
            }
        };
        self.state.current_temperature = Some(celsius);
        self.stats.record_temperature(celsius);
        self.evaluate(now)
    }

    fn apply_config(&mut self, config: ControllerConfig) -> EngineResult<Option<u8>> {
        let now = self.clock.now();
        let previous_mode = self.config.mode();
        self.config = config;
        self.strategy = ControlStrategy::from_config(&self.config);
        self.guard.set_min_cycle(self.config.min_cycle_duration_s());
        self.exercise = ExerciseStateMachine::from_config(&self.config);
        self.state.conform_to(&self.config);
        if let Some(target) = self.state.target_temperature {
            self.state.target_temperature = Some(self.config.clamp_target(target));
        }
        self.guard.arm_bypass();

        let mode_changed = previous_mode != self.config.mode();
        if mode_changed {
            info!(
                room = %self.id,
                from = %previous_mode,
                to = %self.config.mode(),
                "control mode changed"
            );
            self.state.reset_transient();
        }
        let restore = if mode_changed || !self.exercise.enabled {
            self.cancel_exercise()
        } else {
            None
        };
        if let Some(restore) = restore {
            // Uses up the bypass; the new strategy waits for the spacing.
            self.state.desired_position = restore.min(self.config.max_step_percent());
            return self.apply_guard(now);
        }
        self.evaluate(now)
    }

    fn evaluate(&mut self, now: Timestamp) -> EngineResult<Option<u8>> {
        if self.state.exercise.is_active() {
            debug!(
                room = %self.id,
                phase = %self.state.exercise.phase,
                "exercise running, strategy suppressed"
            );
            return Ok(None);
        }
        if let Some(percent) = self.check_exercise(now)? {
            return Ok(Some(percent));
        }
        let (Some(current), Some(target)) =
            (self.state.current_temperature, self.state.target_temperature)
        else {
            debug!(room = %self.id, "temperature or target unknown");
            return Ok(None);
        };

        let input = ControlInput {
            now,
            current_temperature: current,
            target_temperature: target,
            heating_enabled: self.state.heating_enabled,
            commanded_position: self.state.commanded_position,
            feedforward_signal: self.state.feedforward_signal,
        };
        let output = self.strategy.evaluate(&input, &mut self.state.pid);
        if let Some(terms) = output.pid_terms {
            debug!(
                room = %self.id,
                p = terms.p,
                i = terms.i,
                d = terms.d,
                ff = terms.ff,
                output = terms.output,
                "pid terms"
            );
            self.state.last_pid_terms = Some(terms);
        }
        match output.decision.resolve(
            self.state.commanded_position,
            self.config.output_resolution_percent(),
            self.config.max_step_percent(),
        ) {
            Some(desired) => self.state.desired_position = desired,
            None => debug!(room = %self.id, "no new decision this tick"),
        }
        self.apply_guard(now)
    }

    fn apply_guard(&mut self, now: Timestamp) -> EngineResult<Option<u8>> {
        let desired = self.state.desired_position;
        match self.guard.decide(
            now,
            desired,
            self.state.commanded_position,
            self.state.last_command_time,
        ) {
            GuardDecision::Emit => {
                self.emit(now, desired)?;
                Ok(Some(desired))
            }
            GuardDecision::Unchanged => Ok(None),
            GuardDecision::Withhold { remaining_s } => {
                debug!(room = %self.id, desired, remaining_s, "inertia guard withholding change");
                self.schedule_reopen(remaining_s);
                Ok(None)
            }
        }
    }

    /// Deliver `percent` to the valve and update the bookkeeping on success only.
    fn emit(&mut self, now: Timestamp, percent: u8) -> EngineResult<()> {
        if let Err(source) = self.valve.set_opening(&self.id, percent) {
            warn!(room = %self.id, percent, error = %source, "valve command failed");
            // Retried on the next evaluation.
            self.guard.arm_bypass();
            return Err(EngineError::Sink {
                room: self.id.clone(),
                percent,
                source,
            });
        }
        info!(room = %self.id, percent, "valve command");
        self.state.commanded_position = percent;
        self.state.last_command_time = Some(now);
        self.stats.record_command(percent);
        if self.reopen_pending {
            self.cancel_timer(TimerPurpose::GuardReopen);
            self.reopen_pending = false;
        }
        Ok(())
    }

    fn exercise_only(&mut self, now: Timestamp) -> EngineResult<Option<u8>> {
        if self.state.exercise.is_active() {
            return Ok(None);
        }
        self.check_exercise(now)
    }

    fn check_exercise(&mut self, now: Timestamp) -> EngineResult<Option<u8>> {
        if !self.state.heating_enabled || !self.exercise.enabled {
            return Ok(None);
        }
        if !self.exercise.is_due(&self.state.exercise, now) {
            return Ok(None);
        }
        info!(
            room = %self.id,
            days_since = self.state.exercise.days_since(now),
            "exercise due"
        );
        self.start_exercise(now).map(Some)
    }

    fn start_exercise(&mut self, now: Timestamp) -> EngineResult<u8> {
        let (next, action) =
            self.exercise
                .start(&self.state.exercise, now, self.state.commanded_position)?;
        self.exercise_step(now, next, action)
    }

    /// Send an exercise command and commit `next` once it was delivered.
    fn exercise_step(
        &mut self,
        now: Timestamp,
        next: ExerciseState,
        mut action: ExerciseAction,
    ) -> EngineResult<u8> {
        if action.wait_s.is_none() {
            // The cap may have been lowered while the exercise ran.
            action.command = action.command.min(self.config.max_step_percent());
        }
        if let Err(e) = self.emit(now, action.command) {
            if self.state.exercise.is_active() {
                warn!(
                    room = %self.id,
                    phase = %self.state.exercise.phase,
                    retry_s = EXERCISE_RETRY_DELAY_S,
                    "exercise step failed, retrying"
                );
                self.schedule(TimerPurpose::ExerciseStep, EXERCISE_RETRY_DELAY_S);
            }
            return Err(e);
        }
        self.state.exercise = next;
        info!(
            room = %self.id,
            phase = %self.state.exercise.phase,
            percent = action.command,
            "exercise step"
        );
        match action.wait_s {
            Some(wait_s) => self.schedule(TimerPurpose::ExerciseStep, wait_s),
            None => {
                self.state.exercise = self.exercise.finish_restore(&self.state.exercise, now)?;
                self.state.desired_position = action.command;
                self.guard.arm_bypass();
                info!(room = %self.id, "exercise complete");
            }
        }
        Ok(action.command)
    }

    /// Abort a running exercise. Returns the position to restore, if the valve moved.
    fn cancel_exercise(&mut self) -> Option<u8> {
        if !self.state.exercise.is_active() {
            return None;
        }
        let (idle, restore) = self
            .exercise
            .cancel(&self.state.exercise, self.state.commanded_position);
        info!(room = %self.id, phase = %self.state.exercise.phase, "exercise cancelled");
        self.state.exercise = idle;
        self.cancel_timer(TimerPurpose::ExerciseStep);
        restore
    }

    fn generation_mut(&mut self, purpose: TimerPurpose) -> &mut u64 {
        match purpose {
            TimerPurpose::ExerciseStep => &mut self.exercise_generation,
            TimerPurpose::GuardReopen => &mut self.reopen_generation,
        }
    }

    /// Request a wake-up. Any earlier token of the same purpose becomes stale.
    fn schedule(&mut self, purpose: TimerPurpose, delay_s: Real) {
        let generation = self.generation_mut(purpose);
        *generation += 1;
        let token = TimerToken {
            purpose,
            generation: *generation,
        };
        debug!(room = %self.id, ?purpose, delay_s, "scheduling wake-up");
        self.clock.call_after(&self.id, delay_s, token);
    }

    fn cancel_timer(&mut self, purpose: TimerPurpose) {
        let generation = self.generation_mut(purpose);
        let stale = TimerToken {
            purpose,
            generation: *generation,
        };
        *generation += 1;
        self.clock.cancel(&self.id, stale);
    }

    fn schedule_reopen(&mut self, remaining_s: Real) {
        if self.reopen_pending {
            return;
        }
        self.reopen_pending = true;
        self.schedule(TimerPurpose::GuardReopen, remaining_s);
    }
}
