//! Closed-loop simulation: room controllers driving simulated floor-heating plants.
//!
//! Each fixed step:
//!
//! 1. wake-ups due up to `t` are delivered, each at its own due time
//! 2. scripted events due at `t` are posted
//! 3. on tick boundaries every room gets feedforward, a scheduled tick and a
//!    feedback check
//! 4. the queue is drained
//! 5. the plants are integrated over `dt` with the last delivered command

use fv_controls::ControllerConfig;
use fv_core::{RoomId, Timestamp};
use fv_engine::{Engine, RoomController, RoomEvent, RoomSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::VirtualClock;
use crate::error::{SimError, SimResult};
use crate::integrator::{ForwardEuler, Integrator, RK4};
use crate::model::TransientModel;
use crate::plant::{FloorHeatingPlant, PlantParams, PlantState};
use crate::sink::{PlantProbe, RecordingSink, ValveCommand};

/// Engine wired to simulated adapters.
pub type SimEngine = Engine<PlantProbe, RecordingSink, VirtualClock, PlantProbe>;

/// Integrator selection for simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorType {
    /// 4th-order Runge-Kutta (4 rhs calls per step).
    #[default]
    Rk4,
    ForwardEuler,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimOptions {
    /// Fixed plant step (seconds).
    pub dt: f64,
    /// Final simulation time (seconds).
    pub t_end: f64,
    /// Spacing of scheduled ticks (seconds).
    pub tick_interval: f64,
    /// Record a sample every N steps.
    pub record_every: usize,
    pub integrator: IntegratorType,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            dt: 10.0,
            t_end: 86_400.0,
            tick_interval: 300.0,
            record_every: 30,
            integrator: IntegratorType::default(),
        }
    }
}

impl SimOptions {
    pub fn validate(&self) -> SimResult<()> {
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return Err(SimError::InvalidArg {
                what: "dt must be positive",
            });
        }
        if !(self.t_end >= 0.0 && self.t_end.is_finite()) {
            return Err(SimError::InvalidArg {
                what: "t_end must be non-negative",
            });
        }
        if !(self.tick_interval > 0.0 && self.tick_interval.is_finite()) {
            return Err(SimError::InvalidArg {
                what: "tick_interval must be positive",
            });
        }
        if self.record_every == 0 {
            return Err(SimError::InvalidArg {
                what: "record_every must be positive",
            });
        }
        Ok(())
    }
}

/// One simulated room.
#[derive(Clone, Debug)]
pub struct RoomSetup {
    pub id: RoomId,
    pub config: ControllerConfig,
    /// Initial setpoint (°C).
    pub target: f64,
    pub plant: PlantParams,
    pub initial: PlantState,
}

impl RoomSetup {
    /// Room starting in equilibrium at `start_c` with the valve closed.
    pub fn new(id: impl Into<RoomId>, config: ControllerConfig, target: f64, start_c: f64) -> Self {
        Self {
            id: id.into(),
            config,
            target,
            plant: PlantParams::default(),
            initial: PlantState {
                valve: 0.0,
                slab_c: start_c,
                room_c: start_c,
            },
        }
    }
}

/// An event injected at a fixed time.
#[derive(Clone, Debug, PartialEq)]
pub struct ScriptedEvent {
    pub at: f64,
    pub room: RoomId,
    pub event: RoomEvent,
}

#[derive(Clone, Debug)]
pub struct Scenario {
    pub rooms: Vec<RoomSetup>,
    /// Outdoor temperature (°C), constant over the run.
    pub outdoor_c: f64,
    pub events: Vec<ScriptedEvent>,
    /// Feed `max(0, target - outdoor)` to each room on every tick.
    pub feedforward: bool,
}

impl Scenario {
    pub fn new(outdoor_c: f64) -> Self {
        Self {
            rooms: Vec::new(),
            outdoor_c,
            events: Vec::new(),
            feedforward: false,
        }
    }

    pub fn with_room(mut self, room: RoomSetup) -> Self {
        self.rooms.push(room);
        self
    }

    pub fn with_event(mut self, at: f64, room: impl Into<RoomId>, event: RoomEvent) -> Self {
        self.events.push(ScriptedEvent {
            at,
            room: room.into(),
            event,
        });
        self
    }

    pub fn with_feedforward(mut self, enabled: bool) -> Self {
        self.feedforward = enabled;
        self
    }
}

/// Plant and controller values at one recorded instant.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sample {
    pub t: f64,
    pub room: RoomId,
    pub room_c: f64,
    pub slab_c: f64,
    pub valve: f64,
    pub commanded: u8,
    pub target: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SimRecord {
    pub samples: Vec<Sample>,
    pub commands: Vec<ValveCommand>,
    /// Final controller snapshots.
    pub snapshots: Vec<RoomSnapshot>,
    /// Events that ended in an error.
    pub errors: usize,
}

impl SimRecord {
    pub fn samples_for<'a>(&'a self, room: &'a RoomId) -> impl Iterator<Item = &'a Sample> + 'a {
        self.samples.iter().filter(move |s| &s.room == room)
    }
}

struct SimRoom {
    id: RoomId,
    plant: FloorHeatingPlant,
    x: PlantState,
}

/// A running closed-loop simulation.
pub struct Simulation {
    opts: SimOptions,
    engine: SimEngine,
    rooms: Vec<SimRoom>,
    clock: VirtualClock,
    sink: RecordingSink,
    probe: PlantProbe,
    events: Vec<ScriptedEvent>,
    next_event: usize,
    outdoor_c: f64,
    feedforward: bool,
    t: f64,
    step: usize,
    next_tick: f64,
    errors: usize,
    samples: Vec<Sample>,
}

impl Simulation {
    pub fn new(scenario: Scenario, opts: SimOptions) -> SimResult<Self> {
        opts.validate()?;
        if !scenario.outdoor_c.is_finite() {
            return Err(SimError::InvalidArg {
                what: "outdoor temperature must be finite",
            });
        }
        let clock = VirtualClock::new();
        let sink = RecordingSink::new(clock.clone());
        let probe = PlantProbe::new();
        let mut engine = SimEngine::new();
        let mut rooms = Vec::with_capacity(scenario.rooms.len());

        for setup in scenario.rooms {
            let plant = FloorHeatingPlant::new(setup.plant, setup.initial, scenario.outdoor_c)?;
            probe.publish(&setup.id, setup.initial);
            let controller = RoomController::with_feedback(
                setup.id.clone(),
                setup.config,
                probe.clone(),
                sink.clone(),
                clock.clone(),
                probe.clone(),
            )
            .with_target(setup.target);
            engine.add_room(controller)?;
            rooms.push(SimRoom {
                id: setup.id,
                x: plant.initial_state(),
                plant,
            });
        }

        let mut events = scenario.events;
        events.sort_by(|a, b| a.at.total_cmp(&b.at));

        Ok(Self {
            opts,
            engine,
            rooms,
            clock,
            sink,
            probe,
            events,
            next_event: 0,
            outdoor_c: scenario.outdoor_c,
            feedforward: scenario.feedforward,
            t: 0.0,
            step: 0,
            next_tick: 0.0,
            errors: 0,
            samples: Vec::new(),
        })
    }

    pub fn time(&self) -> f64 {
        self.t
    }

    pub fn is_finished(&self) -> bool {
        self.t >= self.opts.t_end
    }

    pub fn engine(&self) -> &SimEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SimEngine {
        &mut self.engine
    }

    pub fn sink(&self) -> &RecordingSink {
        &self.sink
    }

    pub fn probe(&self) -> &PlantProbe {
        &self.probe
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    /// Drain the engine queue, counting failed events.
    fn drain(&mut self) {
        let outcomes = self.engine.run_pending();
        self.errors += outcomes.iter().filter(|o| o.result.is_err()).count();
    }

    fn deliver_timers(&mut self) {
        let until = Timestamp::from_secs(self.t);
        while let Some(due) = self.clock.pop_due(until) {
            self.clock.set_time(due.due);
            self.engine.post(due.room, RoomEvent::Timer(due.token));
            self.drain();
        }
    }

    fn post_scripted(&mut self) {
        while let Some(ev) = self.events.get(self.next_event) {
            if ev.at > self.t {
                break;
            }
            self.engine.post(ev.room.clone(), ev.event.clone());
            self.next_event += 1;
        }
    }

    fn post_tick(&mut self) {
        if self.t < self.next_tick {
            return;
        }
        self.next_tick += self.opts.tick_interval;
        for room in &self.rooms {
            if self.feedforward {
                let target = self
                    .engine
                    .room(&room.id)
                    .and_then(|r| r.state().target_temperature);
                let deficit = target.map(|t| (t - self.outdoor_c).max(0.0));
                self.engine
                    .post(room.id.clone(), RoomEvent::FeedforwardUpdated(deficit));
            }
            self.engine.post(room.id.clone(), RoomEvent::ScheduledTick);
            self.engine.post(room.id.clone(), RoomEvent::ValveFeedback);
        }
        debug!(t = self.t, "tick posted");
    }

    fn integrate(&mut self) -> SimResult<()> {
        let dt = self.opts.dt;
        for room in &mut self.rooms {
            if let Some(percent) = self.sink.latest(&room.id) {
                room.plant.command_percent = f64::from(percent);
            }
            let x = match self.opts.integrator {
                IntegratorType::Rk4 => RK4.step(&mut room.plant, self.t, &room.x, dt)?,
                IntegratorType::ForwardEuler => {
                    ForwardEuler.step(&mut room.plant, self.t, &room.x, dt)?
                }
            };
            room.x = PlantState {
                valve: x.valve.clamp(0.0, 100.0),
                ..x
            };
            self.probe.publish(&room.id, room.x);
        }
        Ok(())
    }

    fn record(&mut self) {
        for room in &self.rooms {
            let controller = self.engine.room(&room.id);
            self.samples.push(Sample {
                t: self.t,
                room: room.id.clone(),
                room_c: room.x.room_c,
                slab_c: room.x.slab_c,
                valve: room.x.valve,
                commanded: controller.map_or(0, |r| r.state().commanded_position),
                target: controller.and_then(|r| r.state().target_temperature),
            });
        }
    }

    /// Advance one `dt`.
    pub fn step(&mut self) -> SimResult<()> {
        if self.step == 0 {
            self.record();
        }
        self.deliver_timers();
        self.clock.set_time(Timestamp::from_secs(self.t));
        self.post_scripted();
        self.post_tick();
        self.drain();
        self.integrate()?;
        self.step += 1;
        self.t = self.step as f64 * self.opts.dt;
        self.clock.set_time(Timestamp::from_secs(self.t));
        if self.step % self.opts.record_every == 0 {
            self.record();
        }
        Ok(())
    }

    /// Run to `t_end` and collect the record.
    pub fn run(mut self) -> SimResult<SimRecord> {
        info!(
            rooms = self.rooms.len(),
            t_end = self.opts.t_end,
            dt = self.opts.dt,
            "simulation started"
        );
        while !self.is_finished() {
            self.step()?;
        }
        let record = self.finish();
        info!(
            commands = record.commands.len(),
            errors = record.errors,
            "simulation finished"
        );
        Ok(record)
    }

    pub fn finish(self) -> SimRecord {
        SimRecord {
            samples: self.samples,
            commands: self.sink.commands(),
            snapshots: self.engine.snapshots(),
            errors: self.errors,
        }
    }
}

/// Run `scenario` to completion.
pub fn run_sim(scenario: Scenario, opts: &SimOptions) -> SimResult<SimRecord> {
    Simulation::new(scenario, opts.clone())?.run()
}
