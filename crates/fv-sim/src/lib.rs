//! Closed-loop simulation for floorvalve.
//!
//! Provides:
//! - a lumped floor-heating room model (valve motor, slab, room air)
//! - fixed-step RK4 and forward Euler integrators
//! - virtual clock, recording valve sink and plant probe adapters for the engine ports
//! - a runner that drives an `fv_engine::Engine` against the plants

pub mod actuator;
pub mod clock;
pub mod error;
pub mod integrator;
pub mod model;
pub mod plant;
pub mod sim;
pub mod sink;

pub use actuator::ValveMotor;
pub use clock::{DueTimer, VirtualClock};
pub use error::{SimError, SimResult};
pub use integrator::{ForwardEuler, Integrator, RK4};
pub use model::TransientModel;
pub use plant::{FloorHeatingPlant, PlantParams, PlantState};
pub use sim::{
    IntegratorType, RoomSetup, Sample, Scenario, ScriptedEvent, SimEngine, SimOptions, SimRecord,
    Simulation, run_sim,
};
pub use sink::{PlantProbe, RecordingSink, ValveCommand};
