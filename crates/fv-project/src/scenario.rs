//! Turn a validated site into a simulation scenario.

use fv_core::RoomId;
use fv_engine::RoomEvent;
use fv_sim::{RoomSetup, Scenario, ScriptedEvent, SimOptions};

use crate::schema::{EventKindDef, Site, SimulationDef};
use crate::validate::{ValidationError, controller_config};

/// Starting temperature of rooms without `initial_c`.
pub const DEFAULT_INITIAL_C: f64 = 18.0;

pub fn build_scenario(site: &Site) -> Result<(Scenario, SimOptions), ValidationError> {
    let sim = site.simulation.clone().unwrap_or_default();
    let mut scenario = Scenario::new(sim.outdoor_c).with_feedforward(sim.feedforward);

    for room in &site.rooms {
        let config = controller_config(&room.id, &room.controller)?;
        let start = room.initial_c.unwrap_or(DEFAULT_INITIAL_C);
        let mut setup = RoomSetup::new(room.id.as_str(), config, room.target_c, start);
        if let Some(plant) = room.plant {
            setup.plant = plant;
        }
        scenario = scenario.with_room(setup);
    }

    for event in scripted_events(site, &sim)? {
        scenario.events.push(event);
    }
    Ok((scenario, sim.options))
}

/// A valve step event applies the room's file configuration with the new preset.
fn scripted_events(
    site: &Site,
    sim: &SimulationDef,
) -> Result<Vec<ScriptedEvent>, ValidationError> {
    let mut events = Vec::with_capacity(sim.events.len());
    for def in &sim.events {
        let event = match &def.kind {
            EventKindDef::Target { celsius } => RoomEvent::TargetChanged(*celsius),
            EventKindDef::Mode { mode } => RoomEvent::ModeChanged(*mode),
            EventKindDef::Heating { enabled } => RoomEvent::HeatingEnabled(*enabled),
            EventKindDef::ManualOverride { percent } => RoomEvent::ManualOverride(*percent),
            EventKindDef::Exercise => RoomEvent::ExerciseRequested,
            EventKindDef::ValveStep { step } => {
                let room = site
                    .rooms
                    .iter()
                    .find(|r| r.id == def.room)
                    .ok_or_else(|| ValidationError::MissingReference {
                        id: def.room.clone(),
                        context: "simulation event room".to_string(),
                    })?;
                let base = controller_config(&room.id, &room.controller)?;
                let config = base.to_builder().with_valve_step(*step).build().map_err(|source| {
                    ValidationError::Controller {
                        room: room.id.clone(),
                        source,
                    }
                })?;
                RoomEvent::ConfigChanged(config)
            }
        };
        events.push(ScriptedEvent {
            at: def.at_s,
            room: RoomId::new(def.room.as_str()),
            event,
        });
    }
    Ok(events)
}
