//! Host-side adapters for simulated rooms: a recording valve sink and a probe that
//! reads the plants back.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use fv_core::{RoomId, Temperature, Timestamp, celsius};
use fv_engine::{Clock, SinkError, TemperatureSource, ValveFeedback, ValveSink};
use serde::Serialize;

use crate::clock::VirtualClock;
use crate::plant::PlantState;

/// One delivered valve command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValveCommand {
    pub time: Timestamp,
    pub room: RoomId,
    pub percent: u8,
}

#[derive(Debug, Default)]
struct SinkLog {
    commands: Vec<ValveCommand>,
    latest: BTreeMap<RoomId, u8>,
    failing: BTreeSet<RoomId>,
    rejected: usize,
}

/// Valve sink that records every command with its virtual time.
///
/// Rooms can be marked failing to exercise the retry paths.
#[derive(Debug, Clone)]
pub struct RecordingSink {
    clock: VirtualClock,
    log: Arc<Mutex<SinkLog>>,
}

impl RecordingSink {
    pub fn new(clock: VirtualClock) -> Self {
        Self {
            clock,
            log: Arc::default(),
        }
    }

    fn log(&self) -> MutexGuard<'_, SinkLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_failing(&self, room: &RoomId, failing: bool) {
        let mut log = self.log();
        if failing {
            log.failing.insert(room.clone());
        } else {
            log.failing.remove(room);
        }
    }

    pub fn commands(&self) -> Vec<ValveCommand> {
        self.log().commands.clone()
    }

    pub fn commands_for(&self, room: &RoomId) -> Vec<u8> {
        self.log()
            .commands
            .iter()
            .filter(|c| &c.room == room)
            .map(|c| c.percent)
            .collect()
    }

    /// Last percent delivered to `room`.
    pub fn latest(&self, room: &RoomId) -> Option<u8> {
        self.log().latest.get(room).copied()
    }

    pub fn rejected(&self) -> usize {
        self.log().rejected
    }
}

impl ValveSink for RecordingSink {
    fn set_opening(&mut self, room: &RoomId, percent: u8) -> Result<(), SinkError> {
        let time = self.clock.now();
        let mut log = self.log();
        if log.failing.contains(room) {
            log.rejected += 1;
            return Err(SinkError::Rejected {
                reason: format!("{room} is not accepting commands"),
            });
        }
        log.latest.insert(room.clone(), percent);
        log.commands.push(ValveCommand {
            time,
            room: room.clone(),
            percent,
        });
        Ok(())
    }
}

/// Read-only view of the simulated plants: room temperature and actual valve position.
#[derive(Debug, Clone, Default)]
pub struct PlantProbe {
    states: Arc<Mutex<BTreeMap<RoomId, PlantState>>>,
}

impl PlantProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn states(&self) -> MutexGuard<'_, BTreeMap<RoomId, PlantState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn publish(&self, room: &RoomId, state: PlantState) {
        self.states().insert(room.clone(), state);
    }

    /// Make `room` report no reading until the next publish.
    pub fn forget(&self, room: &RoomId) {
        self.states().remove(room);
    }

    pub fn get(&self, room: &RoomId) -> Option<PlantState> {
        self.states().get(room).copied()
    }
}

impl TemperatureSource for PlantProbe {
    fn read(&self, room: &RoomId) -> Option<Temperature> {
        self.get(room).map(|s| celsius(s.room_c))
    }
}

impl ValveFeedback for PlantProbe {
    fn read(&self, room: &RoomId) -> Option<u8> {
        let valve = self.get(room)?.valve;
        if !valve.is_finite() {
            return None;
        }
        // Within [0, 100] after the clamp, so the cast is exact.
        Some(valve.round().clamp(0.0, 100.0) as u8)
    }
}
