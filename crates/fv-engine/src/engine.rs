//! Multi-room container.
//!
//! Rooms share nothing. Events are queued in posting order and processed strictly one at
//! a time, so an event arriving while another is handled waits for it to complete.

use std::collections::{BTreeMap, VecDeque};

use fv_core::RoomId;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::event::RoomEvent;
use crate::ports::{Clock, NoFeedback, Scheduler, TemperatureSource, ValveFeedback, ValveSink};
use crate::room::RoomController;
use crate::telemetry::{ExerciseTelemetry, RoomSnapshot};

/// Result of processing one queued event.
#[derive(Debug)]
pub struct Outcome {
    pub room: RoomId,
    pub event: &'static str,
    pub result: EngineResult<Option<u8>>,
}

#[derive(Debug)]
pub struct Engine<T, V, C, F = NoFeedback> {
    rooms: BTreeMap<RoomId, RoomController<T, V, C, F>>,
    queue: VecDeque<(RoomId, RoomEvent)>,
}

impl<T, V, C, F> Default for Engine<T, V, C, F> {
    fn default() -> Self {
        Self {
            rooms: BTreeMap::new(),
            queue: VecDeque::new(),
        }
    }
}

impl<T, V, C, F> Engine<T, V, C, F>
where
    T: TemperatureSource,
    V: ValveSink,
    C: Clock + Scheduler,
    F: ValveFeedback,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_room(&mut self, room: RoomController<T, V, C, F>) -> EngineResult<()> {
        if self.rooms.contains_key(room.id()) {
            return Err(EngineError::DuplicateRoom {
                room: room.id().clone(),
            });
        }
        self.rooms.insert(room.id().clone(), room);
        Ok(())
    }

    /// Remove a room, cancelling its wake-ups and dropping its queued events.
    pub fn remove_room(&mut self, id: &RoomId) -> Option<RoomController<T, V, C, F>> {
        let mut room = self.rooms.remove(id)?;
        room.shutdown();
        self.queue.retain(|(queued, _)| queued != id);
        Some(room)
    }

    pub fn room(&self, id: &RoomId) -> Option<&RoomController<T, V, C, F>> {
        self.rooms.get(id)
    }

    pub fn room_mut(&mut self, id: &RoomId) -> Option<&mut RoomController<T, V, C, F>> {
        self.rooms.get_mut(id)
    }

    pub fn room_ids(&self) -> impl Iterator<Item = &RoomId> {
        self.rooms.keys()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Queue an event for later processing.
    pub fn post(&mut self, room: RoomId, event: RoomEvent) {
        self.queue.push_back((room, event));
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Deliver an event right away.
    pub fn dispatch(&mut self, id: &RoomId, event: RoomEvent) -> EngineResult<Option<u8>> {
        let room = self
            .rooms
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownRoom { room: id.clone() })?;
        room.handle(event)
    }

    /// Process queued events in order until the queue is empty.
    ///
    /// A failing event does not stop the queue; its error is reported in the outcome.
    pub fn run_pending(&mut self) -> Vec<Outcome> {
        let mut outcomes = Vec::with_capacity(self.queue.len());
        while let Some((room, event)) = self.queue.pop_front() {
            let kind = event.kind();
            let result = self.dispatch(&room, event);
            if let Err(e) = &result {
                warn!(%room, event = kind, error = %e, "event failed");
            }
            outcomes.push(Outcome {
                room,
                event: kind,
                result,
            });
        }
        debug!(processed = outcomes.len(), "queue drained");
        outcomes
    }

    /// Post `event` to every room.
    pub fn broadcast(&mut self, event: RoomEvent) {
        let ids: Vec<RoomId> = self.rooms.keys().cloned().collect();
        for id in ids {
            self.post(id, event.clone());
        }
    }

    pub fn exercise_telemetry(&self) -> Vec<ExerciseTelemetry> {
        self.rooms.values().map(|r| r.exercise_telemetry()).collect()
    }

    pub fn snapshots(&self) -> Vec<RoomSnapshot> {
        self.rooms.values().map(|r| r.snapshot()).collect()
    }
}
