//! Port traits: the boundary between the room controllers and the host.
//!
//! ```text
//!   host adapter ──▶ port trait ──▶ RoomController
//! ```
//!
//! Each room is handed its own capability objects at construction. Nothing is looked
//! up by name at call time. Hosts sharing one adapter across rooms pass clones of a
//! shared handle (`Rc`, `Arc`, `Rc<RefCell<_>>`, `Arc<Mutex<_>>`).

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use fv_core::{Real, RoomId, Temperature, Timestamp};

use crate::error::SinkError;
use crate::event::TimerToken;

/// Current room temperature, or `None` when the sensor is unavailable.
pub trait TemperatureSource {
    fn read(&self, room: &RoomId) -> Option<Temperature>;
}

/// Position reported back by the actuator, for reconciliation only.
pub trait ValveFeedback {
    fn read(&self, room: &RoomId) -> Option<u8>;
}

/// The only mutation the engine performs on the outside world.
pub trait ValveSink {
    /// Fire-and-forget: the actual position is observed later through feedback.
    fn set_opening(&mut self, room: &RoomId, percent: u8) -> Result<(), SinkError>;
}

/// Monotonic time source.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// One-shot wake-ups. When due, the host delivers `RoomEvent::Timer(token)` to `room`.
pub trait Scheduler {
    fn call_after(&mut self, room: &RoomId, delay_s: Real, token: TimerToken);

    /// Drop a pending wake-up. Stale tokens are ignored by the room anyway.
    fn cancel(&mut self, _room: &RoomId, _token: TimerToken) {}
}

/// For hosts without position feedback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFeedback;

impl ValveFeedback for NoFeedback {
    fn read(&self, _room: &RoomId) -> Option<u8> {
        None
    }
}

// Shared handles

impl<T: TemperatureSource + ?Sized> TemperatureSource for Rc<T> {
    fn read(&self, room: &RoomId) -> Option<Temperature> {
        (**self).read(room)
    }
}

impl<T: TemperatureSource + ?Sized> TemperatureSource for Arc<T> {
    fn read(&self, room: &RoomId) -> Option<Temperature> {
        (**self).read(room)
    }
}

impl<T: ValveFeedback + ?Sized> ValveFeedback for Rc<T> {
    fn read(&self, room: &RoomId) -> Option<u8> {
        (**self).read(room)
    }
}

impl<T: ValveFeedback + ?Sized> ValveFeedback for Arc<T> {
    fn read(&self, room: &RoomId) -> Option<u8> {
        (**self).read(room)
    }
}

impl<T: Clock + ?Sized> Clock for Rc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

impl<T: ValveSink + ?Sized> ValveSink for Rc<RefCell<T>> {
    fn set_opening(&mut self, room: &RoomId, percent: u8) -> Result<(), SinkError> {
        self.borrow_mut().set_opening(room, percent)
    }
}

impl<T: ValveSink + ?Sized> ValveSink for Arc<Mutex<T>> {
    fn set_opening(&mut self, room: &RoomId, percent: u8) -> Result<(), SinkError> {
        self.lock()
            .map_err(|_| SinkError::Unreachable)?
            .set_opening(room, percent)
    }
}

impl<T: Scheduler + ?Sized> Scheduler for Rc<RefCell<T>> {
    fn call_after(&mut self, room: &RoomId, delay_s: Real, token: TimerToken) {
        self.borrow_mut().call_after(room, delay_s, token);
    }

    fn cancel(&mut self, room: &RoomId, token: TimerToken) {
        self.borrow_mut().cancel(room, token);
    }
}
