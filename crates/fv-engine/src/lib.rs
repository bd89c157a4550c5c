//! Orchestration layer for floorvalve.
//!
//! Composes the pure primitives of `fv-controls` into a per-room control loop driven by
//! host events. The host supplies time, one-shot wake-ups, temperature readings and the
//! valve sink through the traits in [`ports`]; wake-ups come back as
//! [`RoomEvent::Timer`] events carrying the token handed out when they were requested.

pub mod engine;
pub mod error;
pub mod event;
pub mod ports;
pub mod room;
pub mod telemetry;

pub use engine::{Engine, Outcome};
pub use error::{EngineError, EngineResult, SinkError};
pub use event::{RoomEvent, TimerPurpose, TimerToken};
pub use ports::{Clock, NoFeedback, Scheduler, TemperatureSource, ValveFeedback, ValveSink};
pub use room::RoomController;
pub use telemetry::{ExerciseTelemetry, RoomSnapshot, RoomStatistics};
