//! Error types for the orchestration layer.

use fv_controls::ControlError;
use fv_core::RoomId;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure reported by a [`ValveSink`](crate::ports::ValveSink).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SinkError {
    /// The actuator refused the command.
    #[error("valve rejected command: {reason}")]
    Rejected { reason: String },

    /// The actuator could not be reached.
    #[error("valve unreachable")]
    Unreachable,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Valve command could not be delivered. Bookkeeping was left untouched.
    #[error("Valve command {percent}% for room {room} failed: {source}")]
    Sink {
        room: RoomId,
        percent: u8,
        #[source]
        source: SinkError,
    },

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("Unknown room: {room}")]
    UnknownRoom { room: RoomId },

    #[error("Room already registered: {room}")]
    DuplicateRoom { room: RoomId },
}
