//! Error types for valve control operations.

use thiserror::Error;

/// Result type for valve control operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur while configuring or driving a room controller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// A configuration field failed validation.
    #[error("Invalid configuration: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// Invalid argument provided to a control function.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// Unknown valve step preset label.
    #[error("Unknown valve step preset: {label}")]
    UnknownValveStep { label: String },

    /// Unknown control mode name.
    #[error("Unknown control mode: {name}")]
    UnknownMode { name: String },

    /// Exercise transition requested from the wrong phase.
    #[error("Exercise state error: {what}")]
    ExerciseState { what: String },

    /// Controller state no longer satisfies its invariants.
    #[error("Controller state error: {what}")]
    StateError { what: String },
}
