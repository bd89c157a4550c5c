//! Error types for simulation runs.

use fv_engine::EngineError;
use thiserror::Error;

/// Errors encountered while setting up or running a simulation.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Non-physical condition: {what}")]
    NonPhysical { what: &'static str },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type SimResult<T> = Result<T, SimError>;
