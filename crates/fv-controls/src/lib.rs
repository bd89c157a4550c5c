//! Valve control primitives for floorvalve.
//!
//! This crate holds the pure, synchronous part of the valve control engine. It maps a
//! room's temperature error onto a valve opening and decides when a new opening may be
//! sent. Nothing here performs I/O or waits; timers are described as return values and
//! driven by the host through `fv-engine`.
//!
//! # Architecture
//!
//! - `ControllerConfig` is built and validated once through its builder
//! - `ControllerState` carries the per-room memory mutated each tick
//! - `ControlStrategy` selects one of Binary, Proportional or PID by enum
//! - `InertiaGuard` spaces valve commands by `min_cycle_duration`
//! - `ExerciseStateMachine` describes the anti-calcification cycle
//!
//! Openings are percentages. Strategies produce raw `f64` openings which are quantized
//! to the actuator resolution and capped at `max_step_percent` before being commanded.

pub mod binary;
pub mod config;
pub mod error;
pub mod exercise;
pub mod guard;
pub mod pid;
pub mod proportional;
pub mod state;
pub mod strategy;

pub use binary::HysteresisGate;
pub use config::{ControlMode, ControllerConfig, ControllerConfigBuilder, ValveStep};
pub use error::{ControlError, ControlResult};
pub use exercise::{ExerciseAction, ExercisePhase, ExerciseState, ExerciseStateMachine};
pub use guard::{GuardDecision, InertiaGuard};
pub use pid::{PidController, PidSkip, PidTerms, PidUpdate};
pub use proportional::ProportionalStrategy;
pub use state::{ControllerState, PidMemory};
pub use strategy::{ControlInput, ControlStrategy, Decision, StrategyOutput};
