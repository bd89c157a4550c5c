//! fv-core: stable foundation for floorvalve.
//!
//! Contains:
//! - units (uom temperature types + constructors)
//! - numeric (Real + finite checks + percent helpers)
//! - ids (room identifiers)
//! - time (monotonic timestamps)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod time;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
pub use time::*;
pub use units::*;
