//! Monotonic time as seen by the control core.
//!
//! The core never reads a wall clock. Hosts supply `Timestamp`s (seconds since an
//! arbitrary epoch) through their clock port; all spacing rules compare timestamps.

use core::fmt;
use core::ops::{Add, Sub};

pub const SECONDS_PER_MINUTE: f64 = 60.0;
pub const SECONDS_PER_HOUR: f64 = 3_600.0;
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Monotonic instant in seconds.
#[derive(Clone, Copy, PartialEq, PartialOrd, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Timestamp(f64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0.0);

    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    pub fn as_secs(self) -> f64 {
        self.0
    }

    /// Seconds elapsed from `earlier` to `self`. Negative if the clock went backwards.
    pub fn secs_since(self, earlier: Timestamp) -> f64 {
        self.0 - earlier.0
    }
}

impl Add<f64> for Timestamp {
    type Output = Timestamp;

    fn add(self, secs: f64) -> Timestamp {
        Timestamp(self.0 + secs)
    }
}

impl Sub for Timestamp {
    type Output = f64;

    fn sub(self, rhs: Timestamp) -> f64 {
        self.secs_since(rhs)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={:.3}s", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}s", self.0)
    }
}

/// Convert days to seconds.
pub fn days(d: f64) -> f64 {
    d * SECONDS_PER_DAY
}

/// Convert minutes to seconds.
pub fn minutes(m: f64) -> f64 {
    m * SECONDS_PER_MINUTE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        let t0 = Timestamp::from_secs(100.0);
        let t1 = t0 + 50.0;
        assert_eq!(t1 - t0, 50.0);
        assert_eq!(t0.secs_since(t1), -50.0);
        assert!(t1 > t0);
    }

    #[test]
    fn unit_helpers() {
        assert_eq!(days(7.0), 604_800.0);
        assert_eq!(minutes(5.0), 300.0);
    }
}
