use crate::{CoreError, CoreResult};

/// Floating point type used throughout system
pub type Real = f64;

/// Upper bound of any valve opening, in percent.
pub const FULL_OPEN_PERCENT: u8 = 100;

pub fn ensure_finite(v: Real, what: &'static str) -> CoreResult<Real> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Clamp a raw opening into `[0, max_percent]`. NaN maps to closed.
pub fn clamp_percent(v: Real, max_percent: u8) -> Real {
    if v.is_nan() {
        return 0.0;
    }
    v.clamp(0.0, Real::from(max_percent.min(FULL_OPEN_PERCENT)))
}

/// Quantize a raw opening to the actuator resolution and cap at `max_percent`.
///
/// `resolution` is the step width in percent: 1 keeps whole percents, 20 yields
/// the six presets 0/20/40/60/80/100.
pub fn quantize_percent(v: Real, resolution: u8, max_percent: u8) -> u8 {
    let max_percent = max_percent.min(FULL_OPEN_PERCENT);
    let clamped = clamp_percent(v, max_percent);
    let step = Real::from(resolution.max(1));
    let snapped = (clamped / step).round() * step;
    (snapped.min(Real::from(max_percent))).round() as u8
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[Real]) -> Option<Real> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<Real>() / values.len() as Real)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn quantized_never_exceeds_max(
            v in -500.0_f64..500.0,
            res in 1_u8..=100,
            max in 0_u8..=100,
        ) {
            let q = quantize_percent(v, res, max);
            prop_assert!(q <= max);
        }
    }
}
