//! TransientModel trait for pluggable dynamic systems.

use crate::error::SimResult;

/// A dynamic system `x_dot = f(t, x)` integrated with fixed steps.
///
/// Inputs that change between steps (valve command, outdoor temperature) are held in
/// the model and stay constant across one step.
pub trait TransientModel {
    type State: Clone;

    fn initial_state(&self) -> Self::State;

    /// Compute the state derivative at `(t, x)`.
    fn rhs(&mut self, t: f64, x: &Self::State) -> SimResult<Self::State>;

    /// Element-wise `a + b`.
    fn add(&self, a: &Self::State, b: &Self::State) -> Self::State;

    /// Element-wise `scale * a`.
    fn scale(&self, a: &Self::State, scale: f64) -> Self::State;
}
