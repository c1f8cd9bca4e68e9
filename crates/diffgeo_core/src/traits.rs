use crate::geometry::TangentVector;
use nalgebra::Vector2;

/// Second-order flow on a coordinate patch: acceleration as a function of
/// position and velocity (the geodesic equation in coordinates).
pub trait AccelerationField {
    fn acceleration(&self, state: &TangentVector) -> Vector2<f64>;
}

impl<F> AccelerationField for F
where
    F: Fn(&TangentVector) -> Vector2<f64>,
{
    fn acceleration(&self, state: &TangentVector) -> Vector2<f64> {
        self(state)
    }
}

/// Right-hand side of the parallel-transport equation `V'^k = -Γ^k_ij ẋ^i V^j`
/// for a vector `v` carried along a curve whose tangent state is `state`.
pub trait TransportField {
    fn transport_derivative(&self, state: &TangentVector, v: &Vector2<f64>) -> Vector2<f64>;
}

impl<F> TransportField for F
where
    F: Fn(&TangentVector, &Vector2<f64>) -> Vector2<f64>,
{
    fn transport_derivative(&self, state: &TangentVector, v: &Vector2<f64>) -> Vector2<f64> {
        self(state, v)
    }
}

/// A first-order system `x' = f(t, x)`.
pub trait DynamicalSystem {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// x: current state
    /// t: current time
    /// out: buffer to write dx/dt
    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]);
}

/// A trait for solvers that can step a system forward in place.
pub trait Steppable {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    fn step(&mut self, system: &impl DynamicalSystem, t: &mut f64, state: &mut [f64], dt: f64);
}
