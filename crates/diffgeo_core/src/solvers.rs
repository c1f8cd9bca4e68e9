use crate::geometry::{PlaneCurve, TangentVector};
use crate::traits::{AccelerationField, DynamicalSystem, Steppable, TransportField};
use nalgebra::Vector2;

/// Velocity-Verlet (kick-drift-kick) stepper for second-order flows.
///
/// Position advances with the half-step velocity, so the scheme is
/// time-reversible and keeps the speed of geodesics from drifting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Symplectic2 {
    pub dt: f64,
}

impl Symplectic2 {
    pub fn new(dt: f64) -> Self {
        Self { dt }
    }

    pub fn step<A: AccelerationField + ?Sized>(&self, field: &A, state: &TangentVector) -> TangentVector {
        let h = self.dt;
        let a0 = field.acceleration(state);
        let vel_half = state.vel + a0 * (0.5 * h);
        let pos = state.pos + vel_half * h;
        let a1 = field.acceleration(&TangentVector::new(pos, vel_half));
        TangentVector::new(pos, vel_half + a1 * (0.5 * h))
    }
}

/// Classic RK4 for a vector carried along a plane curve.
///
/// The curve supplies the tangent state at `t`, `t + h/2` and `t + h`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportRk4 {
    pub dt: f64,
}

impl TransportRk4 {
    pub fn new(dt: f64) -> Self {
        Self { dt }
    }

    pub fn step<F, C>(&self, field: &F, curve: &C, t: f64, v: &Vector2<f64>) -> Vector2<f64>
    where
        F: TransportField + ?Sized,
        C: PlaneCurve + ?Sized,
    {
        let h = self.dt;
        let start = curve.tangent(t);
        let mid = curve.tangent(t + 0.5 * h);
        let end = curve.tangent(t + h);

        let k1 = field.transport_derivative(&start, v) * h;
        let k2 = field.transport_derivative(&mid, &(v + k1 * 0.5)) * h;
        let k3 = field.transport_derivative(&mid, &(v + k2 * 0.5)) * h;
        let k4 = field.transport_derivative(&end, &(v + k3)) * h;

        v + (k1 + k2 * 2.0 + k3 * 2.0 + k4) / 6.0
    }
}

/// Classic Runge-Kutta 4th order solver for first-order systems.
pub struct RK4 {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    tmp: Vec<f64>,
}

impl RK4 {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![0.0; dim],
            k2: vec![0.0; dim],
            k3: vec![0.0; dim],
            k4: vec![0.0; dim],
            tmp: vec![0.0; dim],
        }
    }
}

impl Steppable for RK4 {
    fn step(&mut self, system: &impl DynamicalSystem, t: &mut f64, state: &mut [f64], dt: f64) {
        let t0 = *t;

        system.apply(t0, state, &mut self.k1);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + 0.5 * dt * self.k1[i];
        }
        system.apply(t0 + 0.5 * dt, &self.tmp, &mut self.k2);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + 0.5 * dt * self.k2[i];
        }
        system.apply(t0 + 0.5 * dt, &self.tmp, &mut self.k3);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        for i in 0..state.len() {
            state[i] += dt / 6.0 * (self.k1[i] + 2.0 * self.k2[i] + 2.0 * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}
