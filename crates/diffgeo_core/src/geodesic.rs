use crate::geometry::{DiffGeometry, PlaneCurve, TangentVector};
use crate::settings::GeodesicSettings;
use crate::solvers::Symplectic2;
use crate::transport::BoundaryTransport;
use log::debug;
use nalgebra::{Vector2, Vector3};

/// Traces a geodesic from `initial` and returns its embedded polyline.
///
/// The first point is the embedding of the initial position; one point is
/// added per step. Integration stops after `max_steps`, or right after the
/// first point that leaves the coordinate domain (that point is kept).
pub fn integrate_geodesic<G: DiffGeometry + ?Sized>(
    geometry: &G,
    initial: &TangentVector,
    settings: &GeodesicSettings,
) -> Vec<Vector3<f64>> {
    let stepper = Symplectic2::new(settings.step);
    let mut points = Vec::with_capacity(settings.max_steps + 1);
    let mut state = *initial;
    points.push(geometry.parameterization(state.pos.x, state.pos.y));

    for step in 0..settings.max_steps {
        state = stepper.step(geometry, &state);
        points.push(geometry.parameterization(state.pos.x, state.pos.y));
        if geometry.outside(&state.pos) {
            debug!("geodesic left the domain after {} steps", step + 1);
            break;
        }
    }
    points
}

/// A fan of `count` unit-speed initial states at `center`, with directions
/// spread over `angle ± spread / 2`.
pub fn spray(center: Vector2<f64>, angle: f64, spread: f64, count: usize) -> Vec<TangentVector> {
    (0..count)
        .map(|i| {
            let offset = i as f64 / count as f64 - 0.5;
            let a = angle + spread * offset;
            TangentVector::new(center, Vector2::new(a.cos(), a.sin()))
        })
        .collect()
}

/// `count` initial states anchored along a boundary curve around parameter
/// `pos`, each carrying the direction `(sin angle, cos angle)` transported
/// from the start of the curve.
pub fn stripes<C: PlaneCurve>(
    boundary: &BoundaryTransport<C>,
    pos: f64,
    angle: f64,
    spread: f64,
    count: usize,
) -> Vec<TangentVector> {
    let direction = Vector2::new(angle.sin(), angle.cos());
    (0..count)
        .map(|i| {
            let offset = i as f64 / count as f64 - 0.5;
            boundary.at(pos + spread * offset, &direction)
        })
        .collect()
}
