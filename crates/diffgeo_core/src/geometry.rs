//! Value types shared by the geometry engines: tangent states, coordinate
//! domains, plane curves, and the abstract surface interface.

use crate::error::GeometryError;
use crate::traits::AccelerationField;
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// A point of the coordinate patch together with a velocity there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TangentVector {
    pub pos: Vector2<f64>,
    pub vel: Vector2<f64>,
}

impl TangentVector {
    pub fn new(pos: Vector2<f64>, vel: Vector2<f64>) -> Self {
        Self { pos, vel }
    }

    pub fn from_components(x: f64, y: f64, vx: f64, vy: f64) -> Self {
        Self::new(Vector2::new(x, y), Vector2::new(vx, vy))
    }
}

/// Rectangular coordinate domain `[[x0, x1], [y0, y1]]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub x: [f64; 2],
    pub y: [f64; 2],
}

impl Default for Domain {
    fn default() -> Self {
        Self {
            x: [0.0, 1.0],
            y: [0.0, 1.0],
        }
    }
}

impl Domain {
    pub fn new(x: [f64; 2], y: [f64; 2]) -> Result<Self, GeometryError> {
        for (axis, [lo, hi]) in [("x", x), ("y", y)] {
            if !lo.is_finite() || !hi.is_finite() || hi <= lo {
                return Err(GeometryError::InvalidDomain(format!(
                    "{axis} range [{lo}, {hi}] must be finite with max > min"
                )));
            }
        }
        Ok(Self { x, y })
    }

    pub fn contains(&self, p: &Vector2<f64>) -> bool {
        p.x >= self.x[0] && p.x <= self.x[1] && p.y >= self.y[0] && p.y <= self.y[1]
    }

    pub fn outside(&self, p: &Vector2<f64>) -> bool {
        !self.contains(p)
    }

    pub fn width(&self) -> f64 {
        self.x[1] - self.x[0]
    }

    pub fn height(&self) -> f64 {
        self.y[1] - self.y[0]
    }

    /// The edge `y = y0`, traversed from `x0` to `x1` as `t` goes from 0 to 1.
    pub fn bottom_edge(&self) -> LineSegment {
        LineSegment::new(
            Vector2::new(self.x[0], self.y[0]),
            Vector2::new(self.x[1], self.y[0]),
        )
    }
}

/// A curve in the coordinate plane parametrized over `[0, 1]`.
pub trait PlaneCurve {
    fn point(&self, t: f64) -> Vector2<f64>;

    /// Derivative with respect to `t`. Defaults to a central difference.
    fn velocity(&self, t: f64) -> Vector2<f64> {
        const H: f64 = 1e-5;
        (self.point(t + H) - self.point(t - H)) / (2.0 * H)
    }

    fn tangent(&self, t: f64) -> TangentVector {
        TangentVector::new(self.point(t), self.velocity(t))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub start: Vector2<f64>,
    pub end: Vector2<f64>,
}

impl LineSegment {
    pub fn new(start: Vector2<f64>, end: Vector2<f64>) -> Self {
        Self { start, end }
    }
}

impl PlaneCurve for LineSegment {
    fn point(&self, t: f64) -> Vector2<f64> {
        self.start + (self.end - self.start) * t
    }

    fn velocity(&self, _t: f64) -> Vector2<f64> {
        self.end - self.start
    }
}

/// Wraps a closure `t -> (x, y)` as a curve.
pub struct ParametricCurve<F> {
    f: F,
}

impl<F: Fn(f64) -> Vector2<f64>> ParametricCurve<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F: Fn(f64) -> Vector2<f64>> PlaneCurve for ParametricCurve<F> {
    fn point(&self, t: f64) -> Vector2<f64> {
        (self.f)(t)
    }
}

/// A surface presented through a 2D coordinate patch.
///
/// Implementors supply the embedding and the geodesic acceleration in
/// coordinates; the drivers in [`crate::geodesic`] do the rest.
pub trait DiffGeometry: AccelerationField {
    /// Embedding of coordinates `(u, v)` into R³.
    fn parameterization(&self, u: f64, v: f64) -> Vector3<f64>;

    /// `true` once a coordinate position has left the patch.
    fn outside(&self, pos: &Vector2<f64>) -> bool;

    /// Unit normal of the embedded surface. Defaults to the normalized cross
    /// product of numerically differentiated coordinate tangents.
    fn surface_normal(&self, u: f64, v: f64) -> Vector3<f64> {
        const H: f64 = 1e-5;
        let du = self.parameterization(u + H, v) - self.parameterization(u - H, v);
        let dv = self.parameterization(u, v + H) - self.parameterization(u, v - H);
        du.cross(&dv).normalize()
    }
}

/// Embedded grid of a surface of revolution over `u ∈ [u0, u1]`, `θ ∈ [0, 2π]`:
/// `nu` points along the profile per ring, `ntheta` rings.
pub fn revolution_grid<G: DiffGeometry + ?Sized>(
    geometry: &G,
    [u0, u1]: [f64; 2],
    nu: usize,
    ntheta: usize,
) -> Vec<Vector3<f64>> {
    let (nu, ntheta) = (nu.max(2), ntheta.max(2));
    let mut points = Vec::with_capacity(nu * ntheta);
    for j in 0..ntheta {
        let theta = TAU * j as f64 / (ntheta - 1) as f64;
        for i in 0..nu {
            let u = u0 + (u1 - u0) * i as f64 / (nu - 1) as f64;
            points.push(geometry.parameterization(u, theta));
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_rejects_degenerate_ranges() {
        assert!(Domain::new([0.0, 1.0], [-1.0, 1.0]).is_ok());
        assert!(matches!(
            Domain::new([1.0, 1.0], [0.0, 1.0]),
            Err(GeometryError::InvalidDomain(_))
        ));
        assert!(Domain::new([0.0, f64::NAN], [0.0, 1.0]).is_err());
    }

    #[test]
    fn domain_boundary_counts_as_inside() {
        let domain = Domain::new([-1.0, 1.0], [-1.0, 1.0]).unwrap();
        assert!(domain.contains(&Vector2::new(1.0, -1.0)));
        assert!(domain.outside(&Vector2::new(1.0 + 1e-9, 0.0)));
    }

    #[test]
    fn bottom_edge_spans_the_domain() {
        let domain = Domain::new([-2.0, 2.0], [0.5, 3.0]).unwrap();
        let edge = domain.bottom_edge();
        assert_eq!(edge.point(0.0), Vector2::new(-2.0, 0.5));
        assert_eq!(edge.point(1.0), Vector2::new(2.0, 0.5));
        assert_eq!(edge.tangent(0.3).vel, Vector2::new(4.0, 0.0));
    }

    struct Cylinder;

    impl AccelerationField for Cylinder {
        fn acceleration(&self, _state: &TangentVector) -> Vector2<f64> {
            Vector2::zeros()
        }
    }

    impl DiffGeometry for Cylinder {
        fn parameterization(&self, u: f64, theta: f64) -> Vector3<f64> {
            Vector3::new(theta.cos(), theta.sin(), u)
        }

        fn outside(&self, _pos: &Vector2<f64>) -> bool {
            false
        }
    }

    #[test]
    fn revolution_grid_is_ring_major() {
        let grid = revolution_grid(&Cylinder, [0.0, 2.0], 3, 5);
        assert_eq!(grid.len(), 15);
        assert_eq!(grid[0], Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(grid[2].z, 2.0);
        // Third ring sits at θ = π.
        assert!((grid[7] - Vector3::new(-1.0, 0.0, 1.0)).norm() < 1e-12);
        assert!(revolution_grid(&Cylinder, [0.0, 1.0], 0, 0).len() == 4);
    }

    #[test]
    fn parametric_curve_velocity_is_numerical() {
        let circle = ParametricCurve::new(|t: f64| Vector2::new(t.cos(), t.sin()));
        let vel = circle.velocity(0.0);
        assert!(vel.x.abs() < 1e-8);
        assert!((vel.y - 1.0).abs() < 1e-8);
    }
}
