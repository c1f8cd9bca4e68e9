use crate::error::{GeometryError, Result};
use crate::geodesic;
use crate::geometry::{revolution_grid, DiffGeometry, PlaneCurve, TangentVector};
use crate::interpolation::CatmullRom;
use crate::settings::SurfaceSettings;
use crate::solvers::RK4;
use crate::traits::{AccelerationField, DynamicalSystem, Steppable, TransportField};
use crate::transport::{self, TransportedFrame};
use log::debug;
use nalgebra::{Vector2, Vector3};

const PROFILE_SAMPLES: usize = 500;

/// Slope of the embedding height, `dh/du = sqrt(uR(8u - 9R) / (4(u - R)³))`.
struct HeightSlope {
    schwarzschild_radius: f64,
}

impl DynamicalSystem for HeightSlope {
    fn dimension(&self) -> usize {
        1
    }

    fn apply(&self, u: f64, _h: &[f64], out: &mut [f64]) {
        let r = self.schwarzschild_radius;
        out[0] = (u * r * (8.0 * u - 9.0 * r) / (4.0 * (u - r).powi(3))).sqrt();
    }
}

/// Embedding of the equatorial optical geometry of a Schwarzschild black
/// hole as a surface of revolution, in coordinates `(u, θ)`.
///
/// `u` runs from the photon sphere `3R/2` out to `30R`. Geodesics of this
/// surface are the spatial paths of light rays.
#[derive(Debug, Clone)]
pub struct BlackHoleGeometry {
    schwarzschild_radius: f64,
    domain: [f64; 2],
    height: CatmullRom<f64>,
    settings: SurfaceSettings,
}

impl BlackHoleGeometry {
    pub fn new(schwarzschild_radius: f64) -> Result<Self> {
        Self::with_settings(schwarzschild_radius, SurfaceSettings::default())
    }

    pub fn with_settings(schwarzschild_radius: f64, settings: SurfaceSettings) -> Result<Self> {
        settings
            .validate()
            .map_err(|err| GeometryError::Settings(err.to_string()))?;
        let (domain, height) = build_profile(schwarzschild_radius)?;
        Ok(Self {
            schwarzschild_radius,
            domain,
            height,
            settings,
        })
    }

    /// Recomputes the domain and height profile for a new radius. A rejected
    /// radius leaves the current geometry unchanged.
    pub fn rebuild(&mut self, schwarzschild_radius: f64) -> Result<()> {
        let (domain, height) = build_profile(schwarzschild_radius)?;
        self.schwarzschild_radius = schwarzschild_radius;
        self.domain = domain;
        self.height = height;
        Ok(())
    }

    pub fn schwarzschild_radius(&self) -> f64 {
        self.schwarzschild_radius
    }

    pub fn settings(&self) -> &SurfaceSettings {
        &self.settings
    }

    pub fn domain(&self) -> [f64; 2] {
        self.domain
    }

    pub fn radius(&self, u: f64) -> f64 {
        let r = self.schwarzschild_radius;
        (u * u * u / (u - r)).sqrt()
    }

    pub fn height(&self, u: f64) -> f64 {
        self.height.eval(u)
    }

    /// Optical metric coefficients `(E, G)` in `ds² = E du² + G dθ²`.
    pub fn metric(&self, u: f64) -> (f64, f64) {
        let r = self.schwarzschild_radius;
        let e = u * u / ((u - r) * (u - r));
        (e, u * u * u / (u - r))
    }

    /// Grid of embedded points over the whole domain, `nu` along `u` and `ntheta` around.
    pub fn sample_grid(&self, nu: usize, ntheta: usize) -> Vec<Vector3<f64>> {
        revolution_grid(self, self.domain, nu, ntheta)
    }

    pub fn integrate_geodesic(&self, initial: &TangentVector) -> Vec<Vector3<f64>> {
        geodesic::integrate_geodesic(self, initial, &self.settings.geodesic)
    }

    pub fn parallel_transport<C: PlaneCurve>(&self, curve: &C) -> Result<TransportedFrame> {
        transport::parallel_transport(self, curve, &self.settings.transport)
    }
}

fn build_profile(schwarzschild_radius: f64) -> Result<([f64; 2], CatmullRom<f64>)> {
    if !(schwarzschild_radius.is_finite() && schwarzschild_radius > 0.0) {
        return Err(GeometryError::InvalidDomain(format!(
            "Schwarzschild radius must be positive and finite, got {schwarzschild_radius}"
        )));
    }
    let domain = [1.5 * schwarzschild_radius, 30.0 * schwarzschild_radius];
    let slope = HeightSlope {
        schwarzschild_radius,
    };

    let du = (domain[1] - domain[0]) / PROFILE_SAMPLES as f64;
    let mut solver = RK4::new(slope.dimension());
    let mut u = domain[0];
    let mut h = [0.0];
    let mut knots = Vec::with_capacity(PROFILE_SAMPLES + 1);
    let mut samples = Vec::with_capacity(PROFILE_SAMPLES + 1);
    knots.push(u);
    samples.push(h[0]);
    for i in 1..=PROFILE_SAMPLES {
        solver.step(&slope, &mut u, &mut h, du);
        knots.push(domain[0] + du * i as f64);
        samples.push(h[0]);
    }
    debug!(
        "integrated optical height profile for R = {schwarzschild_radius}: h({}) = {}",
        domain[1], h[0]
    );
    Ok((domain, CatmullRom::new(knots, samples, 0.0)?))
}

impl AccelerationField for BlackHoleGeometry {
    fn acceleration(&self, state: &TangentVector) -> Vector2<f64> {
        let r = self.schwarzschild_radius;
        let u = state.pos.x;
        let (up, tp) = (state.vel.x, state.vel.y);
        let denom = u * (r - u);
        Vector2::new(
            0.5 * (2.0 * u - 3.0 * r) * tp * tp - r * up * up / denom,
            (2.0 * u - 3.0 * r) * up * tp / denom,
        )
    }
}

impl TransportField for BlackHoleGeometry {
    fn transport_derivative(&self, state: &TangentVector, v: &Vector2<f64>) -> Vector2<f64> {
        let r = self.schwarzschild_radius;
        let u = state.pos.x;
        let (up, tp) = (state.vel.x, state.vel.y);
        let g_uuu = r / (u * (r - u));
        let g_utt = -0.5 * (2.0 * u - 3.0 * r);
        let g_tut = (2.0 * u - 3.0 * r) / (2.0 * u * (u - r));
        Vector2::new(
            -(g_uuu * up * v.x + g_utt * tp * v.y),
            -g_tut * (up * v.y + tp * v.x),
        )
    }
}

impl DiffGeometry for BlackHoleGeometry {
    fn parameterization(&self, u: f64, theta: f64) -> Vector3<f64> {
        let r = self.radius(u);
        Vector3::new(r * theta.cos(), r * theta.sin(), self.height(u))
    }

    fn outside(&self, pos: &Vector2<f64>) -> bool {
        !(pos.x >= self.domain[0] && pos.x <= self.domain[1])
    }
}
