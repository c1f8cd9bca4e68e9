//! Surfaces of revolution built from a profile curve `(r(u), h(u))`.
//!
//! Coordinates are `(u, θ)`: `u` runs along the profile and `θ` around the
//! axis. The profile expressions go through the same parse, differentiate and
//! compile pipeline as graph surfaces, with a single variable `u`.

use crate::equation_engine::{parse, Node, Parameters};
use crate::error::{ExprError, GeometryError, Result};
use crate::geodesic;
use crate::geometry::{revolution_grid, DiffGeometry, ParametricCurve, PlaneCurve, TangentVector};
use crate::glsl::{function_block, GlslSnippet};
use crate::settings::SurfaceSettings;
use crate::surface_fn::{build_base, build_derivative, Stencil, SurfaceFn};
use crate::symbolic::differentiate;
use crate::traits::{AccelerationField, TransportField};
use crate::transport::{self, TransportedFrame};
use log::debug;
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

const VARS: [&str; 1] = ["u"];

/// One compiled profile function with its first two derivatives.
#[derive(Debug)]
struct Profile {
    source: String,
    native: [SurfaceFn; 3],
    glsl: [String; 3],
}

impl Profile {
    fn build(name: &str, source: &str, params: &Parameters, settings: &SurfaceSettings) -> Result<Self, ExprError> {
        let node = parse(source)?;
        let (value, glsl) = build_base(&node, &VARS, params)?;

        let first = differentiate(&node, "u");
        let second: Result<Node, ExprError> = first
            .as_ref()
            .map_err(Clone::clone)
            .and_then(|d| differentiate(d, "u"));

        let fd = &settings.finite_difference;
        let base = (&node, &value);
        let d1 = build_derivative(&format!("{name}'"), first.as_ref(), base, &VARS, params, Stencil::First(0), fd)?;
        let d2 = build_derivative(&format!("{name}''"), second.as_ref(), base, &VARS, params, Stencil::Second(0), fd)?;

        Ok(Self {
            source: source.to_string(),
            native: [SurfaceFn::Compiled(value), d1.native, d2.native],
            glsl: [glsl, d1.glsl, d2.glsl],
        })
    }

    #[inline]
    fn eval(&self, order: usize, u: f64) -> f64 {
        self.native[order].call(&[u])
    }
}

/// GLSL expressions for the profile and its derivatives, as functions of `u`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileGlsl {
    pub r: String,
    pub dr: String,
    pub ddr: String,
    pub h: String,
    pub dh: String,
    pub ddh: String,
}

impl ProfileGlsl {
    pub fn snippets(&self) -> Vec<GlslSnippet> {
        [
            ("r", &self.r),
            ("dr", &self.dr),
            ("ddr", &self.ddr),
            ("h", &self.h),
            ("dh", &self.dh),
            ("ddh", &self.ddh),
        ]
        .into_iter()
        .map(|(name, body)| GlslSnippet::new(name, body.as_str()))
        .collect()
    }

    pub fn function_block<P: AsRef<str>>(&self, params: &[P]) -> String {
        function_block(&self.snippets(), &VARS, params)
    }
}

/// Profile values and derivatives at one `u`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileJet {
    pub r: f64,
    pub dr: f64,
    pub ddr: f64,
    pub h: f64,
    pub dh: f64,
    pub ddh: f64,
}

impl ProfileJet {
    /// `E = r'² + h'²`, the metric coefficient along the profile.
    pub fn profile_speed_sq(&self) -> f64 {
        self.dr * self.dr + self.dh * self.dh
    }
}

#[derive(Debug)]
pub struct RevolutionGeometry {
    radius: Profile,
    height: Profile,
    domain: [f64; 2],
    params: Parameters,
    settings: SurfaceSettings,
}

impl RevolutionGeometry {
    pub fn new(profile: [&str; 2], domain: [f64; 2], params: Parameters) -> Result<Self> {
        Self::with_settings(profile, domain, params, SurfaceSettings::default())
    }

    pub fn with_settings(
        profile: [&str; 2],
        domain: [f64; 2],
        params: Parameters,
        settings: SurfaceSettings,
    ) -> Result<Self> {
        settings
            .validate()
            .map_err(|err| GeometryError::Settings(err.to_string()))?;
        check_domain(domain)?;
        let (radius, height) = build_profiles(profile, &params, &settings)?;
        debug!("built surface of revolution r = {}, h = {}", profile[0], profile[1]);
        Ok(Self {
            radius,
            height,
            domain,
            params,
            settings,
        })
    }

    /// Replaces both profile expressions, or neither.
    pub fn rebuild(&mut self, profile: [&str; 2]) -> Result<()> {
        let (radius, height) = build_profiles(profile, &self.params, &self.settings)?;
        self.radius = radius;
        self.height = height;
        Ok(())
    }

    pub fn expressions(&self) -> [&str; 2] {
        [self.radius.source.as_str(), self.height.source.as_str()]
    }

    pub fn domain(&self) -> [f64; 2] {
        self.domain
    }

    pub fn set_domain(&mut self, domain: [f64; 2]) -> Result<()> {
        check_domain(domain)?;
        self.domain = domain;
        Ok(())
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn settings(&self) -> &SurfaceSettings {
        &self.settings
    }

    pub fn glsl(&self) -> ProfileGlsl {
        let [r, dr, ddr] = self.radius.glsl.clone();
        let [h, dh, ddh] = self.height.glsl.clone();
        ProfileGlsl { r, dr, ddr, h, dh, ddh }
    }

    /// Names of the profile derivatives approximated by finite differences.
    pub fn fallbacks(&self) -> Vec<&'static str> {
        let names = [("dr", "ddr"), ("dh", "ddh")];
        let mut out = Vec::new();
        for (profile, (first, second)) in [&self.radius, &self.height].into_iter().zip(names) {
            if profile.native[1].is_fallback() {
                out.push(first);
            }
            if profile.native[2].is_fallback() {
                out.push(second);
            }
        }
        out
    }

    pub fn jet(&self, u: f64) -> ProfileJet {
        ProfileJet {
            r: self.radius.eval(0, u),
            dr: self.radius.eval(1, u),
            ddr: self.radius.eval(2, u),
            h: self.height.eval(0, u),
            dh: self.height.eval(1, u),
            ddh: self.height.eval(2, u),
        }
    }

    pub fn gaussian_curvature(&self, u: f64) -> f64 {
        let j = self.jet(u);
        let e = j.profile_speed_sq();
        j.dh * (j.dr * j.ddh - j.ddr * j.dh) / (j.r * e * e)
    }

    /// Grid of embedded points, `nu` along the profile and `ntheta` around the axis.
    pub fn sample_grid(&self, nu: usize, ntheta: usize) -> Vec<Vector3<f64>> {
        revolution_grid(self, self.domain, nu, ntheta)
    }

    /// The circle `u = u0`, once around the axis.
    pub fn boundary_curve(&self) -> impl PlaneCurve {
        let u0 = self.domain[0];
        ParametricCurve::new(move |t: f64| Vector2::new(u0, TAU * t))
    }

    pub fn integrate_geodesic(&self, initial: &TangentVector) -> Vec<Vector3<f64>> {
        geodesic::integrate_geodesic(self, initial, &self.settings.geodesic)
    }

    pub fn parallel_transport<C: PlaneCurve>(&self, curve: &C) -> Result<TransportedFrame> {
        transport::parallel_transport(self, curve, &self.settings.transport)
    }
}

fn check_domain([u0, u1]: [f64; 2]) -> Result<()> {
    if !u0.is_finite() || !u1.is_finite() || u1 <= u0 {
        return Err(GeometryError::InvalidDomain(format!(
            "profile range [{u0}, {u1}] must be finite with max > min"
        )));
    }
    Ok(())
}

fn build_profiles(
    [r, h]: [&str; 2],
    params: &Parameters,
    settings: &SurfaceSettings,
) -> Result<(Profile, Profile)> {
    let radius = Profile::build("r", r, params, settings)?;
    let height = Profile::build("h", h, params, settings)?;
    Ok((radius, height))
}

impl AccelerationField for RevolutionGeometry {
    fn acceleration(&self, state: &TangentVector) -> Vector2<f64> {
        let j = self.jet(state.pos.x);
        let (up, tp) = (state.vel.x, state.vel.y);
        let e = j.profile_speed_sq();
        let u_acc = (-(j.dr * j.ddr + j.dh * j.ddh) * up * up + j.r * j.dr * tp * tp) / e;
        let theta_acc = -2.0 * j.dr / j.r * up * tp;
        Vector2::new(u_acc, theta_acc)
    }
}

impl TransportField for RevolutionGeometry {
    fn transport_derivative(&self, state: &TangentVector, v: &Vector2<f64>) -> Vector2<f64> {
        let j = self.jet(state.pos.x);
        let (up, tp) = (state.vel.x, state.vel.y);
        let e = j.profile_speed_sq();
        let g_uuu = (j.dr * j.ddr + j.dh * j.ddh) / e;
        let g_utt = -j.r * j.dr / e;
        let g_tut = j.dr / j.r;
        Vector2::new(
            -(g_uuu * up * v.x + g_utt * tp * v.y),
            -g_tut * (up * v.y + tp * v.x),
        )
    }
}

impl DiffGeometry for RevolutionGeometry {
    fn parameterization(&self, u: f64, theta: f64) -> Vector3<f64> {
        let r = self.radius.eval(0, u);
        Vector3::new(r * theta.cos(), r * theta.sin(), self.height.eval(0, u))
    }

    fn outside(&self, pos: &Vector2<f64>) -> bool {
        !(pos.x >= self.domain[0] && pos.x <= self.domain[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn sphere() -> RevolutionGeometry {
        RevolutionGeometry::new(["sin(u)", "-cos(u)"], [0.1, PI - 0.1], Parameters::new()).unwrap()
    }

    #[test]
    fn unit_sphere_has_unit_curvature() {
        let s = sphere();
        for u in [0.3, 1.0, FRAC_PI_2, 2.5] {
            assert!((s.gaussian_curvature(u) - 1.0).abs() < 1e-12, "u = {u}");
        }
        let p = s.parameterization(FRAC_PI_2, 0.0);
        assert!((p - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
        let n = s.surface_normal(FRAC_PI_2, 0.0);
        assert!((n.cross(&p)).norm() < 1e-6);
    }

    #[test]
    fn equator_is_a_geodesic() {
        let s = sphere();
        let state = TangentVector::from_components(FRAC_PI_2, 0.0, 0.0, 1.0);
        let a = s.acceleration(&state);
        assert!(a.norm() < 1e-12);
        let points = s.integrate_geodesic(&state);
        assert_eq!(points.len(), 301);
        assert!(points.iter().all(|p| p.z.abs() < 1e-9 && (p.xy().norm() - 1.0).abs() < 1e-9));
    }

    #[test]
    fn clairaut_relation_holds_along_geodesics() {
        let s = RevolutionGeometry::new(
            ["2 + b*sin(u)", "a*u + sin(u)"],
            [-6.28, 6.28],
            Parameters::from_pairs([("a", 1.0), ("b", 1.0)]),
        )
        .unwrap();
        let stepper = crate::solvers::Symplectic2::new(0.01);
        let mut state = TangentVector::from_components(0.0, 0.0, 0.3, 0.2);
        let clairaut = |s: &RevolutionGeometry, st: &TangentVector| s.jet(st.pos.x).r.powi(2) * st.vel.y;
        let initial = clairaut(&s, &state);
        for _ in 0..500 {
            state = stepper.step(&s, &state);
        }
        assert!((clairaut(&s, &state) - initial).abs() < 5e-3 * initial.abs());
    }

    #[test]
    fn cylinder_transport_is_trivial() {
        let cylinder = RevolutionGeometry::new(["1", "u"], [-1.0, 1.0], Parameters::new()).unwrap();
        let frame = cylinder.parallel_transport(&cylinder.boundary_curve()).unwrap();
        let [bx, by] = frame.basis(0.7);
        assert!((bx - Vector2::new(1.0, 0.0)).norm() < 1e-12);
        assert!((by - Vector2::new(0.0, 1.0)).norm() < 1e-12);
        assert_eq!(cylinder.gaussian_curvature(0.0), 0.0);
    }

    #[test]
    fn latitude_transport_preserves_length() {
        let s = sphere();
        let curve = ParametricCurve::new(|t: f64| Vector2::new(1.0, TAU * t));
        let frame = s.parallel_transport(&curve).unwrap();
        let norm = |v: Vector2<f64>| {
            let j = s.jet(1.0);
            j.profile_speed_sq() * v.x * v.x + j.r * j.r * v.y * v.y
        };
        let [bx, by] = frame.basis(1.0);
        assert!((norm(bx) - 1.0).abs() < 1e-6);
        assert!((norm(by) - 1.0f64.sin().powi(2)).abs() < 1e-6);
        // Holonomy around a latitude circle rotates the frame.
        assert!((bx - Vector2::new(1.0, 0.0)).norm() > 1e-2);
    }

    #[test]
    fn parameters_are_live_and_rebuild_is_atomic() {
        let params = Parameters::from_pairs([("a", 1.0), ("b", 1.0)]);
        let mut s = RevolutionGeometry::new(["2 + b*sin(u)", "a*u"], [-3.0, 3.0], params.clone()).unwrap();
        let u = 0.5f64;
        assert!((s.jet(u).r - (2.0 + u.sin())).abs() < 1e-15);
        params.set("b", 0.0);
        assert_eq!(s.jet(u).r, 2.0);
        assert_eq!(s.jet(u).dr, 0.0);

        assert!(s.rebuild(["1 + u", "c * u"]).is_err());
        assert_eq!(s.expressions(), ["2 + b*sin(u)", "a*u"]);
        s.rebuild(["1 + u", "2 * u"]).unwrap();
        assert_eq!(s.jet(1.0).r, 2.0);
        assert_eq!(s.glsl().dh, "2.0");
    }

    #[test]
    fn profile_fallback_and_outside() {
        let s = RevolutionGeometry::new(["2 + abs(u)", "max(u, 0)"], [-1.0, 1.0], Parameters::new()).unwrap();
        assert_eq!(s.fallbacks(), vec!["dh", "ddh"]);
        assert!((s.jet(0.5).dh - 1.0).abs() < 1e-8);
        assert!(s.outside(&Vector2::new(1.5, 0.0)));
        assert!(!s.outside(&Vector2::new(0.0, 100.0)));
        assert!(s.outside(&Vector2::new(f64::NAN, 0.0)));
        assert!(s.glsl().function_block(&[] as &[&str]).contains("float dh(float u)"));
    }

    #[test]
    fn invalid_domain_is_rejected() {
        let err = RevolutionGeometry::new(["1", "u"], [1.0, 0.0], Parameters::new()).unwrap_err();
        assert!(matches!(err, GeometryError::InvalidDomain(_)));
    }
}
