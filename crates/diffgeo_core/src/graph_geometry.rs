use crate::equation_engine::{parse, Node, Parameters};
use crate::error::{ExprError, GeometryError, Result};
use crate::geodesic;
use crate::geometry::{DiffGeometry, Domain, LineSegment, PlaneCurve, TangentVector};
use crate::glsl::{function_block, GlslSnippet};
use crate::settings::SurfaceSettings;
use crate::surface_fn::{build_base, build_derivative, Stencil, SurfaceFn};
use crate::symbolic::differentiate;
use crate::traits::{AccelerationField, TransportField};
use crate::transport::{self, BoundaryTransport, TransportedFrame};
use log::debug;
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

const VARS: [&str; 2] = ["x", "y"];

/// The function and its partial derivatives up to second order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partial {
    F,
    Fx,
    Fy,
    Fxx,
    Fxy,
    Fyy,
}

impl Partial {
    pub const ALL: [Partial; 6] = [
        Partial::F,
        Partial::Fx,
        Partial::Fy,
        Partial::Fxx,
        Partial::Fxy,
        Partial::Fyy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Partial::F => "f",
            Partial::Fx => "fx",
            Partial::Fy => "fy",
            Partial::Fxx => "fxx",
            Partial::Fxy => "fxy",
            Partial::Fyy => "fyy",
        }
    }
}

/// GLSL expressions for f and its derivatives, in terms of `x`, `y` and
/// uniform parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlslBundle {
    pub f: String,
    pub fx: String,
    pub fy: String,
    pub fxx: String,
    pub fxy: String,
    pub fyy: String,
}

impl GlslBundle {
    pub fn get(&self, which: Partial) -> &str {
        match which {
            Partial::F => &self.f,
            Partial::Fx => &self.fx,
            Partial::Fy => &self.fy,
            Partial::Fxx => &self.fxx,
            Partial::Fxy => &self.fxy,
            Partial::Fyy => &self.fyy,
        }
    }

    pub fn snippets(&self) -> Vec<GlslSnippet> {
        Partial::ALL
            .iter()
            .map(|&p| GlslSnippet::new(p.name(), self.get(p)))
            .collect()
    }

    /// Uniform declarations plus `float f(float x, float y)` and friends.
    pub fn function_block<P: AsRef<str>>(&self, params: &[P]) -> String {
        function_block(&self.snippets(), &VARS, params)
    }
}

/// Everything produced by one build of the surface expression.
#[derive(Debug)]
struct SurfaceArtifacts {
    source: String,
    node: Node,
    native: [SurfaceFn; 6],
    glsl: GlslBundle,
}

impl SurfaceArtifacts {
    fn build(source: &str, params: &Parameters, settings: &SurfaceSettings) -> Result<Self, ExprError> {
        let node_f = parse(source)?;
        let (f, glsl_f) = build_base(&node_f, &VARS, params)?;

        let node_fx = differentiate(&node_f, "x");
        let node_fy = differentiate(&node_f, "y");
        let second = |first: &Result<Node, ExprError>, var: &str| {
            first
                .as_ref()
                .map_err(Clone::clone)
                .and_then(|node| differentiate(node, var))
        };
        let node_fxx = second(&node_fx, "x");
        let node_fxy = second(&node_fx, "y");
        let node_fyy = second(&node_fy, "y");

        let fd = &settings.finite_difference;
        let build = |which: Partial, stencil: Stencil, node: &Result<Node, ExprError>| {
            build_derivative(which.name(), node.as_ref(), (&node_f, &f), &VARS, params, stencil, fd)
        };
        let fx = build(Partial::Fx, Stencil::First(0), &node_fx)?;
        let fy = build(Partial::Fy, Stencil::First(1), &node_fy)?;
        let fxx = build(Partial::Fxx, Stencil::Second(0), &node_fxx)?;
        let fxy = build(Partial::Fxy, Stencil::Mixed(0, 1), &node_fxy)?;
        let fyy = build(Partial::Fyy, Stencil::Second(1), &node_fyy)?;

        let glsl = GlslBundle {
            f: glsl_f,
            fx: fx.glsl,
            fy: fy.glsl,
            fxx: fxx.glsl,
            fxy: fxy.glsl,
            fyy: fyy.glsl,
        };
        Ok(Self {
            source: source.to_string(),
            node: node_f,
            native: [
                SurfaceFn::Compiled(f),
                fx.native,
                fy.native,
                fxx.native,
                fxy.native,
                fyy.native,
            ],
            glsl,
        })
    }

    #[inline]
    fn eval(&self, which: Partial, x: f64, y: f64) -> f64 {
        self.native[which as usize].call(&[x, y])
    }
}

/// First and second partials at one point.
#[derive(Debug, Clone, Copy)]
struct Jet {
    fx: f64,
    fy: f64,
    fxx: f64,
    fxy: f64,
    fyy: f64,
}

impl Jet {
    fn metric_factor(&self) -> f64 {
        1.0 + self.fx * self.fx + self.fy * self.fy
    }
}

/// The graph surface `z = f(x, y)` of a user expression over a rectangular
/// domain, with its induced metric.
///
/// Builds native evaluators and GLSL strings for f and its partials up to
/// second order, and derives Gaussian curvature, the geodesic acceleration
/// and the parallel-transport field from them. Parameter values are read
/// live from the shared [`Parameters`] store on every evaluation.
#[derive(Debug)]
pub struct GraphGeometry {
    artifacts: SurfaceArtifacts,
    domain: Domain,
    params: Parameters,
    settings: SurfaceSettings,
}

impl GraphGeometry {
    pub fn new(source: &str, domain: Domain, params: Parameters) -> Result<Self> {
        Self::with_settings(source, domain, params, SurfaceSettings::default())
    }

    pub fn with_settings(
        source: &str,
        domain: Domain,
        params: Parameters,
        settings: SurfaceSettings,
    ) -> Result<Self> {
        settings
            .validate()
            .map_err(|err| GeometryError::Settings(err.to_string()))?;
        let artifacts = SurfaceArtifacts::build(source, &params, &settings)?;
        debug!("built graph surface z = {source}");
        Ok(Self {
            artifacts,
            domain,
            params,
            settings,
        })
    }

    /// Replaces the surface expression. On failure the previous expression
    /// and all of its artifacts stay in place.
    pub fn rebuild(&mut self, source: &str) -> Result<()> {
        let artifacts = SurfaceArtifacts::build(source, &self.params, &self.settings)?;
        debug!("rebuilt graph surface z = {source}");
        self.artifacts = artifacts;
        Ok(())
    }

    /// Replaces the settings and rebuilds the current expression with them.
    pub fn set_settings(&mut self, settings: SurfaceSettings) -> Result<()> {
        settings
            .validate()
            .map_err(|err| GeometryError::Settings(err.to_string()))?;
        let artifacts = SurfaceArtifacts::build(&self.artifacts.source, &self.params, &settings)?;
        self.artifacts = artifacts;
        self.settings = settings;
        Ok(())
    }

    pub fn expression(&self) -> &str {
        &self.artifacts.source
    }

    pub fn node(&self) -> &Node {
        &self.artifacts.node
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn set_domain(&mut self, domain: Domain) {
        self.domain = domain;
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// Updates a parameter value; every evaluator observes it immediately.
    pub fn set_parameter(&self, name: &str, value: f64) -> bool {
        self.params.set(name, value)
    }

    pub fn settings(&self) -> &SurfaceSettings {
        &self.settings
    }

    pub fn glsl(&self) -> &GlslBundle {
        &self.artifacts.glsl
    }

    pub fn function_block(&self) -> String {
        self.artifacts.glsl.function_block(self.params.names().as_slice())
    }

    /// Derivatives that are approximated by finite differences.
    pub fn fallbacks(&self) -> Vec<Partial> {
        Partial::ALL
            .into_iter()
            .filter(|&p| self.artifacts.native[p as usize].is_fallback())
            .collect()
    }

    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        self.artifacts.eval(Partial::F, x, y)
    }

    pub fn derivative(&self, x: f64, y: f64, which: Partial) -> f64 {
        self.artifacts.eval(which, x, y)
    }

    fn jet(&self, x: f64, y: f64) -> Jet {
        let a = &self.artifacts;
        Jet {
            fx: a.eval(Partial::Fx, x, y),
            fy: a.eval(Partial::Fy, x, y),
            fxx: a.eval(Partial::Fxx, x, y),
            fxy: a.eval(Partial::Fxy, x, y),
            fyy: a.eval(Partial::Fyy, x, y),
        }
    }

    pub fn gaussian_curvature(&self, x: f64, y: f64) -> f64 {
        let j = self.jet(x, y);
        let d = j.metric_factor();
        (j.fxx * j.fyy - j.fxy * j.fxy) / (d * d)
    }

    /// Sample positions over a regular `nx` by `ny` grid of the domain, row by row in `y`.
    pub fn sample_grid(&self, nx: usize, ny: usize) -> Vec<Vector3<f64>> {
        let (nx, ny) = (nx.max(2), ny.max(2));
        let d = &self.domain;
        let mut points = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            let y = d.y[0] + d.height() * j as f64 / (ny - 1) as f64;
            for i in 0..nx {
                let x = d.x[0] + d.width() * i as f64 / (nx - 1) as f64;
                points.push(self.parameterization(x, y));
            }
        }
        points
    }

    pub fn integrate_geodesic(&self, initial: &TangentVector) -> Vec<Vector3<f64>> {
        geodesic::integrate_geodesic(self, initial, &self.settings.geodesic)
    }

    pub fn parallel_transport<C: PlaneCurve>(&self, curve: &C) -> Result<TransportedFrame> {
        transport::parallel_transport(self, curve, &self.settings.transport)
    }

    /// Transport along the bottom edge of the domain.
    pub fn boundary_transport(&self) -> Result<BoundaryTransport<LineSegment>> {
        BoundaryTransport::new(self, self.domain.bottom_edge(), &self.settings.transport)
    }
}

impl AccelerationField for GraphGeometry {
    fn acceleration(&self, state: &TangentVector) -> Vector2<f64> {
        let j = self.jet(state.pos.x, state.pos.y);
        let (xp, yp) = (state.vel.x, state.vel.y);
        let num = j.fxx * xp * xp + 2.0 * j.fxy * xp * yp + j.fyy * yp * yp;
        Vector2::new(j.fx, j.fy) * (-num / j.metric_factor())
    }
}

impl TransportField for GraphGeometry {
    fn transport_derivative(&self, state: &TangentVector, v: &Vector2<f64>) -> Vector2<f64> {
        let j = self.jet(state.pos.x, state.pos.y);
        // Γ^k_ij = f_k f_ij / (1 + |∇f|²), so V'^k = -f_k Hess(f)(ẋ, V) / D.
        let hess = j.fxx * state.vel.x * v.x
            + j.fxy * (state.vel.x * v.y + state.vel.y * v.x)
            + j.fyy * state.vel.y * v.y;
        Vector2::new(j.fx, j.fy) * (-hess / j.metric_factor())
    }
}

impl DiffGeometry for GraphGeometry {
    fn parameterization(&self, x: f64, y: f64) -> Vector3<f64> {
        Vector3::new(x, y, self.evaluate(x, y))
    }

    fn outside(&self, pos: &Vector2<f64>) -> bool {
        self.domain.outside(pos)
    }

    fn surface_normal(&self, x: f64, y: f64) -> Vector3<f64> {
        let fx = self.artifacts.eval(Partial::Fx, x, y);
        let fy = self.artifacts.eval(Partial::Fy, x, y);
        Vector3::new(-fx, -fy, 1.0).normalize()
    }
}
