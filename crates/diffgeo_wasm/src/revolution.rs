//! WASM wrappers for the surface of revolution and the black-hole optical geometry.

use crate::shared::{
    build_parameters, flatten_points, flatten_vectors, js_error, range, serialize, settings_from_js,
    tangent_from,
};
use diffgeo_core::black_hole::BlackHoleGeometry;
use diffgeo_core::geodesic::{integrate_geodesic, spray};
use diffgeo_core::geometry::DiffGeometry;
use diffgeo_core::revolution::RevolutionGeometry;
use diffgeo_core::settings::{GeodesicSettings, SurfaceSettings};
use js_sys::Float64Array;
use nalgebra::Vector2;
use wasm_bindgen::prelude::*;

/// Geodesic fan from `(u, θ)` as one flattened polyline per geodesic.
fn spray_paths<G: DiffGeometry>(
    geometry: &G,
    settings: &GeodesicSettings,
    center: Vector2<f64>,
    angle: f64,
    spread: f64,
    count: usize,
) -> Vec<Vec<f64>> {
    spray(center, angle, spread, count)
        .iter()
        .map(|initial| flatten_points(&integrate_geodesic(geometry, initial, settings)))
        .collect()
}

#[wasm_bindgen]
pub struct WasmRevolutionSurface {
    geometry: RevolutionGeometry,
}

pub(crate) fn build_revolution(
    radius: &str,
    height: &str,
    u_range: &[f64],
    param_names: &[String],
    param_values: &[f64],
    settings: SurfaceSettings,
) -> anyhow::Result<RevolutionGeometry> {
    let domain = range(u_range, "u")?;
    let params = build_parameters(param_names, param_values)?;
    Ok(RevolutionGeometry::with_settings([radius, height], domain, params, settings)?)
}

#[wasm_bindgen]
impl WasmRevolutionSurface {
    #[wasm_bindgen(constructor)]
    pub fn new(
        radius: &str,
        height: &str,
        u_range: Vec<f64>,
        param_names: Vec<String>,
        param_values: Vec<f64>,
    ) -> Result<WasmRevolutionSurface, JsValue> {
        #[cfg(target_arch = "wasm32")]
        console_error_panic_hook::set_once();

        let geometry = build_revolution(
            radius,
            height,
            &u_range,
            &param_names,
            &param_values,
            SurfaceSettings::default(),
        )
        .map_err(js_error)?;
        Ok(WasmRevolutionSurface { geometry })
    }

    pub fn with_settings(
        radius: &str,
        height: &str,
        u_range: Vec<f64>,
        param_names: Vec<String>,
        param_values: Vec<f64>,
        settings: JsValue,
    ) -> Result<WasmRevolutionSurface, JsValue> {
        #[cfg(target_arch = "wasm32")]
        console_error_panic_hook::set_once();

        let settings = settings_from_js(settings)?;
        let geometry = build_revolution(radius, height, &u_range, &param_names, &param_values, settings)
            .map_err(js_error)?;
        Ok(WasmRevolutionSurface { geometry })
    }

    pub fn rebuild(&mut self, radius: &str, height: &str) -> Result<(), JsValue> {
        self.geometry.rebuild([radius, height]).map_err(js_error)
    }

    pub fn set_parameter(&self, name: &str, value: f64) -> bool {
        self.geometry.parameters().set(name, value)
    }

    pub fn parameterization(&self, u: f64, theta: f64) -> Vec<f64> {
        let p = self.geometry.parameterization(u, theta);
        vec![p.x, p.y, p.z]
    }

    pub fn gaussian_curvature(&self, u: f64) -> f64 {
        self.geometry.gaussian_curvature(u)
    }

    pub fn sample_grid(&self, nu: u32, ntheta: u32) -> Vec<f64> {
        flatten_points(&self.geometry.sample_grid(nu as usize, ntheta as usize))
    }

    /// GLSL profile functions `{ r, dr, ddr, h, dh, ddh }` of `u`.
    pub fn glsl(&self) -> Result<JsValue, JsValue> {
        serialize(&self.geometry.glsl(), "profile GLSL")
    }

    pub fn function_block(&self) -> String {
        self.geometry
            .glsl()
            .function_block(self.geometry.parameters().names().as_slice())
    }

    pub fn fallbacks(&self) -> Vec<String> {
        self.geometry
            .fallbacks()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Frame transported once around the `u = u0` circle, sampled at `samples`
    /// points as `[X.x, X.y, Y.x, Y.y, ...]`.
    pub fn boundary_frame(&self, samples: u32) -> Result<Float64Array, JsValue> {
        let flat = self.frame_samples(samples as usize).map_err(js_error)?;
        Ok(Float64Array::from(flat.as_slice()))
    }

    pub fn integrate_geodesic(&self, state: Vec<f64>) -> Result<Vec<f64>, JsValue> {
        let initial = tangent_from(&state).map_err(js_error)?;
        Ok(flatten_points(&self.geometry.integrate_geodesic(&initial)))
    }

    pub fn geodesic_spray(&self, u: f64, theta: f64, angle: f64, spread: f64, count: u32) -> Result<JsValue, JsValue> {
        let paths = spray_paths(
            &self.geometry,
            &self.geometry.settings().geodesic,
            Vector2::new(u, theta),
            angle,
            spread,
            count as usize,
        );
        serialize(&paths, "geodesic spray")
    }
}

impl WasmRevolutionSurface {
    pub(crate) fn frame_samples(&self, samples: usize) -> diffgeo_core::error::Result<Vec<f64>> {
        let frame = self
            .geometry
            .parallel_transport(&self.geometry.boundary_curve())?;
        let samples = samples.max(2);
        let basis: Vec<Vector2<f64>> = (0..samples)
            .flat_map(|i| frame.basis(i as f64 / (samples - 1) as f64))
            .collect();
        Ok(flatten_vectors(&basis))
    }
}

#[wasm_bindgen]
pub struct WasmBlackHole {
    geometry: BlackHoleGeometry,
}

#[wasm_bindgen]
impl WasmBlackHole {
    #[wasm_bindgen(constructor)]
    pub fn new(schwarzschild_radius: f64) -> Result<WasmBlackHole, JsValue> {
        #[cfg(target_arch = "wasm32")]
        console_error_panic_hook::set_once();

        let geometry = BlackHoleGeometry::new(schwarzschild_radius).map_err(js_error)?;
        Ok(WasmBlackHole { geometry })
    }

    pub fn rebuild(&mut self, schwarzschild_radius: f64) -> Result<(), JsValue> {
        self.geometry.rebuild(schwarzschild_radius).map_err(js_error)
    }

    pub fn domain(&self) -> Vec<f64> {
        self.geometry.domain().to_vec()
    }

    pub fn parameterization(&self, u: f64, theta: f64) -> Vec<f64> {
        let p = self.geometry.parameterization(u, theta);
        vec![p.x, p.y, p.z]
    }

    pub fn sample_grid(&self, nu: u32, ntheta: u32) -> Vec<f64> {
        flatten_points(&self.geometry.sample_grid(nu as usize, ntheta as usize))
    }

    pub fn integrate_geodesic(&self, state: Vec<f64>) -> Result<Vec<f64>, JsValue> {
        let initial = tangent_from(&state).map_err(js_error)?;
        Ok(flatten_points(&self.geometry.integrate_geodesic(&initial)))
    }

    pub fn geodesic_spray(&self, u: f64, theta: f64, angle: f64, spread: f64, count: u32) -> Result<JsValue, JsValue> {
        let paths = spray_paths(
            &self.geometry,
            &self.geometry.settings().geodesic,
            Vector2::new(u, theta),
            angle,
            spread,
            count as usize,
        );
        serialize(&paths, "geodesic spray")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(target_arch = "wasm32")]
    use wasm_bindgen_test::wasm_bindgen_test;

    #[test]
    fn revolution_surface_builds_and_samples() {
        let surface = WasmRevolutionSurface::new(
            "2 + b*sin(u)",
            "a*u + sin(u)",
            vec![-6.28, 6.28],
            vec!["a".to_string(), "b".to_string()],
            vec![1.0, 1.0],
        )
        .expect("surface should build");

        assert_eq!(surface.sample_grid(5, 4).len(), 60);
        let p = surface.parameterization(0.0, 0.0);
        assert!((p[0] - 2.0).abs() < 1e-12);
        assert!(surface.set_parameter("b", 0.0));
        assert!(surface.gaussian_curvature(1.0).abs() < 1e-12);
        assert!(surface.function_block().contains("float ddh(float u)"));
        assert!(surface.fallbacks().is_empty());
    }

    #[test]
    fn boundary_frame_starts_at_identity() {
        let surface = WasmRevolutionSurface::new("1 + u*u", "u", vec![0.5, 2.0], vec![], vec![])
            .expect("surface should build");
        let frame = surface.frame_samples(5).expect("frame");
        assert_eq!(frame.len(), 20);
        assert_eq!(&frame[..4], &[1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn build_revolution_rejects_mismatched_parameters() {
        let result = build_revolution("u", "u", &[0.0, 1.0], &["a".to_string()], &[], SurfaceSettings::default());
        assert!(result.is_err());
    }

    #[test]
    fn revolution_spray_runs_one_geodesic_per_direction() {
        let surface = WasmRevolutionSurface::new("1.5 + cos(u)", "sin(u)", vec![-3.0, 3.0], vec![], vec![])
            .expect("surface should build");
        let paths = spray_paths(
            &surface.geometry,
            &GeodesicSettings::default(),
            Vector2::new(0.0, 0.0),
            0.0,
            1.0,
            6,
        );
        assert_eq!(paths.len(), 6);
        assert!(paths.iter().all(|p| p.len() % 3 == 0 && p.len() >= 6));
    }

    #[test]
    fn black_hole_geodesic_and_grid() {
        let bh = WasmBlackHole::new(1.0).expect("black hole");
        assert_eq!(bh.domain(), vec![1.5, 30.0]);
        assert_eq!(bh.sample_grid(3, 3).len(), 27);
        let path = bh.integrate_geodesic(vec![10.0, 0.0, -1.0, 0.02]).expect("geodesic");
        assert_eq!(path.len() % 3, 0);
        assert!(path.len() > 3);
    }

    #[wasm_bindgen_test]
    #[cfg(target_arch = "wasm32")]
    fn black_hole_rejects_negative_radius() {
        assert!(WasmBlackHole::new(-1.0).is_err());
    }
}
