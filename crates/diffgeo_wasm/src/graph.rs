//! WASM wrapper around the graph surface engine.

use crate::shared::{
    build_parameters, flatten_points, js_error, range, serialize, settings_from_js, tangent_from,
    tangent_to_vec,
};
use diffgeo_core::geodesic::{spray, stripes};
use diffgeo_core::geometry::{DiffGeometry, Domain};
use diffgeo_core::graph_geometry::GraphGeometry;
use diffgeo_core::settings::SurfaceSettings;
use nalgebra::Vector2;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmGraphSurface {
    pub(crate) geometry: GraphGeometry,
}

fn domain_from(x_range: &[f64], y_range: &[f64]) -> anyhow::Result<Domain> {
    Ok(Domain::new(range(x_range, "x")?, range(y_range, "y")?)?)
}

pub(crate) fn build_graph(
    expression: &str,
    x_range: &[f64],
    y_range: &[f64],
    param_names: &[String],
    param_values: &[f64],
    settings: SurfaceSettings,
) -> anyhow::Result<GraphGeometry> {
    let domain = domain_from(x_range, y_range)?;
    let params = build_parameters(param_names, param_values)?;
    Ok(GraphGeometry::with_settings(expression, domain, params, settings)?)
}

#[wasm_bindgen]
impl WasmGraphSurface {
    #[wasm_bindgen(constructor)]
    pub fn new(
        expression: &str,
        x_range: Vec<f64>,
        y_range: Vec<f64>,
        param_names: Vec<String>,
        param_values: Vec<f64>,
    ) -> Result<WasmGraphSurface, JsValue> {
        #[cfg(target_arch = "wasm32")]
        console_error_panic_hook::set_once();

        let geometry = build_graph(
            expression,
            &x_range,
            &y_range,
            &param_names,
            &param_values,
            SurfaceSettings::default(),
        )
        .map_err(js_error)?;
        Ok(WasmGraphSurface { geometry })
    }

    /// Like the constructor, with settings given as a JS object
    /// (`{ geodesic: { step, max_steps }, transport: {...}, finite_difference: {...} }`).
    pub fn with_settings(
        expression: &str,
        x_range: Vec<f64>,
        y_range: Vec<f64>,
        param_names: Vec<String>,
        param_values: Vec<f64>,
        settings: JsValue,
    ) -> Result<WasmGraphSurface, JsValue> {
        #[cfg(target_arch = "wasm32")]
        console_error_panic_hook::set_once();

        let settings = settings_from_js(settings)?;
        let geometry = build_graph(
            expression,
            &x_range,
            &y_range,
            &param_names,
            &param_values,
            settings,
        )
        .map_err(js_error)?;
        Ok(WasmGraphSurface { geometry })
    }

    /// Swaps in a new expression; the old one stays active if this fails.
    pub fn rebuild(&mut self, expression: &str) -> Result<(), JsValue> {
        self.geometry.rebuild(expression).map_err(js_error)
    }

    pub fn expression(&self) -> String {
        self.geometry.expression().to_string()
    }

    pub fn set_parameter(&self, name: &str, value: f64) -> bool {
        self.geometry.set_parameter(name, value)
    }

    pub fn set_domain(&mut self, x_range: Vec<f64>, y_range: Vec<f64>) -> Result<(), JsValue> {
        let domain = domain_from(&x_range, &y_range).map_err(js_error)?;
        self.geometry.set_domain(domain);
        Ok(())
    }

    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        self.geometry.evaluate(x, y)
    }

    pub fn gaussian_curvature(&self, x: f64, y: f64) -> f64 {
        self.geometry.gaussian_curvature(x, y)
    }

    pub fn surface_normal(&self, x: f64, y: f64) -> Vec<f64> {
        let n = self.geometry.surface_normal(x, y);
        vec![n.x, n.y, n.z]
    }

    /// Flattened `[x, y, z, ...]` vertex positions, row by row in `y`.
    pub fn sample_grid(&self, nx: u32, ny: u32) -> Vec<f64> {
        flatten_points(&self.geometry.sample_grid(nx as usize, ny as usize))
    }

    /// GLSL expressions for f and its partials as `{ f, fx, fy, fxx, fxy, fyy }`.
    pub fn glsl(&self) -> Result<JsValue, JsValue> {
        serialize(self.geometry.glsl(), "GLSL bundle")
    }

    pub fn function_block(&self) -> String {
        self.geometry.function_block()
    }

    pub fn fallbacks(&self) -> Vec<String> {
        self.geometry
            .fallbacks()
            .into_iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Flattened polyline of the geodesic starting at `[x, y, vx, vy]`.
    pub fn integrate_geodesic(&self, state: Vec<f64>) -> Result<Vec<f64>, JsValue> {
        let initial = tangent_from(&state).map_err(js_error)?;
        Ok(flatten_points(&self.geometry.integrate_geodesic(&initial)))
    }

    /// One flattened polyline per geodesic of the spray.
    pub fn geodesic_spray(
        &self,
        x: f64,
        y: f64,
        angle: f64,
        spread: f64,
        count: u32,
    ) -> Result<JsValue, JsValue> {
        serialize(&self.spray_paths(x, y, angle, spread, count as usize), "geodesic spray")
    }

    /// One flattened polyline per geodesic anchored on the bottom edge.
    pub fn geodesic_stripes(
        &self,
        pos: f64,
        angle: f64,
        spread: f64,
        count: u32,
    ) -> Result<JsValue, JsValue> {
        let paths = self
            .stripe_paths(pos, angle, spread, count as usize)
            .map_err(js_error)?;
        serialize(&paths, "geodesic stripes")
    }

    /// Transported bottom-edge frame sampled at `samples` points:
    /// `[t, X.x, X.y, Y.x, Y.y, ...]`.
    pub fn boundary_frame(&self, samples: u32) -> Result<Vec<f64>, JsValue> {
        let boundary = self.geometry.boundary_transport().map_err(js_error)?;
        let samples = (samples as usize).max(2);
        let mut out = Vec::with_capacity(samples * 5);
        for i in 0..samples {
            let t = i as f64 / (samples - 1) as f64;
            let [bx, by] = boundary.frame().basis(t);
            out.extend_from_slice(&[t, bx.x, bx.y, by.x, by.y]);
        }
        Ok(out)
    }

    /// Initial state `[x, y, vx, vy]` for direction `v` transported to `t` on the bottom edge.
    pub fn boundary_transport(&self, t: f64, v: Vec<f64>) -> Result<Vec<f64>, JsValue> {
        let direction = match v.as_slice() {
            [vx, vy] => Vector2::new(*vx, *vy),
            _ => return Err(JsValue::from_str("Direction must have two components.")),
        };
        let boundary = self.geometry.boundary_transport().map_err(js_error)?;
        Ok(tangent_to_vec(&boundary.at(t, &direction)))
    }
}

impl WasmGraphSurface {
    pub(crate) fn spray_paths(&self, x: f64, y: f64, angle: f64, spread: f64, count: usize) -> Vec<Vec<f64>> {
        spray(Vector2::new(x, y), angle, spread, count)
            .iter()
            .map(|initial| flatten_points(&self.geometry.integrate_geodesic(initial)))
            .collect()
    }

    pub(crate) fn stripe_paths(
        &self,
        pos: f64,
        angle: f64,
        spread: f64,
        count: usize,
    ) -> anyhow::Result<Vec<Vec<f64>>> {
        let boundary = self.geometry.boundary_transport()?;
        Ok(stripes(&boundary, pos, angle, spread, count)
            .iter()
            .map(|initial| flatten_points(&self.geometry.integrate_geodesic(initial)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(target_arch = "wasm32")]
    use wasm_bindgen_test::wasm_bindgen_test;
    use diffgeo_core::geometry::PlaneCurve;

    fn saddle() -> WasmGraphSurface {
        WasmGraphSurface::new(
            "a * x * y",
            vec![-1.0, 1.0],
            vec![-1.0, 1.0],
            vec!["a".to_string()],
            vec![1.0],
        )
        .expect("surface should build")
    }

    #[test]
    fn build_graph_reports_unresolved_symbols() {
        let err = build_graph("x + q", &[0.0, 1.0], &[0.0, 1.0], &[], &[], SurfaceSettings::default())
            .unwrap_err();
        assert!(err.to_string().contains("\"q\""), "unexpected error: {err}");
    }

    #[test]
    fn build_graph_rejects_bad_ranges() {
        let result = build_graph("x", &[1.0, 0.0], &[0.0, 1.0], &[], &[], SurfaceSettings::default());
        assert!(result.is_err());
    }

    #[test]
    fn surface_evaluates_with_live_parameters() {
        let surface = saddle();
        assert_eq!(surface.evaluate(0.5, 0.5), 0.25);
        assert!(surface.set_parameter("a", 2.0));
        assert_eq!(surface.evaluate(0.5, 0.5), 0.5);
        assert!(surface.function_block().contains("uniform float a;"));
        assert!(surface.fallbacks().is_empty());
    }

    #[test]
    fn geodesic_output_is_flat_xyz() {
        let surface = saddle();
        let points = surface.integrate_geodesic(vec![0.0, 0.0, 0.3, 0.1]).expect("geodesic");
        assert_eq!(points.len() % 3, 0);
        assert!(points.len() >= 6);
        assert_eq!(&points[..3], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn sprays_and_stripes_produce_one_path_per_geodesic() {
        let surface = saddle();
        let spray = surface.spray_paths(0.0, 0.0, 0.0, 1.0, 5);
        assert_eq!(spray.len(), 5);
        assert!(spray.iter().all(|p| p.len() >= 6 && p.len() % 3 == 0));

        let stripes = surface.stripe_paths(0.5, 0.0, 0.2, 3).expect("stripes");
        assert_eq!(stripes.len(), 3);
        let anchor = surface.geometry.domain().bottom_edge().point(0.5 + 0.2 * (1.0 / 3.0 - 0.5));
        assert!((stripes[1][0] - anchor.x).abs() < 1e-12);
        assert!((stripes[1][1] - anchor.y).abs() < 1e-12);
    }

    #[test]
    fn boundary_frame_starts_at_identity() {
        let surface = saddle();
        let frame = surface.boundary_frame(11).expect("frame");
        assert_eq!(frame.len(), 55);
        assert_eq!(&frame[..5], &[0.0, 1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn grid_and_normal_shapes() {
        let surface = saddle();
        assert_eq!(surface.sample_grid(4, 3).len(), 36);
        let n = surface.surface_normal(0.0, 0.0);
        assert_eq!(n, vec![0.0, 0.0, 1.0]);
    }

    #[wasm_bindgen_test]
    #[cfg(target_arch = "wasm32")]
    fn rebuild_failure_keeps_expression() {
        let mut surface = saddle();
        assert!(surface.rebuild("x +").is_err());
        assert_eq!(surface.expression(), "a * x * y");
    }

    #[wasm_bindgen_test]
    #[cfg(target_arch = "wasm32")]
    fn rejects_malformed_tangent_vector() {
        let surface = saddle();
        assert!(surface.integrate_geodesic(vec![0.0, 0.0]).is_err());
    }
}
