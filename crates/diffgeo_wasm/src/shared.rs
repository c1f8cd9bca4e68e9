//! Conversions between flat JS arrays and core geometry types.

use anyhow::{anyhow, bail, Result};
use diffgeo_core::equation_engine::Parameters;
use diffgeo_core::geometry::TangentVector;
use diffgeo_core::settings::SurfaceSettings;
use nalgebra::{Vector2, Vector3};
use serde::Serialize;
use wasm_bindgen::prelude::*;

pub(crate) fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

pub(crate) fn serialize<T: Serialize>(value: &T, what: &str) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value)
        .map_err(|err| JsValue::from_str(&format!("Failed to serialize {what}: {err}")))
}

/// Reads optional settings; `undefined`/`null` means defaults.
pub(crate) fn settings_from_js(settings: JsValue) -> Result<SurfaceSettings, JsValue> {
    if settings.is_undefined() || settings.is_null() {
        return Ok(SurfaceSettings::default());
    }
    serde_wasm_bindgen::from_value(settings)
        .map_err(|err| JsValue::from_str(&format!("Invalid settings: {err}")))
}

pub(crate) fn build_parameters(names: &[String], values: &[f64]) -> Result<Parameters> {
    if names.len() != values.len() {
        bail!(
            "Parameter names and values must have the same length ({} vs {}).",
            names.len(),
            values.len()
        );
    }
    Ok(Parameters::from_pairs(
        names.iter().cloned().zip(values.iter().copied()),
    ))
}

pub(crate) fn range(values: &[f64], label: &str) -> Result<[f64; 2]> {
    match values {
        [lo, hi] => Ok([*lo, *hi]),
        _ => Err(anyhow!("{label} range must have exactly two entries, got {}.", values.len())),
    }
}

/// `[x, y, vx, vy]` to a tangent vector.
pub(crate) fn tangent_from(state: &[f64]) -> Result<TangentVector> {
    match state {
        [x, y, vx, vy] => Ok(TangentVector::from_components(*x, *y, *vx, *vy)),
        _ => bail!(
            "Tangent vector must be [x, y, vx, vy], got {} entries.",
            state.len()
        ),
    }
}

pub(crate) fn tangent_to_vec(state: &TangentVector) -> Vec<f64> {
    vec![state.pos.x, state.pos.y, state.vel.x, state.vel.y]
}

pub(crate) fn flatten_points(points: &[Vector3<f64>]) -> Vec<f64> {
    points.iter().flat_map(|p| [p.x, p.y, p.z]).collect()
}

pub(crate) fn flatten_vectors(vectors: &[Vector2<f64>]) -> Vec<f64> {
    vectors.iter().flat_map(|v| [v.x, v.y]).collect()
}
