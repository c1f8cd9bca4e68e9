//! `wasm-bindgen` bridge exposing the surface engines to the browser renderer.
//!
//! Point lists cross the boundary as flat `Vec<f64>` buffers (`[x, y, z, ...]`);
//! structured results (GLSL bundles, geodesic families) are serialized with
//! `serde-wasm-bindgen`.

mod graph;
mod revolution;
mod shared;

pub use graph::WasmGraphSurface;
pub use revolution::{WasmBlackHole, WasmRevolutionSurface};
