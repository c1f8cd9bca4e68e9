/// The `diffgeo_core` crate provides the expression and integration engine behind
/// the surface visualizations: user expressions in, native evaluators, GLSL
/// snippets, geodesics and parallel-transported frames out.
///
/// Key components:
/// - **Equation Engine**: Parser, AST and a bytecode VM with a live parameter store.
/// - **Symbolic / GLSL**: Differentiation and simplification of ASTs, and GLSL code generation.
/// - **Geometry engines**: `GraphGeometry` (z = f(x, y)), `RevolutionGeometry` and `BlackHoleGeometry`.
/// - **Solvers**: Symplectic geodesic stepper, RK4 transport stepper and a generic RK4.
/// - **Drivers**: Geodesic polylines, spray/stripe families and transported frames.
pub mod black_hole;
pub mod equation_engine;
pub mod error;
pub mod geodesic;
pub mod geometry;
pub mod glsl;
pub mod graph_geometry;
pub mod interpolation;
pub mod revolution;
pub mod settings;
pub mod solvers;
pub mod surface_fn;
pub mod symbolic;
pub mod traits;
pub mod transport;
