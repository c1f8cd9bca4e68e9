//! Native/GLSL pairs for a function and its partial derivatives, with a
//! centered finite-difference fallback when a derivative cannot be produced
//! symbolically.

use crate::equation_engine::{compile, BinaryOp, CompiledFunction, Node, Parameters};
use crate::error::ExprError;
use crate::glsl::to_glsl;
use crate::settings::FiniteDifferenceSettings;
use log::warn;
use std::cell::RefCell;
use std::rc::Rc;

/// Which finite-difference stencil approximates a partial derivative.
/// Indices refer to positions in the function's variable list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stencil {
    First(usize),
    Second(usize),
    Mixed(usize, usize),
}

/// A native scalar field: either compiled from a symbolic tree or a
/// finite difference of the base function.
#[derive(Debug)]
pub enum SurfaceFn {
    Compiled(Rc<CompiledFunction>),
    FiniteDifference {
        base: Rc<CompiledFunction>,
        stencil: Stencil,
        h: f64,
        probe: RefCell<Vec<f64>>,
    },
}

impl SurfaceFn {
    pub fn finite_difference(base: Rc<CompiledFunction>, stencil: Stencil, h: f64) -> Self {
        let probe = RefCell::new(vec![0.0; base.arity()]);
        SurfaceFn::FiniteDifference {
            base,
            stencil,
            h,
            probe,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, SurfaceFn::FiniteDifference { .. })
    }

    pub fn call(&self, args: &[f64]) -> f64 {
        match self {
            SurfaceFn::Compiled(func) => func.call(args),
            SurfaceFn::FiniteDifference {
                base,
                stencil,
                h,
                probe,
            } => {
                let mut probe = probe.borrow_mut();
                let mut at = |shifts: &[(usize, f64)]| {
                    probe.copy_from_slice(args);
                    for &(idx, delta) in shifts {
                        probe[idx] += delta;
                    }
                    base.call(&probe)
                };
                let h = *h;
                match *stencil {
                    Stencil::First(i) => (at(&[(i, h)]) - at(&[(i, -h)])) / (2.0 * h),
                    Stencil::Second(i) => {
                        (at(&[(i, h)]) - 2.0 * at(&[]) + at(&[(i, -h)])) / (h * h)
                    }
                    Stencil::Mixed(i, j) => {
                        (at(&[(i, h), (j, h)]) - at(&[(i, h), (j, -h)]) - at(&[(i, -h), (j, h)])
                            + at(&[(i, -h), (j, -h)]))
                            / (4.0 * h * h)
                    }
                }
            }
        }
    }
}

fn shifted(node: &Node, vars: &[&str], shifts: &[(usize, f64)]) -> Node {
    shifts.iter().fold(node.clone(), |acc, &(idx, delta)| {
        let var = Node::symbol(vars[idx]);
        let moved = if delta < 0.0 {
            Node::binary(BinaryOp::Sub, var, Node::Constant(-delta))
        } else {
            Node::binary(BinaryOp::Add, var, Node::Constant(delta))
        };
        acc.substitute(vars[idx], &moved)
    })
}

/// The finite-difference stencil of `node` as an expression tree, so it
/// can be rendered to GLSL like any other expression.
pub fn stencil_node(node: &Node, vars: &[&str], stencil: Stencil, h: f64) -> Node {
    use BinaryOp::{Add, Div, Mul, Sub};
    let at = |shifts: &[(usize, f64)]| shifted(node, vars, shifts);
    let (numerator, denominator) = match stencil {
        Stencil::First(i) => (
            Node::binary(Sub, at(&[(i, h)]), at(&[(i, -h)])),
            2.0 * h,
        ),
        Stencil::Second(i) => (
            Node::binary(
                Add,
                Node::binary(Sub, at(&[(i, h)]), Node::binary(Mul, Node::Constant(2.0), at(&[]))),
                at(&[(i, -h)]),
            ),
            h * h,
        ),
        Stencil::Mixed(i, j) => (
            Node::binary(
                Add,
                Node::binary(
                    Sub,
                    Node::binary(Sub, at(&[(i, h), (j, h)]), at(&[(i, h), (j, -h)])),
                    at(&[(i, -h), (j, h)]),
                ),
                at(&[(i, -h), (j, -h)]),
            ),
            4.0 * h * h,
        ),
    };
    Node::binary(Div, numerator, Node::Constant(denominator))
}

/// A built field: native evaluator plus GLSL expression.
#[derive(Debug)]
pub struct FieldArtifact {
    pub native: SurfaceFn,
    pub glsl: String,
}

/// Compiles the base function. Failure here fails the whole build.
pub fn build_base(
    node: &Node,
    vars: &[&str],
    params: &Parameters,
) -> Result<(Rc<CompiledFunction>, String), ExprError> {
    let native = Rc::new(compile(node, vars, params)?);
    let glsl = to_glsl(node)?;
    Ok((native, glsl))
}

/// Compiles a symbolic derivative, falling back to a finite difference of
/// the base function when differentiation, compilation or GLSL rendering
/// of the derivative fails.
pub fn build_derivative(
    label: &str,
    derivative: Result<&Node, &ExprError>,
    base: (&Node, &Rc<CompiledFunction>),
    vars: &[&str],
    params: &Parameters,
    stencil: Stencil,
    fd: &FiniteDifferenceSettings,
) -> Result<FieldArtifact, ExprError> {
    let symbolic = derivative
        .map_err(Clone::clone)
        .and_then(|node| Ok((compile(node, vars, params)?, to_glsl(node)?)));

    match symbolic {
        Ok((native, glsl)) => Ok(FieldArtifact {
            native: SurfaceFn::Compiled(Rc::new(native)),
            glsl,
        }),
        Err(err) => {
            warn!("{label}: symbolic derivative unavailable ({err}); using finite differences");
            let (base_node, base_fn) = base;
            let glsl = to_glsl(&stencil_node(base_node, vars, stencil, fd.glsl_step))?;
            Ok(FieldArtifact {
                native: SurfaceFn::finite_difference(Rc::clone(base_fn), stencil, fd.native_step),
                glsl,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::parse;

    fn base(source: &str, vars: &[&str]) -> (Node, Rc<CompiledFunction>) {
        let node = parse(source).unwrap();
        let func = Rc::new(compile(&node, vars, &Parameters::new()).unwrap());
        (node, func)
    }

    #[test]
    fn finite_difference_stencils() {
        let (_, f) = base("x^3 * y^2", &["x", "y"]);
        let (x, y) = (0.7, -1.3);
        let fx = SurfaceFn::finite_difference(Rc::clone(&f), Stencil::First(0), 1e-5);
        let fyy = SurfaceFn::finite_difference(Rc::clone(&f), Stencil::Second(1), 1e-4);
        let fxy = SurfaceFn::finite_difference(Rc::clone(&f), Stencil::Mixed(0, 1), 1e-4);
        assert!(fx.is_fallback());
        assert!((fx.call(&[x, y]) - 3.0 * x * x * y * y).abs() < 1e-7);
        assert!((fyy.call(&[x, y]) - 2.0 * x * x * x).abs() < 1e-4);
        assert!((fxy.call(&[x, y]) - 6.0 * x * x * y).abs() < 1e-4);
    }

    #[test]
    fn stencil_node_matches_native_stencil() {
        let vars = ["x", "y"];
        let (node, f) = base("sin(x) * exp(y)", &vars);
        let h = 1e-3;
        for stencil in [Stencil::First(1), Stencil::Second(0), Stencil::Mixed(0, 1)] {
            let tree = stencil_node(&node, &vars, stencil, h);
            let from_tree = compile(&tree, &vars, &Parameters::new()).unwrap().call(&[0.4, 0.2]);
            let native = SurfaceFn::finite_difference(Rc::clone(&f), stencil, h).call(&[0.4, 0.2]);
            assert!((from_tree - native).abs() < 1e-9, "{stencil:?}");
        }
    }

    #[test]
    fn derivative_falls_back_on_error() {
        let vars = ["u"];
        let (node, f) = base("max(u, 1 - u)", &vars);
        let err = ExprError::NotDifferentiable {
            construct: "max".to_string(),
        };
        let built = build_derivative(
            "r'",
            Err(&err),
            (&node, &f),
            &vars,
            &Parameters::new(),
            Stencil::First(0),
            &FiniteDifferenceSettings::default(),
        )
        .unwrap();
        assert!(built.native.is_fallback());
        assert!((built.native.call(&[0.8]) - 1.0).abs() < 1e-8);
        assert!(built.glsl.contains("max("));
    }
}
