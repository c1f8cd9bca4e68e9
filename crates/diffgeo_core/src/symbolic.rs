//! Symbolic differentiation and light algebraic simplification over [`Node`] trees.
//!
//! Only the rules needed to take first and second partials of surface
//! expressions are implemented. Constructs without a usable derivative
//! (logical operators, `max`/`min`) return [`ExprError::NotDifferentiable`]
//! so callers can fall back to finite differences.

use crate::equation_engine::{BinaryOp, Func1, Func2, Node, UnaryOp};
use crate::error::ExprError;
use std::f64::consts::LN_10;

const MAX_SIMPLIFY_PASSES: usize = 8;

/// Returns the simplified partial derivative of `node` with respect to `var`.
pub fn differentiate(node: &Node, var: &str) -> Result<Node, ExprError> {
    Ok(simplify(&derivative(node, var)?))
}

/// Raw (unsimplified) partial derivative.
pub fn derivative(node: &Node, var: &str) -> Result<Node, ExprError> {
    if !node.depends_on(var) {
        return Ok(Node::Constant(0.0));
    }

    match node {
        Node::Constant(_) => Ok(Node::Constant(0.0)),
        Node::Symbol(name) => Ok(Node::Constant(if name == var { 1.0 } else { 0.0 })),
        Node::Unary(UnaryOp::Neg, operand) => Ok(neg(derivative(operand, var)?)),
        Node::Unary(UnaryOp::Not, _) => Err(not_differentiable("logical operator 'not'")),
        Node::Binary(op, u, v) => match op {
            BinaryOp::Add => Ok(add(derivative(u, var)?, derivative(v, var)?)),
            BinaryOp::Sub => Ok(sub(derivative(u, var)?, derivative(v, var)?)),
            BinaryOp::Mul => {
                let du = derivative(u, var)?;
                let dv = derivative(v, var)?;
                Ok(add(mul(du, (**v).clone()), mul((**u).clone(), dv)))
            }
            BinaryOp::Div => {
                let du = derivative(u, var)?;
                let dv = derivative(v, var)?;
                let numerator = sub(mul(du, (**v).clone()), mul((**u).clone(), dv));
                Ok(div(numerator, pow((**v).clone(), Node::Constant(2.0))))
            }
            BinaryOp::Pow => power_rule(u, v, var),
            BinaryOp::And | BinaryOp::Or => Err(not_differentiable(format!(
                "logical operator '{}'",
                op.symbol()
            ))),
        },
        Node::Call(name, args) => call_rule(name, args, var),
    }
}

fn power_rule(u: &Node, v: &Node, var: &str) -> Result<Node, ExprError> {
    let base = u.clone();
    let exponent = v.clone();

    if !v.depends_on(var) {
        // d(u^n) = n u^(n-1) u'
        let reduced = match v.as_constant() {
            Some(n) => Node::Constant(n - 1.0),
            None => sub(exponent.clone(), Node::Constant(1.0)),
        };
        return Ok(mul(mul(exponent, pow(base, reduced)), derivative(u, var)?));
    }

    if !u.depends_on(var) {
        // d(a^v) = a^v ln(a) v'
        let ln_a = ln(base.clone());
        return Ok(mul(mul(pow(base, exponent), ln_a), derivative(v, var)?));
    }

    // d(u^v) = u^v (v' ln u + v u'/u)
    let du = derivative(u, var)?;
    let dv = derivative(v, var)?;
    let inner = add(
        mul(dv, ln(base.clone())),
        div(mul(exponent.clone(), du), base.clone()),
    );
    Ok(mul(pow(base, exponent), inner))
}

fn call_rule(name: &str, args: &[Node], var: &str) -> Result<Node, ExprError> {
    match args {
        [u] => {
            let func = Func1::lookup(name).ok_or_else(|| ExprError::UnknownFunction {
                name: name.to_string(),
            })?;
            let outer = unary_derivative(func, u.clone());
            Ok(mul(outer, derivative(u, var)?))
        }
        [a, b] => {
            let func = Func2::lookup(name).ok_or_else(|| ExprError::UnknownFunction {
                name: name.to_string(),
            })?;
            match func {
                Func2::Atan2 => {
                    // d atan2(a, b) = (b a' - a b') / (a^2 + b^2)
                    let da = derivative(a, var)?;
                    let db = derivative(b, var)?;
                    let numerator = sub(mul(b.clone(), da), mul(a.clone(), db));
                    let denominator = add(
                        pow(a.clone(), Node::Constant(2.0)),
                        pow(b.clone(), Node::Constant(2.0)),
                    );
                    Ok(div(numerator, denominator))
                }
                Func2::Log => derivative(&div(ln(a.clone()), ln(b.clone())), var),
                Func2::Max | Func2::Min => Err(not_differentiable(format!("{name}()"))),
            }
        }
        _ => Err(not_differentiable(format!(
            "{name}() with {} arguments",
            args.len()
        ))),
    }
}

/// g'(u) for the single-argument function g.
fn unary_derivative(func: Func1, u: Node) -> Node {
    let one = || Node::Constant(1.0);
    let square = |n: Node| pow(n, Node::Constant(2.0));
    match func {
        Func1::Sin => call1("cos", u),
        Func1::Cos => neg(call1("sin", u)),
        Func1::Tan => div(one(), square(call1("cos", u))),
        Func1::Asin => div(one(), call1("sqrt", sub(one(), square(u)))),
        Func1::Acos => neg(div(one(), call1("sqrt", sub(one(), square(u))))),
        Func1::Atan => div(one(), add(one(), square(u))),
        Func1::Sinh => call1("cosh", u),
        Func1::Cosh => call1("sinh", u),
        Func1::Tanh => sub(one(), square(call1("tanh", u))),
        Func1::Exp => call1("exp", u),
        Func1::Ln => div(one(), u),
        Func1::Log10 => div(one(), mul(u, Node::Constant(LN_10))),
        Func1::Sqrt => div(one(), mul(Node::Constant(2.0), call1("sqrt", u))),
        Func1::Abs => call1("sign", u),
        // Piecewise constant: zero almost everywhere.
        Func1::Sign | Func1::Ceil | Func1::Floor | Func1::Round => Node::Constant(0.0),
    }
}

fn not_differentiable(construct: impl Into<String>) -> ExprError {
    ExprError::NotDifferentiable {
        construct: construct.into(),
    }
}

// --- builders ---

fn add(a: Node, b: Node) -> Node {
    Node::binary(BinaryOp::Add, a, b)
}

fn sub(a: Node, b: Node) -> Node {
    Node::binary(BinaryOp::Sub, a, b)
}

fn mul(a: Node, b: Node) -> Node {
    Node::binary(BinaryOp::Mul, a, b)
}

fn div(a: Node, b: Node) -> Node {
    Node::binary(BinaryOp::Div, a, b)
}

fn pow(a: Node, b: Node) -> Node {
    Node::binary(BinaryOp::Pow, a, b)
}

fn neg(a: Node) -> Node {
    Node::unary(UnaryOp::Neg, a)
}

fn ln(a: Node) -> Node {
    call1("log", a)
}

fn call1(name: &str, a: Node) -> Node {
    Node::call(name, vec![a])
}

// --- simplification ---

/// Constant folding plus the usual additive/multiplicative identities,
/// repeated until the tree stops changing.
pub fn simplify(node: &Node) -> Node {
    let mut current = node.clone();
    for _ in 0..MAX_SIMPLIFY_PASSES {
        let next = simplify_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn simplify_pass(node: &Node) -> Node {
    match node {
        Node::Constant(_) | Node::Symbol(_) => node.clone(),
        Node::Unary(op, operand) => simplify_unary(*op, simplify_pass(operand)),
        Node::Binary(op, left, right) => {
            simplify_binary(*op, simplify_pass(left), simplify_pass(right))
        }
        Node::Call(name, args) => {
            let args: Vec<Node> = args.iter().map(simplify_pass).collect();
            fold_call(name, &args).unwrap_or_else(|| Node::Call(name.clone(), args))
        }
    }
}

fn simplify_unary(op: UnaryOp, operand: Node) -> Node {
    match (op, operand) {
        (UnaryOp::Neg, Node::Constant(c)) => Node::Constant(-c),
        (UnaryOp::Neg, Node::Unary(UnaryOp::Neg, inner)) => *inner,
        (UnaryOp::Not, Node::Constant(c)) => Node::Constant(if c == 0.0 { 1.0 } else { 0.0 }),
        (op, operand) => Node::unary(op, operand),
    }
}

fn simplify_binary(op: BinaryOp, left: Node, right: Node) -> Node {
    if let (Some(a), Some(b)) = (left.as_constant(), right.as_constant()) {
        if let Some(value) = fold_binary(op, a, b) {
            return Node::Constant(value);
        }
    }

    match op {
        BinaryOp::Add => match (left, right) {
            (Node::Constant(c), other) | (other, Node::Constant(c)) if c == 0.0 => other,
            (l, Node::Unary(UnaryOp::Neg, r)) => sub(l, *r),
            (Node::Unary(UnaryOp::Neg, l), r) => sub(r, *l),
            (l, r) => add(l, r),
        },
        BinaryOp::Sub => match (left, right) {
            (l, Node::Constant(c)) if c == 0.0 => l,
            (Node::Constant(c), r) if c == 0.0 => neg(r),
            (l, Node::Unary(UnaryOp::Neg, r)) => add(l, *r),
            (l, r) if l == r => Node::Constant(0.0),
            (l, r) => sub(l, r),
        },
        BinaryOp::Mul => match (left, right) {
            (Node::Constant(c), _) | (_, Node::Constant(c)) if c == 0.0 => Node::Constant(0.0),
            (Node::Constant(c), other) | (other, Node::Constant(c)) if c == 1.0 => other,
            (Node::Constant(c), other) | (other, Node::Constant(c)) if c == -1.0 => neg(other),
            // Keep constants on the left and merge nested constant factors.
            (other, Node::Constant(c)) if other.as_constant().is_none() => {
                simplify_binary(BinaryOp::Mul, Node::Constant(c), other)
            }
            (Node::Constant(a), Node::Binary(BinaryOp::Mul, inner_left, inner_right)) => {
                match inner_left.as_constant() {
                    Some(b) => mul(Node::Constant(a * b), *inner_right),
                    None => mul(
                        Node::Constant(a),
                        Node::Binary(BinaryOp::Mul, inner_left, inner_right),
                    ),
                }
            }
            (Node::Unary(UnaryOp::Neg, l), Node::Unary(UnaryOp::Neg, r)) => mul(*l, *r),
            (Node::Unary(UnaryOp::Neg, l), r) => neg(mul(*l, r)),
            (l, Node::Unary(UnaryOp::Neg, r)) => neg(mul(l, *r)),
            (l, r) => mul(l, r),
        },
        BinaryOp::Div => match (left, right) {
            (Node::Constant(c), _) if c == 0.0 => Node::Constant(0.0),
            (l, Node::Constant(c)) if c == 1.0 => l,
            (Node::Unary(UnaryOp::Neg, l), r) => neg(div(*l, r)),
            (l, r) => div(l, r),
        },
        BinaryOp::Pow => match (left, right) {
            (_, Node::Constant(c)) if c == 0.0 => Node::Constant(1.0),
            (l, Node::Constant(c)) if c == 1.0 => l,
            (Node::Constant(c), _) if c == 1.0 => Node::Constant(1.0),
            (l, r) => pow(l, r),
        },
        BinaryOp::And | BinaryOp::Or => Node::binary(op, left, right),
    }
}

fn fold_binary(op: BinaryOp, a: f64, b: f64) -> Option<f64> {
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Pow => a.powf(b),
        BinaryOp::And => f64::from(u8::from(a != 0.0 && b != 0.0)),
        BinaryOp::Or => f64::from(u8::from(a != 0.0 || b != 0.0)),
    };
    // Never fold into NaN/inf; leave the expression for the evaluator.
    value.is_finite().then_some(value)
}

fn fold_call(name: &str, args: &[Node]) -> Option<Node> {
    let value = match args {
        [a] => Func1::lookup(name)?.apply(a.as_constant()?),
        [a, b] => Func2::lookup(name)?.apply(a.as_constant()?, b.as_constant()?),
        _ => return None,
    };
    value.is_finite().then_some(Node::Constant(value))
}
