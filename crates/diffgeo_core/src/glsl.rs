//! GLSL expression generation.
//!
//! Output is a standalone float expression that assumes every variable and
//! parameter is in scope as a `float`. Function names are checked against
//! the builtins GLSL ES 3.0 actually provides, so an unsupported call fails
//! here instead of at shader link time.

use crate::equation_engine::{named_constant, BinaryOp, Func1, Func2, Node, UnaryOp};
use crate::error::ExprError;
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_10;
use std::fmt::Write;

/// Single-argument functions that exist under the same name in GLSL.
const GLSL_UNARY: &[&str] = &[
    "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh", "exp", "log", "sqrt",
    "abs", "sign", "ceil", "floor", "round",
];

/// Two-argument functions that exist under the same name in GLSL.
const GLSL_BINARY: &[&str] = &["max", "min"];

/// Renders `node` as a GLSL float expression.
pub fn to_glsl(node: &Node) -> Result<String, ExprError> {
    match node {
        Node::Constant(value) => float_literal(*value),
        Node::Symbol(name) => match named_constant(name) {
            Some(value) => float_literal(value),
            None => Ok(name.clone()),
        },
        Node::Unary(op, operand) => {
            let inner = to_glsl(operand)?;
            let prefix = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Not => "!",
            };
            Ok(format!("{prefix}{}", maybe_paren(&inner)))
        }
        Node::Binary(BinaryOp::Pow, base, exponent) => {
            let base = to_glsl(base)?;
            match exponent.as_constant() {
                Some(n) if n == 0.0 => Ok("1.0".to_string()),
                Some(n) if n == 1.0 => Ok(base),
                Some(n) if n == 2.0 => Ok(format!("({base} * {base})")),
                Some(n) if n == 3.0 => Ok(format!("({base} * {base} * {base})")),
                _ => Ok(format!("pow({base}, {})", to_glsl(exponent)?)),
            }
        }
        Node::Binary(op, left, right) => {
            let symbol = match op {
                BinaryOp::And => "&&",
                BinaryOp::Or => "||",
                other => other.symbol(),
            };
            Ok(format!("({} {symbol} {})", to_glsl(left)?, to_glsl(right)?))
        }
        Node::Call(name, args) => call_to_glsl(name, args),
    }
}

fn call_to_glsl(name: &str, args: &[Node]) -> Result<String, ExprError> {
    let rendered = args
        .iter()
        .map(to_glsl)
        .collect::<Result<Vec<_>, _>>()?;

    match (name, rendered.as_slice()) {
        ("log" | "ln", [x]) => Ok(format!("log({x})")),
        ("log", [x, base]) => Ok(format!("(log({x}) / log({base}))")),
        ("log10", [x]) => Ok(format!("(log({x}) / {})", float_literal(LN_10)?)),
        // GLSL spells the two-argument arctangent `atan(y, x)`.
        ("atan2", [y, x]) => Ok(format!("atan({y}, {x})")),
        (_, [_]) if GLSL_UNARY.contains(&name) => Ok(format!("{name}({})", rendered.join(", "))),
        (_, [_, _]) if GLSL_BINARY.contains(&name) => {
            Ok(format!("{name}({})", rendered.join(", ")))
        }
        _ if Func1::lookup(name).is_some() || Func2::lookup(name).is_some() => {
            Err(ExprError::Arity {
                name: name.to_string(),
                expected: expected_arity(name),
                found: args.len(),
            })
        }
        _ => Err(ExprError::UnsupportedGlslFunction {
            name: name.to_string(),
        }),
    }
}

fn expected_arity(name: &str) -> &'static str {
    match name {
        "log" => "1 or 2",
        "atan2" | "max" | "min" => "2",
        _ => "1",
    }
}

/// Float literal with an explicit decimal point; negatives are parenthesised
/// so the literal can follow any operator.
pub fn float_literal(value: f64) -> Result<String, ExprError> {
    if !value.is_finite() {
        return Err(ExprError::NonFiniteConstant { value });
    }
    let mut text = format!("{}", value.abs());
    if !text.contains('.') {
        text.push_str(".0");
    }
    if value < 0.0 {
        Ok(format!("(-{text})"))
    } else {
        Ok(text)
    }
}

/// Wrap in parens if the expression shows a binary operator.
fn maybe_paren(expr: &str) -> String {
    if expr.contains(['+', '-', '*', '/']) {
        format!("({expr})")
    } else {
        expr.to_string()
    }
}

/// A named GLSL expression, spliced into `float <name>(...) { return <body>; }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlslSnippet {
    pub name: String,
    pub body: String,
}

impl GlslSnippet {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

/// Assembles uniform declarations for `params` followed by one float
/// function per snippet, each taking `vars` as float arguments.
pub fn function_block<V: AsRef<str>, P: AsRef<str>>(
    snippets: &[GlslSnippet],
    vars: &[V],
    params: &[P],
) -> String {
    let mut out = String::new();
    for param in params {
        let _ = writeln!(out, "uniform float {};", param.as_ref());
    }
    if !params.is_empty() {
        out.push('\n');
    }
    let signature = vars
        .iter()
        .map(|v| format!("float {}", v.as_ref()))
        .collect::<Vec<_>>()
        .join(", ");
    for snippet in snippets {
        let _ = writeln!(
            out,
            "float {}({signature}) {{ return {}; }}",
            snippet.name, snippet.body
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::{compile, parse, Parameters};

    fn glsl(source: &str) -> String {
        to_glsl(&parse(source).unwrap()).expect("renders")
    }

    /// Minimal evaluator for the GLSL float expressions produced above.
    struct GlslEval<'a> {
        chars: Vec<char>,
        pos: usize,
        vars: &'a [(&'a str, f64)],
    }

    impl<'a> GlslEval<'a> {
        fn run(src: &str, vars: &'a [(&'a str, f64)]) -> f64 {
            let mut eval = GlslEval {
                chars: src.chars().collect(),
                pos: 0,
                vars,
            };
            let value = eval.or();
            eval.skip_ws();
            assert_eq!(eval.pos, eval.chars.len(), "trailing GLSL input in {src}");
            value
        }

        fn skip_ws(&mut self) {
            while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
                self.pos += 1;
            }
        }

        fn eat(&mut self, s: &str) -> bool {
            self.skip_ws();
            let want: Vec<char> = s.chars().collect();
            if self.chars[self.pos..].starts_with(&want) {
                self.pos += want.len();
                true
            } else {
                false
            }
        }

        fn or(&mut self) -> f64 {
            let mut v = self.and();
            while self.eat("||") {
                let r = self.and();
                v = f64::from(u8::from(v != 0.0 || r != 0.0));
            }
            v
        }

        fn and(&mut self) -> f64 {
            let mut v = self.sum();
            while self.eat("&&") {
                let r = self.sum();
                v = f64::from(u8::from(v != 0.0 && r != 0.0));
            }
            v
        }

        fn sum(&mut self) -> f64 {
            let mut v = self.product();
            loop {
                if self.eat("+") {
                    v += self.product();
                } else if self.eat("-") {
                    v -= self.product();
                } else {
                    return v;
                }
            }
        }

        fn product(&mut self) -> f64 {
            let mut v = self.unary();
            loop {
                if self.eat("*") {
                    v *= self.unary();
                } else if self.eat("/") {
                    v /= self.unary();
                } else {
                    return v;
                }
            }
        }

        fn unary(&mut self) -> f64 {
            if self.eat("-") {
                -self.unary()
            } else if self.eat("!") {
                f64::from(u8::from(self.unary() == 0.0))
            } else {
                self.atom()
            }
        }

        fn atom(&mut self) -> f64 {
            self.skip_ws();
            if self.eat("(") {
                let v = self.or();
                assert!(self.eat(")"));
                return v;
            }
            let start = self.pos;
            let c = self.chars[self.pos];
            if c.is_ascii_digit() {
                while self.pos < self.chars.len()
                    && (self.chars[self.pos].is_ascii_digit() || self.chars[self.pos] == '.')
                {
                    self.pos += 1;
                }
                let text: String = self.chars[start..self.pos].iter().collect();
                assert!(text.contains('.'), "GLSL float literal without decimal point: {text}");
                return text.parse().unwrap();
            }
            while self.pos < self.chars.len()
                && (self.chars[self.pos].is_alphanumeric() || self.chars[self.pos] == '_')
            {
                self.pos += 1;
            }
            let name: String = self.chars[start..self.pos].iter().collect();
            if self.eat("(") {
                let mut args = vec![self.or()];
                while self.eat(",") {
                    args.push(self.or());
                }
                assert!(self.eat(")"));
                return match (name.as_str(), args.as_slice()) {
                    ("pow", [a, b]) => a.powf(*b),
                    ("atan", [y, x]) => y.atan2(*x),
                    ("log", [a]) => a.ln(),
                    ("max", [a, b]) => a.max(*b),
                    ("min", [a, b]) => a.min(*b),
                    (f, [a]) => Func1::lookup(f).expect("builtin").apply(*a),
                    _ => panic!("unexpected GLSL call {name}"),
                };
            }
            self.vars
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| *v)
                .unwrap_or_else(|| panic!("unbound GLSL identifier {name}"))
        }
    }

    #[test]
    fn integer_powers_are_unrolled() {
        assert_eq!(glsl("x^2"), "(x * x)");
        assert_eq!(glsl("x^3"), "(x * x * x)");
        assert_eq!(glsl("x^0"), "1.0");
        assert_eq!(glsl("x^1"), "x");
        assert_eq!(glsl("x^5"), "pow(x, 5.0)");
        assert_eq!(glsl("x^0.5"), "pow(x, 0.5)");
        assert_eq!(glsl("(x+y)^2"), "((x + y) * (x + y))");
    }

    #[test]
    fn constants_always_carry_a_decimal_point() {
        assert_eq!(glsl("3"), "3.0");
        assert_eq!(glsl("2.5*x"), "(2.5 * x)");
        assert_eq!(glsl("pi"), "3.141592653589793");
        assert_eq!(glsl("e"), "2.718281828459045");
        assert_eq!(to_glsl(&Node::Constant(-2.0)).unwrap(), "(-2.0)");
        assert!(matches!(
            to_glsl(&Node::Constant(f64::INFINITY)),
            Err(ExprError::NonFiniteConstant { .. })
        ));
    }

    #[test]
    fn functions_and_logic_translate() {
        assert_eq!(glsl("log(x, 2)"), "(log(x) / log(2.0))");
        assert_eq!(glsl("atan2(y, x)"), "atan(y, x)");
        assert_eq!(glsl("sin(x)*cos(y)"), "(sin(x) * cos(y))");
        assert_eq!(glsl("x and y"), "(x && y)");
        assert_eq!(glsl("x or not y"), "(x || !y)");
        assert_eq!(glsl("-x"), "-x");
        assert_eq!(glsl("-(x+y)"), "-((x + y))");
        assert_eq!(glsl("--x"), "-(-x)");
        assert!(glsl("log10(x)").starts_with("(log(x) / 2.302585"));
    }

    #[test]
    fn functions_without_glsl_builtins_are_rejected() {
        assert_eq!(
            to_glsl(&parse("gamma(x)").unwrap()).unwrap_err(),
            ExprError::UnsupportedGlslFunction { name: "gamma".into() }
        );
        assert!(matches!(
            to_glsl(&parse("sin(x, y)").unwrap()),
            Err(ExprError::Arity { .. })
        ));
        assert!(matches!(
            to_glsl(&parse("atan2(x)").unwrap()),
            Err(ExprError::Arity { .. })
        ));
    }

    #[test]
    fn glsl_agrees_with_native_evaluation() {
        let params = Parameters::from_pairs([("a", 1.3), ("b", -0.4)]);
        let cases = [
            "x^2*y",
            "exp(-x^2-y^2)",
            "sin(x)*sin(y)",
            "a*x^3 - b*y^5 + 2x y",
            "log(2 + x^2, 3) + log10(4 + y^2)",
            "atan2(y, x) + sqrt(abs(x*y))",
            "-(x - y)^2 / (1 + a^2)",
            "max(x, y) - min(a, b) + floor(x) * ceil(y)",
            "pi*x + e*y",
            "(x and y) or 0",
        ];
        for source in cases {
            let node = parse(source).unwrap();
            let native = compile(&node, &["x", "y"], &params).unwrap();
            let code = to_glsl(&node).unwrap();
            for &(x, y) in &[(0.5, 0.25), (-0.75, 1.5), (1.25, -0.5)] {
                let scope = [("x", x), ("y", y), ("a", 1.3), ("b", -0.4)];
                let expected = native.call2(x, y);
                let actual = GlslEval::run(&code, &scope);
                assert!(
                    (expected - actual).abs() <= 1e-12 * (1.0 + expected.abs()),
                    "{source} -> {code}: native {expected} vs glsl {actual}"
                );
            }
        }
    }

    #[test]
    fn function_block_declares_uniforms_and_functions() {
        let snippets = [
            GlslSnippet::new("f", "(a * x)"),
            GlslSnippet::new("fx", "a"),
        ];
        let block = function_block(&snippets, &["x", "y"], &["a"]);
        assert!(block.starts_with("uniform float a;\n\n"));
        assert!(block.contains("float f(float x, float y) { return (a * x); }"));
        assert!(block.contains("float fx(float x, float y) { return a; }"));
    }
}
