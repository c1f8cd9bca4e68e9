use crate::error::ExprError;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::f64::consts::{E, PI, TAU};
use std::fmt;
use std::rc::Rc;

/// Resolves the named constants understood by both code generators.
pub fn named_constant(name: &str) -> Option<f64> {
    match name {
        "pi" | "π" => Some(PI),
        "e" => Some(E),
        "tau" | "τ" => Some(TAU),
        _ => None,
    }
}

// --- AST ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Add | BinaryOp::Sub => 3,
            BinaryOp::Mul | BinaryOp::Div => 4,
            BinaryOp::Pow => 6,
        }
    }
}

/// Abstract Syntax Tree for scalar expressions.
///
/// Trees are never mutated after construction; every transformation
/// (differentiation, simplification, substitution) builds a fresh tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Constant(f64),
    Symbol(String),
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Call(String, Vec<Node>),
}

impl Node {
    pub fn symbol(name: impl Into<String>) -> Self {
        Node::Symbol(name.into())
    }

    pub fn unary(op: UnaryOp, operand: Node) -> Self {
        Node::Unary(op, Box::new(operand))
    }

    pub fn binary(op: BinaryOp, left: Node, right: Node) -> Self {
        Node::Binary(op, Box::new(left), Box::new(right))
    }

    pub fn call(name: impl Into<String>, args: Vec<Node>) -> Self {
        Node::Call(name.into(), args)
    }

    pub fn as_constant(&self) -> Option<f64> {
        match self {
            Node::Constant(value) => Some(*value),
            _ => None,
        }
    }

    /// Every symbol name referenced by the tree, including named constants.
    pub fn symbols(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<String>) {
        match self {
            Node::Constant(_) => {}
            Node::Symbol(name) => {
                out.insert(name.clone());
            }
            Node::Unary(_, operand) => operand.collect_symbols(out),
            Node::Binary(_, left, right) => {
                left.collect_symbols(out);
                right.collect_symbols(out);
            }
            Node::Call(_, args) => args.iter().for_each(|arg| arg.collect_symbols(out)),
        }
    }

    pub fn depends_on(&self, name: &str) -> bool {
        match self {
            Node::Constant(_) => false,
            Node::Symbol(symbol) => symbol == name,
            Node::Unary(_, operand) => operand.depends_on(name),
            Node::Binary(_, left, right) => left.depends_on(name) || right.depends_on(name),
            Node::Call(_, args) => args.iter().any(|arg| arg.depends_on(name)),
        }
    }

    /// Returns a copy of the tree with every occurrence of `name` replaced.
    pub fn substitute(&self, name: &str, replacement: &Node) -> Node {
        match self {
            Node::Symbol(symbol) if symbol == name => replacement.clone(),
            Node::Constant(_) | Node::Symbol(_) => self.clone(),
            Node::Unary(op, operand) => Node::unary(*op, operand.substitute(name, replacement)),
            Node::Binary(op, left, right) => Node::binary(
                *op,
                left.substitute(name, replacement),
                right.substitute(name, replacement),
            ),
            Node::Call(func, args) => Node::call(
                func.clone(),
                args.iter()
                    .map(|arg| arg.substitute(name, replacement))
                    .collect(),
            ),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Node::Constant(value) if *value < 0.0 => 5,
            Node::Constant(_) | Node::Symbol(_) | Node::Call(_, _) => 7,
            Node::Unary(_, _) => 5,
            Node::Binary(op, _, _) => op.precedence(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Constant(value) => write!(f, "{value}"),
            Node::Symbol(name) => write!(f, "{name}"),
            Node::Unary(op, operand) => {
                let prefix = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "not ",
                };
                if operand.precedence() < 5 {
                    write!(f, "{prefix}({operand})")
                } else {
                    write!(f, "{prefix}{operand}")
                }
            }
            Node::Binary(op, left, right) => {
                let prec = op.precedence();
                // `^` is right-associative, everything else left-associative.
                let (left_paren, right_paren) = if *op == BinaryOp::Pow {
                    (left.precedence() <= prec, right.precedence() < prec)
                } else {
                    (left.precedence() < prec, right.precedence() <= prec)
                };
                write_operand(f, left, left_paren)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, right, right_paren)
            }
            Node::Call(name, args) => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, node: &Node, paren: bool) -> fmt::Result {
    if paren {
        write!(f, "({node})")
    } else {
        write!(f, "{node}")
    }
}

// --- Function table ---

/// Single-argument functions understood by the native compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func1 {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
    Sign,
    Ceil,
    Floor,
    Round,
}

impl Func1 {
    pub fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Func1::Sin,
            "cos" => Func1::Cos,
            "tan" => Func1::Tan,
            "asin" => Func1::Asin,
            "acos" => Func1::Acos,
            "atan" => Func1::Atan,
            "sinh" => Func1::Sinh,
            "cosh" => Func1::Cosh,
            "tanh" => Func1::Tanh,
            "exp" => Func1::Exp,
            "log" | "ln" => Func1::Ln,
            "log10" => Func1::Log10,
            "sqrt" => Func1::Sqrt,
            "abs" => Func1::Abs,
            "sign" => Func1::Sign,
            "ceil" => Func1::Ceil,
            "floor" => Func1::Floor,
            "round" => Func1::Round,
            _ => return None,
        })
    }

    #[inline]
    pub fn apply(self, a: f64) -> f64 {
        match self {
            Func1::Sin => a.sin(),
            Func1::Cos => a.cos(),
            Func1::Tan => a.tan(),
            Func1::Asin => a.asin(),
            Func1::Acos => a.acos(),
            Func1::Atan => a.atan(),
            Func1::Sinh => a.sinh(),
            Func1::Cosh => a.cosh(),
            Func1::Tanh => a.tanh(),
            Func1::Exp => a.exp(),
            Func1::Ln => a.ln(),
            Func1::Log10 => a.log10(),
            Func1::Sqrt => a.sqrt(),
            Func1::Abs => a.abs(),
            // GLSL sign(): zero maps to zero, unlike f64::signum.
            Func1::Sign => {
                if a > 0.0 {
                    1.0
                } else if a < 0.0 {
                    -1.0
                } else {
                    a
                }
            }
            Func1::Ceil => a.ceil(),
            Func1::Floor => a.floor(),
            Func1::Round => a.round(),
        }
    }
}

/// Two-argument functions understood by the native compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func2 {
    Atan2,
    /// `log(x, base)`
    Log,
    Max,
    Min,
}

impl Func2 {
    pub fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "atan2" => Func2::Atan2,
            "log" => Func2::Log,
            "max" => Func2::Max,
            "min" => Func2::Min,
            _ => return None,
        })
    }

    #[inline]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Func2::Atan2 => a.atan2(b),
            Func2::Log => a.ln() / b.ln(),
            Func2::Max => a.max(b),
            Func2::Min => a.min(b),
        }
    }
}

// --- Bytecode & VM ---

/// OpCodes for the stack-based virtual machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant value onto the stack.
    LoadConst(f64),
    /// Pushes the positional argument with the given index.
    LoadVar(usize),
    /// Pushes the current value of a parameter slot.
    LoadParam(usize),
    Add,
    Sub,
    Mul,
    Div,
    /// Pops (b, a), pushes a.powf(b).
    Pow,
    /// Pops a, pushes a.powi(n).
    PowI(i32),
    Neg,
    /// Pops a, pushes 1.0 if a == 0 else 0.0.
    Not,
    And,
    Or,
    Call1(Func1),
    /// Pops (b, a), pushes f(a, b).
    Call2(Func2),
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }
}

#[inline]
fn truthy(value: f64) -> bool {
    value != 0.0
}

#[inline]
fn boolean(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Stack-based Virtual Machine for evaluating bytecode.
///
/// The VM is stateless; `execute` takes all necessary context and
/// returns the value left on the stack.
pub struct VM;

impl VM {
    pub fn execute(bytecode: &Bytecode, vars: &[f64], params: &[f64], stack: &mut Vec<f64>) -> f64 {
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(val) => stack.push(val),
                OpCode::LoadVar(idx) => stack.push(vars[idx]),
                OpCode::LoadParam(idx) => stack.push(params[idx]),
                OpCode::Add => binary(stack, |a, b| a + b),
                OpCode::Sub => binary(stack, |a, b| a - b),
                OpCode::Mul => binary(stack, |a, b| a * b),
                OpCode::Div => binary(stack, |a, b| a / b),
                OpCode::Pow => binary(stack, f64::powf),
                OpCode::PowI(n) => unary(stack, |a| a.powi(n)),
                OpCode::Neg => unary(stack, |a| -a),
                OpCode::Not => unary(stack, |a| boolean(!truthy(a))),
                OpCode::And => binary(stack, |a, b| boolean(truthy(a) && truthy(b))),
                OpCode::Or => binary(stack, |a, b| boolean(truthy(a) || truthy(b))),
                OpCode::Call1(func) => unary(stack, |a| func.apply(a)),
                OpCode::Call2(func) => binary(stack, |a, b| func.apply(a, b)),
            }
        }

        // The compiler guarantees a single value remains for valid bytecode.
        stack.pop().unwrap_or(f64::NAN)
    }
}

#[inline]
fn unary(stack: &mut [f64], op: impl Fn(f64) -> f64) {
    if let Some(top) = stack.last_mut() {
        *top = op(*top);
    }
}

#[inline]
fn binary(stack: &mut Vec<f64>, op: impl Fn(f64, f64) -> f64) {
    let b = stack.pop().unwrap_or(f64::NAN);
    if let Some(a) = stack.last_mut() {
        *a = op(*a, b);
    }
}

// --- Parameters ---

#[derive(Debug, Default)]
struct ParameterTable {
    names: Vec<String>,
    values: Vec<f64>,
}

/// Shared, mutable parameter store.
///
/// Cloning the handle shares the underlying table, so a slider writing
/// through one handle is observed by every function compiled against
/// another. Slots are append-only: indices handed to compiled bytecode
/// stay valid for the lifetime of the store.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    inner: Rc<RefCell<ParameterTable>>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let params = Self::new();
        for (name, value) in pairs {
            params.insert(name, value);
        }
        params
    }

    /// Adds a parameter, or overwrites its value if it already exists.
    pub fn insert(&self, name: impl Into<String>, value: f64) {
        let name = name.into();
        let mut table = self.inner.borrow_mut();
        match table.names.iter().position(|n| *n == name) {
            Some(idx) => table.values[idx] = value,
            None => {
                table.names.push(name);
                table.values.push(value);
            }
        }
    }

    /// Updates an existing parameter. Returns `false` for unknown names.
    pub fn set(&self, name: &str, value: f64) -> bool {
        let mut table = self.inner.borrow_mut();
        match table.names.iter().position(|n| n == name) {
            Some(idx) => {
                table.values[idx] = value;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        let table = self.inner.borrow();
        table
            .names
            .iter()
            .position(|n| n == name)
            .map(|idx| table.values[idx])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.inner.borrow().names.iter().position(|n| n == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.borrow().names.clone()
    }

    pub fn values(&self) -> Vec<f64> {
        self.inner.borrow().values.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shares_storage_with(&self, other: &Parameters) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

// --- Compiler ---

/// Compiles an AST (`Node`) into `Bytecode`.
/// Resolves variable and parameter names to indices.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
    pub param_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new<V: AsRef<str>, P: AsRef<str>>(var_names: &[V], param_names: &[P]) -> Self {
        let var_map = var_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_ref().to_string(), i))
            .collect();
        let param_map = param_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_ref().to_string(), i))
            .collect();

        Self { var_map, param_map }
    }

    pub fn compile(&self, node: &Node) -> Result<Bytecode, ExprError> {
        let mut ops = Vec::new();
        self.compile_recursive(node, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, node: &Node, ops: &mut Vec<OpCode>) -> Result<(), ExprError> {
        match node {
            Node::Constant(n) => ops.push(OpCode::LoadConst(*n)),
            Node::Symbol(name) => {
                if let Some(&idx) = self.var_map.get(name) {
                    ops.push(OpCode::LoadVar(idx));
                } else if let Some(&idx) = self.param_map.get(name) {
                    ops.push(OpCode::LoadParam(idx));
                } else if let Some(value) = named_constant(name) {
                    ops.push(OpCode::LoadConst(value));
                } else {
                    return Err(ExprError::UnresolvedSymbol { name: name.clone() });
                }
            }
            Node::Binary(BinaryOp::Pow, base, exponent) => {
                self.compile_recursive(base, ops)?;
                match integer_exponent(exponent) {
                    Some(n) => ops.push(OpCode::PowI(n)),
                    None => {
                        self.compile_recursive(exponent, ops)?;
                        ops.push(OpCode::Pow);
                    }
                }
            }
            Node::Binary(op, left, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                ops.push(match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::Div => OpCode::Div,
                    BinaryOp::And => OpCode::And,
                    BinaryOp::Or => OpCode::Or,
                    BinaryOp::Pow => OpCode::Pow,
                });
            }
            Node::Unary(op, operand) => {
                self.compile_recursive(operand, ops)?;
                ops.push(match op {
                    UnaryOp::Neg => OpCode::Neg,
                    UnaryOp::Not => OpCode::Not,
                });
            }
            Node::Call(func, args) => match args.len() {
                1 => {
                    let f = Func1::lookup(func).ok_or_else(|| unknown_or_arity(func, 1))?;
                    self.compile_recursive(&args[0], ops)?;
                    ops.push(OpCode::Call1(f));
                }
                2 => {
                    let f = Func2::lookup(func).ok_or_else(|| unknown_or_arity(func, 2))?;
                    self.compile_recursive(&args[0], ops)?;
                    self.compile_recursive(&args[1], ops)?;
                    ops.push(OpCode::Call2(f));
                }
                found => return Err(unknown_or_arity(func, found)),
            },
        }
        Ok(())
    }
}

fn integer_exponent(node: &Node) -> Option<i32> {
    let value = node.as_constant()?;
    if value.fract() == 0.0 && value.abs() <= 64.0 {
        Some(value as i32)
    } else {
        None
    }
}

fn unknown_or_arity(name: &str, found: usize) -> ExprError {
    let unary = Func1::lookup(name).is_some();
    let binary = Func2::lookup(name).is_some();
    let expected = match (unary, binary) {
        (true, true) => "1 or 2",
        (true, false) => "1",
        (false, true) => "2",
        (false, false) => {
            return ExprError::UnknownFunction {
                name: name.to_string(),
            }
        }
    };
    ExprError::Arity {
        name: name.to_string(),
        expected,
        found,
    }
}

// --- Compiled functions ---

/// A native scalar function of its declared variables.
///
/// Parameters are read from the live store on every call; the VM stack
/// is reused between calls, so evaluation does not allocate once warm.
/// Interior mutability makes this type `!Sync`.
#[derive(Debug)]
pub struct CompiledFunction {
    bytecode: Bytecode,
    arity: usize,
    params: Parameters,
    stack: RefCell<Vec<f64>>,
}

impl CompiledFunction {
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    /// Evaluates at `args`. Returns NaN when the argument count does not
    /// match the compiled arity.
    pub fn call(&self, args: &[f64]) -> f64 {
        if args.len() != self.arity {
            return f64::NAN;
        }
        let table = self.params.inner.borrow();
        let mut stack = self.stack.borrow_mut();
        VM::execute(&self.bytecode, args, &table.values, &mut stack)
    }

    #[inline]
    pub fn call1(&self, u: f64) -> f64 {
        self.call(&[u])
    }

    #[inline]
    pub fn call2(&self, x: f64, y: f64) -> f64 {
        self.call(&[x, y])
    }
}

/// Compiles `node` into a function of `vars`, reading parameters live from `params`.
pub fn compile<V: AsRef<str>>(
    node: &Node,
    vars: &[V],
    params: &Parameters,
) -> Result<CompiledFunction, ExprError> {
    let param_names = params.names();
    if let Some(name) = param_names.iter().find(|name| named_constant(name.as_str()).is_some()) {
        return Err(ExprError::ReservedName { name: name.clone() });
    }
    let compiler = Compiler::new(vars, param_names.as_slice());
    let bytecode = compiler.compile(node)?;
    Ok(CompiledFunction {
        bytecode,
        arity: vars.len(),
        params: params.clone(),
        stack: RefCell::new(Vec::with_capacity(32)),
    })
}

/// Parses and compiles in one go.
pub fn compile_str<V: AsRef<str>>(
    source: &str,
    vars: &[V],
    params: &Parameters,
) -> Result<CompiledFunction, ExprError> {
    compile(&parse(source)?, vars, params)
}

// --- Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Node, ExprError> {
    let tokens = tokenize(input)?;
    let end = input.chars().count();
    let mut parser = Parser {
        tokens,
        pos: 0,
        end,
    };
    let node = parser.parse_expression()?;
    if let Some(token) = parser.peek() {
        return Err(ExprError::syntax(
            format!("unexpected {} after end of expression", token.kind.describe()),
            token.position,
        ));
    }
    Ok(node)
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
    And,
    Or,
    Not,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::Identifier(name) => format!("identifier '{name}'"),
            TokenKind::Plus => "'+'".into(),
            TokenKind::Minus => "'-'".into(),
            TokenKind::Star => "'*'".into(),
            TokenKind::Slash => "'/'".into(),
            TokenKind::Caret => "'^'".into(),
            TokenKind::LParen => "'('".into(),
            TokenKind::RParen => "')'".into(),
            TokenKind::Comma => "','".into(),
            TokenKind::And => "'and'".into(),
            TokenKind::Or => "'or'".into(),
            TokenKind::Not => "'not'".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i < chars.len() && chars[i] == '.' {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            // Exponent only when digits follow; `2e` alone is 2 times Euler's number.
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| ExprError::syntax(format!("malformed number '{text}'"), start))?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                position: start,
            });
        } else if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            let kind = match ident.as_str() {
                "and" => TokenKind::And,
                "or" => TokenKind::Or,
                "not" => TokenKind::Not,
                _ => TokenKind::Identifier(ident),
            };
            tokens.push(Token {
                kind,
                position: start,
            });
        } else {
            let kind = match c {
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => TokenKind::Star,
                '/' => TokenKind::Slash,
                '^' => TokenKind::Caret,
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                ',' => TokenKind::Comma,
                other => {
                    return Err(ExprError::syntax(
                        format!("unexpected character '{other}'"),
                        start,
                    ))
                }
            };
            tokens.push(Token {
                kind,
                position: start,
            });
            i += 1;
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_rparen(&mut self, open_position: usize) -> Result<(), ExprError> {
        match self.consume() {
            Some(Token {
                kind: TokenKind::RParen,
                ..
            }) => Ok(()),
            Some(token) => Err(ExprError::syntax(
                format!(
                    "expected ')' to close '(' at {open_position}, found {}",
                    token.kind.describe()
                ),
                token.position,
            )),
            None => Err(ExprError::syntax(
                format!("unbalanced parenthesis: '(' at {open_position} is never closed"),
                self.end,
            )),
        }
    }

    fn parse_expression(&mut self) -> Result<Node, ExprError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Node, ExprError> {
        let mut left = self.parse_and()?;
        while let Some(TokenKind::Or) = self.peek_kind() {
            self.consume();
            let right = self.parse_and()?;
            left = Node::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, ExprError> {
        let mut left = self.parse_term()?;
        while let Some(TokenKind::And) = self.peek_kind() {
            self.consume();
            let right = self.parse_term()?;
            left = Node::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Node, ExprError> {
        let mut left = self.parse_factor()?;

        while let Some(kind) = self.peek_kind() {
            let op = match kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.consume();
            let right = self.parse_factor()?;
            left = Node::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Node, ExprError> {
        let mut left = self.parse_unary()?;

        while let Some(kind) = self.peek_kind() {
            match kind {
                TokenKind::Star | TokenKind::Slash => {
                    let op = if *kind == TokenKind::Star {
                        BinaryOp::Mul
                    } else {
                        BinaryOp::Div
                    };
                    self.consume();
                    let right = self.parse_unary()?;
                    left = Node::binary(op, left, right);
                }
                // Implicit multiplication: `2x`, `x y`, `3(x + 1)`, `2 not x`.
                TokenKind::Number(_) | TokenKind::Identifier(_) | TokenKind::LParen | TokenKind::Not => {
                    let right = self.parse_unary()?;
                    left = Node::binary(BinaryOp::Mul, left, right);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node, ExprError> {
        match self.peek_kind() {
            Some(TokenKind::Minus) => {
                self.consume();
                let operand = self.parse_unary()?;
                Ok(Node::unary(UnaryOp::Neg, operand))
            }
            Some(TokenKind::Not) => {
                self.consume();
                let operand = self.parse_unary()?;
                Ok(Node::unary(UnaryOp::Not, operand))
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Node, ExprError> {
        let base = self.parse_primary()?;
        if let Some(TokenKind::Caret) = self.peek_kind() {
            self.consume();
            // Right-associative; the exponent may carry its own sign.
            let exponent = self.parse_unary()?;
            return Ok(Node::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Node, ExprError> {
        let end = self.end;
        let token = self
            .consume()
            .ok_or_else(|| ExprError::syntax("unexpected end of input", end))?;
        match token.kind {
            TokenKind::Number(n) => Ok(Node::Constant(n)),
            TokenKind::Identifier(name) => {
                if let Some(TokenKind::LParen) = self.peek_kind() {
                    let open = self.consume().map(|t| t.position).unwrap_or(token.position);
                    let mut args = vec![self.parse_expression()?];
                    while let Some(TokenKind::Comma) = self.peek_kind() {
                        self.consume();
                        args.push(self.parse_expression()?);
                    }
                    self.expect_rparen(open)?;
                    Ok(Node::Call(name, args))
                } else {
                    Ok(Node::Symbol(name))
                }
            }
            TokenKind::LParen => {
                let node = self.parse_expression()?;
                self.expect_rparen(token.position)?;
                Ok(node)
            }
            other => Err(ExprError::syntax(
                format!("unexpected {}", other.describe()),
                token.position,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str, x: f64, y: f64) -> f64 {
        let params = Parameters::new();
        compile_str(source, &["x", "y"], &params)
            .expect("expression should compile")
            .call2(x, y)
    }

    #[test]
    fn parses_precedence_and_right_associative_power() {
        assert_eq!(eval("1 + 2 * 3", 0.0, 0.0), 7.0);
        assert_eq!(eval("2 ^ 3 ^ 2", 0.0, 0.0), 512.0);
        assert_eq!(eval("-x^2", 3.0, 0.0), -9.0);
        assert_eq!(eval("2^-1", 0.0, 0.0), 0.5);
        assert_eq!(eval("(1 + 2) * 3", 0.0, 0.0), 9.0);
        assert_eq!(eval("8 / 4 / 2", 0.0, 0.0), 1.0);
    }

    #[test]
    fn parses_implicit_multiplication() {
        assert_eq!(eval("2x", 3.0, 0.0), 6.0);
        assert_eq!(eval("3x^2y", 2.0, 5.0), 60.0);
        assert_eq!(eval("2(x + 1)", 1.0, 0.0), 4.0);
        assert_eq!(eval("x y", 2.0, 4.0), 8.0);
        assert_eq!(eval("(x)(y)", 2.0, 4.0), 8.0);
        assert_eq!(eval("2 sin(x)", 0.0, 0.0), 0.0);
        assert_eq!(eval("2 not x", 0.0, 0.0), 2.0);
        assert_eq!(eval("3 not x", 1.0, 0.0), 0.0);
    }

    #[test]
    fn parameters_named_like_constants_are_rejected() {
        for name in ["e", "pi", "π", "tau", "τ"] {
            let params = Parameters::from_pairs([(name, 3.0)]);
            assert_eq!(
                compile_str("x", &["x"], &params).unwrap_err(),
                ExprError::ReservedName { name: name.to_string() }
            );
        }
        let f = compile_str("e*x", &["x"], &Parameters::new()).expect("compiles");
        assert_eq!(f.call1(1.0), std::f64::consts::E);
    }

    #[test]
    fn wrong_argument_count_evaluates_to_nan() {
        let f = compile_str("x + y", &["x", "y"], &Parameters::new()).expect("compiles");
        assert!(f.call(&[1.0]).is_nan());
        assert!(f.call(&[1.0, 2.0, 3.0]).is_nan());
        assert_eq!(f.call(&[1.0, 2.0]), 3.0);
    }

    #[test]
    fn parses_function_calls_and_constants() {
        assert!((eval("atan2(y, x)", 1.0, 1.0) - PI / 4.0).abs() < 1e-12);
        assert!((eval("log(8, 2)", 0.0, 0.0) - 3.0).abs() < 1e-12);
        assert!((eval("log(e)", 0.0, 0.0) - 1.0).abs() < 1e-12);
        assert!((eval("2π", 0.0, 0.0) - TAU).abs() < 1e-12);
        assert_eq!(eval("max(x, y) - min(x, y)", 2.0, 7.0), 5.0);
        assert_eq!(eval("1.5e2", 0.0, 0.0), 150.0);
        assert!((eval("2e", 0.0, 0.0) - 2.0 * E).abs() < 1e-12);
    }

    #[test]
    fn logical_operators_use_nonzero_truth() {
        assert_eq!(eval("x and y", 1.0, 0.0), 0.0);
        assert_eq!(eval("x or y", 1.0, 0.0), 1.0);
        assert_eq!(eval("not x", 0.0, 0.0), 1.0);
        assert_eq!(eval("not x + 1", 0.0, 0.0), 2.0);
    }

    #[test]
    fn syntax_errors_carry_positions() {
        match parse("x + $") {
            Err(ExprError::Syntax { position, message }) => {
                assert_eq!(position, 4);
                assert!(message.contains('$'), "unexpected message: {message}");
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
        assert!(matches!(parse(""), Err(ExprError::Syntax { position: 0, .. })));
        assert!(matches!(parse("(x + 1"), Err(ExprError::Syntax { position: 6, .. })));
        assert!(matches!(parse("x + 1)"), Err(ExprError::Syntax { position: 5, .. })));
        assert!(matches!(parse("x +"), Err(ExprError::Syntax { .. })));
        assert!(matches!(parse("sin(x,)"), Err(ExprError::Syntax { .. })));
    }

    #[test]
    fn unresolved_symbols_are_rejected_at_compile_time() {
        let params = Parameters::new();
        let err = compile_str("x*q", &["x", "y"], &params).expect_err("q is not declared");
        assert_eq!(err, ExprError::UnresolvedSymbol { name: "q".into() });
        assert!(err.to_string().contains("\"q\""));
    }

    #[test]
    fn unknown_functions_and_bad_arity_are_rejected() {
        let params = Parameters::new();
        assert_eq!(
            compile_str("gamma(x)", &["x"], &params).unwrap_err(),
            ExprError::UnknownFunction { name: "gamma".into() }
        );
        assert!(matches!(
            compile_str("sin(x, x)", &["x"], &params),
            Err(ExprError::Arity { found: 2, .. })
        ));
        assert!(matches!(
            compile_str("atan2(x)", &["x"], &params),
            Err(ExprError::Arity { found: 1, .. })
        ));
    }

    #[test]
    fn parameters_are_bound_live() {
        let params = Parameters::from_pairs([("a", 1.0)]);
        let f = compile_str("a*x", &["x"], &params).expect("compiles");
        assert_eq!(f.call1(2.0), 2.0);

        assert!(params.set("a", 5.0));
        assert_eq!(f.call1(2.0), 10.0);

        let alias = params.clone();
        alias.insert("a", -1.0);
        assert_eq!(f.call1(2.0), -2.0);
        assert!(!params.set("missing", 1.0));
    }

    #[test]
    fn appending_parameters_keeps_compiled_slots_valid() {
        let params = Parameters::from_pairs([("a", 2.0)]);
        let f = compile_str("a + x", &["x"], &params).expect("compiles");
        params.insert("b", 100.0);
        assert_eq!(f.call1(1.0), 3.0);
    }

    #[test]
    fn variables_shadow_parameters() {
        let params = Parameters::from_pairs([("x", 100.0)]);
        let f = compile_str("x", &["x"], &params).expect("compiles");
        assert_eq!(f.call1(1.0), 1.0);
    }

    #[test]
    fn integer_powers_compile_to_powi() {
        let params = Parameters::new();
        let f = compile_str("x^3", &["x"], &params).expect("compiles");
        assert_eq!(f.bytecode().ops, vec![OpCode::LoadVar(0), OpCode::PowI(3)]);
        assert_eq!(f.call1(-2.0), -8.0);

        let g = compile_str("x^0.5", &["x"], &params).expect("compiles");
        assert!(g.bytecode().ops.contains(&OpCode::Pow));
        assert_eq!(g.call1(9.0), 3.0);
    }

    #[test]
    fn display_round_trips_through_the_parser() {
        for source in [
            "x - (y - 1)",
            "(x + y) ^ 2",
            "2 ^ 3 ^ x",
            "(2 ^ 3) ^ x",
            "-(x + y) * sin(x, y)",
            "x / (y * 2)",
            "not (x or y) and x",
        ] {
            let node = parse(source).expect("parses");
            let reparsed = parse(&node.to_string()).expect("display output parses");
            assert_eq!(node, reparsed, "round trip failed for {source}");
        }
    }

    #[test]
    fn substitute_replaces_every_occurrence() {
        let node = parse("x * x + y").unwrap();
        let shifted = node.substitute("x", &parse("x + 1").unwrap());
        let params = Parameters::new();
        let f = compile(&shifted, &["x", "y"], &params).unwrap();
        assert_eq!(f.call2(1.0, 3.0), 7.0);
        assert!(node.depends_on("y"));
        assert!(!parse("sin(x)").unwrap().depends_on("y"));
    }
}
