use thiserror::Error;

/// Failures of the expression pipeline: parsing, native compilation,
/// differentiation and GLSL generation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("syntax error at position {position}: {message}")]
    Syntax { message: String, position: usize },

    #[error("unrecognized symbol \"{name}\" in expression")]
    UnresolvedSymbol { name: String },

    #[error("unknown function \"{name}\"")]
    UnknownFunction { name: String },

    #[error("function \"{name}\" expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: &'static str,
        found: usize,
    },

    #[error("cannot differentiate {construct}")]
    NotDifferentiable { construct: String },

    #[error("function \"{name}\" has no GLSL equivalent")]
    UnsupportedGlslFunction { name: String },

    #[error("parameter \"{name}\" shadows a built-in constant")]
    ReservedName { name: String },

    #[error("constant {value} cannot be written as a GLSL literal")]
    NonFiniteConstant { value: f64 },
}

impl ExprError {
    pub(crate) fn syntax(message: impl Into<String>, position: usize) -> Self {
        ExprError::Syntax {
            message: message.into(),
            position,
        }
    }
}

/// Failures raised by the geometry engines and drivers.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error(transparent)]
    Expression(#[from] ExprError),

    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    #[error("interpolation error: {0}")]
    Interpolation(String),

    #[error("invalid settings: {0}")]
    Settings(String),
}

pub type Result<T, E = GeometryError> = std::result::Result<T, E>;
