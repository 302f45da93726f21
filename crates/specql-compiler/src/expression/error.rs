//! Expression compiler errors.

use thiserror::Error;

/// Location-free failures of the expression compiler.
///
/// Step compilers attach a [`Location`](crate::diagnostic::Location) with
/// [`CompilerError::from_expression`](crate::diagnostic::CompilerError::from_expression).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("{message} at offset {position}")]
    Syntax { message: String, position: usize },

    #[error("{message}")]
    Security { message: String },

    #[error("unknown field '{field}' on entity {entity}")]
    UnknownField { entity: String, field: String },

    #[error("not implemented: {feature}")]
    NotImplemented { feature: String },
}

pub type ExpressionResult<T> = Result<T, ExpressionError>;

impl ExpressionError {
    pub fn syntax(message: impl Into<String>, position: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }

    pub fn security(message: impl Into<String>) -> Self {
        Self::Security {
            message: message.into(),
        }
    }
}
