//! Compiler error types.
#![allow(unused_assignments)]

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use super::Location;
use crate::expression::ExpressionError;

/// Errors that can occur during compilation.
///
/// Every compilation variant carries the [`Location`] of the offending
/// entity/action/step so callers can report it without re-deriving it.
#[allow(unused_assignments)]
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum CompilerError {
    // =========================================================================
    // Expression Errors
    // =========================================================================
    #[error("{location}: syntax error in expression: {message}")]
    #[diagnostic(code(specql::expression::syntax))]
    Syntax {
        location: Location,
        message: String,
    },

    #[error("{location}: rejected unsafe expression: {message}")]
    #[diagnostic(
        code(specql::expression::security),
        help("Expressions must be a single statement and may only call allow-listed functions")
    )]
    Security {
        location: Location,
        message: String,
    },

    // =========================================================================
    // Reference Errors
    // =========================================================================
    #[error("{location}: unknown entity: {entity}")]
    #[diagnostic(code(specql::reference::unknown_entity))]
    UnknownEntity {
        location: Location,
        entity: String,
    },

    #[error("{location}: unknown field '{field}' on entity {entity}")]
    #[diagnostic(code(specql::reference::unknown_field))]
    UnknownField {
        location: Location,
        entity: String,
        field: String,
    },

    // =========================================================================
    // Structure Errors
    // =========================================================================
    #[error("{location}: {step_kind} step must have {attribute}")]
    #[diagnostic(code(specql::structure::missing_attribute))]
    MissingRequiredAttribute {
        location: Location,
        step_kind: String,
        attribute: String,
    },

    #[error("{location}: invalid {attribute}: {reason}")]
    #[diagnostic(code(specql::structure::invalid_attribute))]
    InvalidAttribute {
        location: Location,
        attribute: String,
        reason: String,
    },

    #[error("{location}: Unknown step type: {kind}")]
    #[diagnostic(
        code(specql::structure::unknown_step),
        help("Supported step types: validate, insert, update, delete, call, notify, if, foreach")
    )]
    UnknownStepKind {
        location: Location,
        kind: String,
    },

    #[error("{location}: Invalid notification channel '{channel}'")]
    #[diagnostic(code(specql::structure::invalid_channel))]
    InvalidChannel {
        location: Location,
        channel: String,
        allowed: Vec<String>,
    },

    #[error("{location}: action name '{name}' contains invalid characters")]
    #[diagnostic(
        code(specql::structure::invalid_action_name),
        help("Action names must match ^[a-z][a-z0-9_]*$")
    )]
    InvalidActionName {
        location: Location,
        name: String,
    },

    #[error("{location}: action must have at least one step")]
    #[diagnostic(code(specql::structure::empty_action))]
    EmptyAction {
        location: Location,
    },

    #[error("{location}: parameter '{name}' is generated twice")]
    #[diagnostic(
        code(specql::structure::duplicate_parameter),
        help("Rename the field so its input parameter does not collide with a generated one")
    )]
    DuplicateParameter {
        location: Location,
        name: String,
    },

    #[error("{location}: not implemented: {feature}")]
    #[diagnostic(code(specql::codegen::not_implemented))]
    NotImplemented {
        location: Location,
        feature: String,
    },

    // =========================================================================
    // IO / Frontend Errors
    // =========================================================================
    #[error("Failed to access '{}': {message}", path.display())]
    #[diagnostic(code(specql::io::read_error))]
    Io {
        path: PathBuf,
        message: String,
    },

    #[error("Failed to parse file '{}': {message}", path.display())]
    #[diagnostic(code(specql::parse::parse_failed))]
    Parse {
        path: PathBuf,
        message: String,
    },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(specql::config::invalid))]
    Config {
        message: String,
    },
}

/// The error taxonomy without payloads, for matching and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Security,
    UnknownEntity,
    UnknownField,
    MissingRequiredAttribute,
    InvalidAttribute,
    UnknownStepKind,
    InvalidChannel,
    InvalidActionName,
    EmptyAction,
    DuplicateParameter,
    NotImplemented,
    Io,
    Parse,
    Config,
}

impl CompilerError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Io {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Attaches a location to an expression compiler failure.
    pub fn from_expression(err: ExpressionError, location: &Location) -> Self {
        let location = location.clone();
        match err {
            ExpressionError::Syntax { message, .. } => Self::Syntax { location, message },
            ExpressionError::Security { message } => Self::Security { location, message },
            ExpressionError::UnknownField { entity, field } => Self::UnknownField {
                location,
                entity,
                field,
            },
            ExpressionError::NotImplemented { feature } => Self::NotImplemented { location, feature },
        }
    }

    pub fn missing(location: &Location, step_kind: &str, attribute: &str) -> Self {
        Self::MissingRequiredAttribute {
            location: location.clone(),
            step_kind: step_kind.to_string(),
            attribute: attribute.to_string(),
        }
    }

    pub fn invalid(location: &Location, attribute: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            location: location.clone(),
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Syntax { .. } => ErrorKind::Syntax,
            Self::Security { .. } => ErrorKind::Security,
            Self::UnknownEntity { .. } => ErrorKind::UnknownEntity,
            Self::UnknownField { .. } => ErrorKind::UnknownField,
            Self::MissingRequiredAttribute { .. } => ErrorKind::MissingRequiredAttribute,
            Self::InvalidAttribute { .. } => ErrorKind::InvalidAttribute,
            Self::UnknownStepKind { .. } => ErrorKind::UnknownStepKind,
            Self::InvalidChannel { .. } => ErrorKind::InvalidChannel,
            Self::InvalidActionName { .. } => ErrorKind::InvalidActionName,
            Self::EmptyAction { .. } => ErrorKind::EmptyAction,
            Self::DuplicateParameter { .. } => ErrorKind::DuplicateParameter,
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
            Self::Io { .. } => ErrorKind::Io,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    /// Location of the offending step, for compilation errors.
    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::Syntax { location, .. }
            | Self::Security { location, .. }
            | Self::UnknownEntity { location, .. }
            | Self::UnknownField { location, .. }
            | Self::MissingRequiredAttribute { location, .. }
            | Self::InvalidAttribute { location, .. }
            | Self::UnknownStepKind { location, .. }
            | Self::InvalidChannel { location, .. }
            | Self::InvalidActionName { location, .. }
            | Self::EmptyAction { location }
            | Self::DuplicateParameter { location, .. }
            | Self::NotImplemented { location, .. } => Some(location),
            Self::Io { .. } | Self::Parse { .. } | Self::Config { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::StepPath;

    #[test]
    fn test_display_starts_with_location() {
        let location = Location::new("Contact", "qualify_lead").at(StepPath::root(1).then_step(0));
        let err = CompilerError::missing(&location, "if", "a condition");
        assert_eq!(
            err.to_string(),
            "Contact.qualify_lead steps[1].then_steps[0]: if step must have a condition"
        );
        assert_eq!(err.kind(), ErrorKind::MissingRequiredAttribute);
    }

    #[test]
    fn test_expression_errors_keep_their_kind() {
        let location = Location::new("Contact", "a");
        let err = CompilerError::from_expression(
            ExpressionError::Security {
                message: "multiple statements".to_string(),
            },
            &location,
        );
        assert_eq!(err.kind(), ErrorKind::Security);
        assert_eq!(err.location(), Some(&location));
    }
}
