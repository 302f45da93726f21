//! Non-fatal diagnostics.

use std::fmt;

use super::Location;

/// A style or coherence issue that never blocks compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub kind: WarningKind,
    pub location: Location,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// A `validate` step without an `error` code.
    MissingErrorCode,
    /// An `update`/`delete` with no `validate` step before it.
    NoPriorValidation,
}

impl Warning {
    pub fn missing_error_code(location: Location) -> Self {
        Self {
            kind: WarningKind::MissingErrorCode,
            location,
            message: "validate step should define a custom error message (error code)".to_string(),
        }
    }

    pub fn no_prior_validation(location: Location, step_kind: &str) -> Self {
        Self {
            kind: WarningKind::NoPriorValidation,
            location,
            message: format!("{} step has no prior validation step", step_kind),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}
