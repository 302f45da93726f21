//! Source location tracking.
//!
//! There are no source spans once entities are deserialized; a location is
//! the entity, the action and the path of the step inside the action.

use std::fmt;

use crate::ir::StepPath;

/// Where in the domain model a diagnostic originates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub entity: String,
    pub action: String,
    /// `None` for action-level diagnostics.
    pub step: Option<StepPath>,
}

impl Location {
    pub fn new(entity: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            action: action.into(),
            step: None,
        }
    }

    pub fn at(&self, step: StepPath) -> Self {
        Self {
            entity: self.entity.clone(),
            action: self.action.clone(),
            step: Some(step),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.action)?;
        if let Some(step) = &self.step {
            write!(f, " {}", step)?;
        }
        Ok(())
    }
}
