//! Action validation.
//!
//! The validator gives a complete first-pass report: every structural error
//! and every coherence warning of an action, without stopping at the first.
//! The step compilers repeat the structural checks they depend on.

mod coherence;
mod structure;

use serde::Serialize;

use crate::config::CompilerConfig;
use crate::diagnostic::{CompilerError, Location, Warning};
use crate::ir::{Action, Entity};

/// Errors and warnings found in one action.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<CompilerError>,
    pub warnings: Vec<Warning>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The report as display strings, the shape surfaced to users.
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            errors: self.errors.iter().map(|e| e.to_string()).collect(),
            warnings: self.warnings.iter().map(|w| w.to_string()).collect(),
        }
    }
}

/// `{errors: [...], warnings: [...]}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Validates actions against their entity and the known entities.
pub struct ActionValidator<'a> {
    config: &'a CompilerConfig,
}

impl<'a> ActionValidator<'a> {
    pub fn new(config: &'a CompilerConfig) -> Self {
        Self { config }
    }

    /// Never fails; problems are returned in the report.
    pub fn validate(&self, action: &Action, entity: &Entity, known: &[Entity]) -> ValidationReport {
        let location = Location::new(&entity.name, &action.name);
        ValidationReport {
            errors: structure::check(action, entity, known, self.config, &location),
            warnings: coherence::check(action, &location),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::ErrorKind;
    use crate::ir::{FieldDefinition, FieldType, IfStep, Step};

    fn contact() -> Entity {
        Entity::new("Contact", "crm")
            .with_field(FieldDefinition::new("email", FieldType::Text))
            .with_field(FieldDefinition::new("status", FieldType::Text))
    }

    fn validate(action: &Action) -> ValidationReport {
        let entity = contact();
        ActionValidator::new(&CompilerConfig::default()).validate(action, &entity, &[entity.clone()])
    }

    #[test]
    fn test_valid_action() {
        let action = Action::new(
            "create_contact",
            vec![
                Step::validate("email IS NOT NULL", Some("missing_email")),
                Step::insert("Contact", &[("email", "input.email")]),
            ],
        );
        let report = validate(&action);
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_if_without_condition_reports_one_error() {
        let action = Action::new(
            "qualify",
            vec![Step::If(IfStep {
                condition: None,
                then_steps: vec![Step::update("Contact", &[("status", "qualified")])],
                else_steps: Vec::new(),
            })],
        );
        let report = validate(&action);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind(), ErrorKind::MissingRequiredAttribute);
    }

    #[test]
    fn test_summary_serializes() {
        let action = Action::new("Bad-Name", Vec::new());
        let summary = validate(&action).summary();
        assert_eq!(summary.errors.len(), 2);

        let json = serde_json::to_value(&summary).unwrap();
        assert!(json["errors"][0].as_str().unwrap().contains("invalid characters"));
        assert_eq!(json["warnings"], serde_json::json!([]));
    }
}
