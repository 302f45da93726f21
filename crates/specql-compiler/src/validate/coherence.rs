//! Coherence warnings.
//!
//! Order-based only: an `update` or `delete` is "validated" when some
//! `validate` step precedes it in a pre-order walk, whatever branch it sits in.

use crate::diagnostic::{Location, Warning};
use crate::ir::{Action, Step};

pub fn check(action: &Action, location: &Location) -> Vec<Warning> {
    let mut warnings = Vec::new();
    let mut validated = false;

    for (path, step) in action.walk() {
        match step {
            Step::Validate(s) => {
                validated = true;
                if s.error.as_deref().map_or(true, |e| e.trim().is_empty()) {
                    warnings.push(Warning::missing_error_code(location.at(path)));
                }
            }
            Step::Update(_) | Step::Delete(_) if !validated => {
                warnings.push(Warning::no_prior_validation(location.at(path), step.kind()));
            }
            _ => {}
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::WarningKind;
    use crate::ir::IfStep;

    fn warnings(steps: Vec<Step>) -> Vec<Warning> {
        check(&Action::new("act", steps), &Location::new("Contact", "act"))
    }

    #[test]
    fn test_one_warning_per_unvalidated_update() {
        let found = warnings(vec![
            Step::update("Contact", &[("status", "a")]),
            Step::update("Contact", &[("status", "b")]),
        ]);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|w| w.kind == WarningKind::NoPriorValidation));
        assert_eq!(found[1].to_string(), "Contact.act steps[1]: update step has no prior validation step");
    }

    #[test]
    fn test_validation_before_write_silences_warning() {
        let found = warnings(vec![
            Step::validate("status = 'lead'", Some("not_a_lead")),
            Step::delete("Contact"),
        ]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_missing_error_code() {
        let found = warnings(vec![Step::validate("status = 'lead'", None)]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, WarningKind::MissingErrorCode);
    }

    #[test]
    fn test_order_heuristic_crosses_branches() {
        let found = warnings(vec![Step::If(IfStep {
            condition: Some("TRUE".to_string()),
            then_steps: vec![Step::validate("status IS NOT NULL", Some("no_status"))],
            else_steps: vec![Step::delete("Contact")],
        })]);
        assert!(found.is_empty());
    }
}
