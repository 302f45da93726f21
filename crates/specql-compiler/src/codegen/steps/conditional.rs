//! `if`: structured conditional over nested steps.

use super::{required, References, StepCompiler};
use crate::diagnostic::{CompilerError, Location};
use crate::expression::Scope;
use crate::ir::IfStep;

/// Checks the step and compiles its condition; the branches are compiled by
/// the caller.
pub(super) fn open(
    compiler: &StepCompiler<'_>,
    step: &IfStep,
    location: &Location,
    scope: &Scope<'_>,
    refs: &mut References,
) -> Result<String, CompilerError> {
    let condition = required(&step.condition, location, "if", "a condition")?;
    if step.then_steps.is_empty() {
        return Err(CompilerError::missing(location, "if", "then_steps"));
    }
    compiler.condition(condition, location, scope, refs)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::compile;
    use crate::diagnostic::ErrorKind;
    use crate::ir::{IfStep, Step};

    #[test]
    fn test_if_else() {
        let sql = compile(vec![Step::If(IfStep {
            condition: Some("score >= 50".to_string()),
            then_steps: vec![Step::update("Contact", &[("status", "qualified")])],
            else_steps: vec![Step::update("Contact", &[("status", "nurture")])],
        })])
        .unwrap();
        assert!(sql.contains("IF v_score >= 50 THEN\n    UPDATE crm.tb_contact"));
        assert!(sql.contains("\nELSE\n    UPDATE crm.tb_contact"));
        assert!(sql.contains("SET status = 'nurture'"));
        assert!(sql.trim_end().ends_with("END IF;"));
    }

    #[test]
    fn test_missing_condition() {
        let err = compile(vec![Step::If(IfStep {
            condition: None,
            then_steps: vec![Step::validate("score > 0", None)],
            else_steps: Vec::new(),
        })])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredAttribute);
        assert!(err.to_string().contains("must have a condition"));
    }

    #[test]
    fn test_missing_then_steps() {
        let err = compile(vec![Step::If(IfStep {
            condition: Some("TRUE".to_string()),
            ..Default::default()
        })])
        .unwrap_err();
        assert!(err.to_string().contains("must have then_steps"));
    }

    #[test]
    fn test_nested_error_location() {
        let err = compile(vec![Step::If(IfStep {
            condition: Some("TRUE".to_string()),
            then_steps: vec![Step::Unrecognized {
                kind: "teleport".to_string(),
            }],
            else_steps: Vec::new(),
        })])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownStepKind);
        assert!(err.to_string().contains("steps[0].then_steps[0]"));
    }
}
