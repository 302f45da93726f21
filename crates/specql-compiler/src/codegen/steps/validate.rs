//! `validate`: raise a symbolic error when the expression does not hold.

use super::{required, References, StepCompiler};
use crate::codegen::plpgsql::Stmt;
use crate::diagnostic::{CompilerError, Location};
use crate::expression::Scope;
use crate::ir::ValidateStep;

/// Error code used when a `validate` step names none.
pub const DEFAULT_ERROR_CODE: &str = "validation_failed";

pub(super) fn compile(
    compiler: &StepCompiler<'_>,
    step: &ValidateStep,
    location: &Location,
    scope: &Scope<'_>,
    refs: &mut References,
) -> Result<Vec<Stmt>, CompilerError> {
    let expression = required(&step.expression, location, "validate", "an expression")?;
    let condition = compiler.condition(expression, location, scope, refs)?;
    let code = step
        .error
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .unwrap_or(DEFAULT_ERROR_CODE);

    Ok(vec![Stmt::If {
        condition: format!("NOT ({})", condition),
        then_block: vec![Stmt::raise(code, &compiler.config.error_sqlstate)],
        else_block: Vec::new(),
    }])
}

#[cfg(test)]
mod tests {
    use super::super::test_support::compile;
    use crate::diagnostic::ErrorKind;
    use crate::ir::{Step, ValidateStep};

    #[test]
    fn test_guard_negates_expression() {
        let sql = compile(vec![Step::validate("email IS NOT NULL", Some("missing_email"))]).unwrap();
        assert!(sql.contains("IF NOT (v_email IS NOT NULL) THEN"));
        assert!(sql.contains("RAISE EXCEPTION USING MESSAGE = 'missing_email', ERRCODE = 'P0001';"));
    }

    #[test]
    fn test_default_error_code() {
        let sql = compile(vec![Step::validate("score > 0", None)]).unwrap();
        assert!(sql.contains("MESSAGE = 'validation_failed'"));
    }

    #[test]
    fn test_missing_expression() {
        let err = compile(vec![Step::Validate(ValidateStep::default())]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredAttribute);
    }

    #[test]
    fn test_unknown_field() {
        let err = compile(vec![Step::validate("phone IS NOT NULL", None)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownField);
        assert!(err.to_string().starts_with("Contact.test_action steps[0]:"));
    }
}
