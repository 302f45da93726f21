//! `foreach`: iterate a query and run nested steps per row.

use super::StepCompiler;
use crate::codegen::sql_types::is_identifier;
use crate::diagnostic::{CompilerError, Location};
use crate::ir::{BindingError, ForeachStep};

/// Checks the step and resolves its loop; returns the loop variable and the
/// query it iterates. The body is compiled by the caller.
pub(super) fn open(
    compiler: &StepCompiler<'_>,
    step: &ForeachStep,
    location: &Location,
) -> Result<(String, String), CompilerError> {
    let binding = step.binding().map_err(|e| match e {
        BindingError::Missing => {
            CompilerError::missing(location, "foreach", "foreach_expr or iterator_var")
        }
        BindingError::Conflicting => CompilerError::invalid(
            location,
            "foreach_expr",
            "use either foreach_expr or iterator_var/collection, not both",
        ),
        BindingError::Malformed(expr) => CompilerError::invalid(
            location,
            "foreach_expr",
            format!("'{}' is not of the form 'var in collection'", expr),
        ),
    })?;

    if !is_identifier(&binding.iterator) {
        return Err(CompilerError::invalid(
            location,
            "iterator_var",
            format!("'{}' is not a variable name", binding.iterator),
        ));
    }
    if step.then_steps.is_empty() {
        return Err(CompilerError::missing(location, "foreach", "then_steps"));
    }

    let query = collection_query(compiler, &binding.collection, location)?;
    Ok((binding.iterator, query))
}

/// Resolves the collection text to the query the loop iterates.
fn collection_query(
    compiler: &StepCompiler<'_>,
    collection: &str,
    location: &Location,
) -> Result<String, CompilerError> {
    let collection = collection.trim();
    let not_implemented = |feature: String| CompilerError::NotImplemented {
        location: location.clone(),
        feature,
    };

    if collection.to_ascii_lowercase().starts_with("input.") {
        return Err(not_implemented(format!(
            "iterating over input collection '{}'",
            collection
        )));
    }

    let starts_with_select = collection
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"));
    if starts_with_select || collection.starts_with('(') {
        return compiler
            .expressions
            .compile_query(collection)
            .map_err(|e| CompilerError::from_expression(e, location));
    }

    if let Some((schema, table)) = collection.split_once('.') {
        if is_identifier(schema) && is_identifier(table) {
            return Ok(format!("SELECT * FROM {}", collection));
        }
        return Err(not_implemented(format!("collection expression '{}'", collection)));
    }

    if !is_identifier(collection) {
        return Err(not_implemented(format!("collection expression '{}'", collection)));
    }

    let entity = compiler.entity;
    if let Some(known) = compiler.known.iter().find(|e| e.name == collection) {
        return Ok(format!("SELECT * FROM {}", known.table()));
    }

    match entity.field(collection) {
        Some(field) if field.is_reverse_relation() => {
            let child = field.reference_table(&entity.schema).ok_or_else(|| {
                CompilerError::invalid(
                    location,
                    "collection",
                    format!("relation '{}' names no entity", field.name),
                )
            })?;
            Ok(format!(
                "SELECT * FROM {} WHERE {} = v_pk",
                child,
                entity.fk_column()
            ))
        }
        Some(field) => Err(not_implemented(format!(
            "iterating over non-relation field '{}'",
            field.name
        ))),
        None => Ok(format!("SELECT * FROM {}.{}", entity.schema, collection)),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::compile;
    use crate::diagnostic::ErrorKind;
    use crate::ir::{ForeachStep, IfStep, Step, WriteStep};

    fn foreach(expr: &str, then_steps: Vec<Step>) -> Step {
        Step::Foreach(ForeachStep {
            foreach_expr: Some(expr.to_string()),
            then_steps,
            ..Default::default()
        })
    }

    fn close_order() -> Step {
        Step::Update(
            WriteStep::new(Some("Order"), &[("status", "closed")]).with_where("pk_order = item.pk_order"),
        )
    }

    #[test]
    fn test_reverse_relation_loop() {
        let sql = compile(vec![foreach("item in orders", vec![close_order()])]).unwrap();
        assert!(sql.contains("FOR item IN SELECT * FROM crm.tb_order WHERE fk_contact = v_pk LOOP"));
        assert!(sql.contains("    UPDATE crm.tb_order"));
        assert!(sql.contains("WHERE pk_order = item.pk_order;"));
        assert!(sql.trim_end().ends_with("END LOOP;"));
    }

    #[test]
    fn test_collection_forms() {
        let sql = compile(vec![foreach("row in complex.expression", vec![close_order_for("row")])]).unwrap();
        assert!(sql.contains("FOR row IN SELECT * FROM complex.expression LOOP"));

        let sql = compile(vec![foreach("row in Order", vec![close_order_for("row")])]).unwrap();
        assert!(sql.contains("FOR row IN SELECT * FROM crm.tb_order LOOP"));

        let sql = compile(vec![foreach(
            "row in (SELECT * FROM crm.tb_order WHERE total > 100)",
            vec![close_order_for("row")],
        )])
        .unwrap();
        assert!(sql.contains("FOR row IN SELECT * FROM crm.tb_order WHERE total > 100 LOOP"));
    }

    fn close_order_for(var: &str) -> Step {
        Step::Update(
            WriteStep::new(Some("Order"), &[("status", "closed")])
                .with_where(&format!("pk_order = {}.pk_order", var)),
        )
    }

    #[test]
    fn test_input_collection_not_implemented() {
        let err = compile(vec![foreach("x in input.items", vec![close_order()])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
    }

    #[test]
    fn test_injected_query_rejected() {
        let err = compile(vec![foreach(
            "x in (SELECT * FROM crm.tb_order; DROP TABLE crm.tb_order)",
            vec![close_order_for("x")],
        )])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Security);
    }

    #[test]
    fn test_binding_errors() {
        let err = compile(vec![Step::Foreach(ForeachStep {
            then_steps: vec![close_order()],
            ..Default::default()
        })])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredAttribute);
        assert!(err.to_string().contains("must have foreach_expr or iterator_var"));

        let err = compile(vec![foreach("invalid_expression", vec![close_order()])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAttribute);

        let err = compile(vec![foreach("item in orders", Vec::new())]).unwrap_err();
        assert!(err.to_string().contains("must have then_steps"));
    }

    #[test]
    fn test_loop_variable_out_of_scope_after_loop() {
        let err = compile(vec![
            foreach("item in orders", vec![close_order()]),
            Step::validate("item.total > 0", None),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownField);
    }

    #[test]
    fn test_nested_in_conditional() {
        let sql = compile(vec![Step::If(IfStep {
            condition: Some("status = 'active'".to_string()),
            then_steps: vec![foreach("item in orders", vec![close_order()])],
            else_steps: Vec::new(),
        })])
        .unwrap();
        assert!(sql.contains("IF v_status = 'active' THEN\n    FOR item IN"));
        assert!(sql.contains("\n        UPDATE crm.tb_order"));
    }
}
