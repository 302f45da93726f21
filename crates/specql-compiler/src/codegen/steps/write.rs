//! `insert`, `update` and `delete`.

use super::{References, StepCompiler};
use crate::codegen::plpgsql::Stmt;
use crate::codegen::trinity::reference_key;
use crate::diagnostic::{CompilerError, Location};
use crate::expression::Scope;
use crate::ir::{Entity, FieldDefinition, WriteStep};

pub(super) fn compile_insert(
    compiler: &StepCompiler<'_>,
    step: &WriteStep,
    location: &Location,
    scope: &Scope<'_>,
    refs: &mut References,
) -> Result<Vec<Stmt>, CompilerError> {
    let target = compiler.target(step.entity.as_deref(), location)?;
    let own = compiler.is_own(target);

    let mut columns = Vec::new();
    let mut values = Vec::new();

    if step.fields.is_empty() {
        if !own {
            return Err(CompilerError::missing(location, "insert", "fields"));
        }
        // Own entity without explicit fields: insert every input.
        for field in target.column_fields() {
            columns.push(field.column());
            values.push(reference_key(field, &target.schema, &field.param()));
        }
    } else {
        for (name, value) in &step.fields {
            let field = column_field(target, name, location)?;
            columns.push(field.column());
            values.push(write_value(compiler, field, target, value, location, scope, refs)?);
        }
    }

    if compiler.config.audit_columns {
        columns.push("created_by".to_string());
        values.push("p_caller_id".to_string());
    }

    let mut sql = format!(
        "INSERT INTO {} ({})\nVALUES ({})",
        target.table(),
        columns.join(", "),
        values.join(", ")
    );
    if own {
        sql.push_str(&format!("\nRETURNING {} INTO v_created_pk", target.pk_column()));
    }
    sql.push(';');

    Ok(vec![Stmt::Sql(sql)])
}

pub(super) fn compile_update(
    compiler: &StepCompiler<'_>,
    step: &WriteStep,
    location: &Location,
    scope: &Scope<'_>,
    refs: &mut References,
) -> Result<Vec<Stmt>, CompilerError> {
    let target = compiler.target(step.entity.as_deref(), location)?;
    if step.fields.is_empty() {
        return Err(CompilerError::missing(location, "update", "fields"));
    }

    let mut assignments = Vec::new();
    for (name, value) in &step.fields {
        let field = column_field(target, name, location)?;
        let value = write_value(compiler, field, target, value, location, scope, refs)?;
        assignments.push(format!("{} = {}", field.column(), value));
    }
    if compiler.config.audit_columns {
        assignments.push("updated_at = now()".to_string());
        assignments.push("updated_by = p_caller_id".to_string());
    }

    let filter = where_clause(compiler, step, target, "update", location, scope, refs)?;
    let mut stmts = vec![Stmt::Sql(format!(
        "UPDATE {}\nSET {}\nWHERE {};",
        target.table(),
        assignments.join(", "),
        filter
    ))];
    if compiler.is_own(target) && compiler.shape.existing_row {
        stmts.push(Stmt::ReloadRow(step.fields.keys().cloned().collect()));
    }
    Ok(stmts)
}

pub(super) fn compile_delete(
    compiler: &StepCompiler<'_>,
    step: &WriteStep,
    location: &Location,
    scope: &Scope<'_>,
    refs: &mut References,
) -> Result<Vec<Stmt>, CompilerError> {
    let target = compiler.target(step.entity.as_deref(), location)?;
    if !step.fields.is_empty() {
        return Err(CompilerError::invalid(
            location,
            "fields",
            "delete steps do not take fields",
        ));
    }

    let filter = where_clause(compiler, step, target, "delete", location, scope, refs)?;
    let sql = if compiler.config.soft_delete {
        format!(
            "UPDATE {}\nSET deleted_at = now(), deleted_by = p_caller_id\nWHERE {};",
            target.table(),
            filter
        )
    } else {
        format!("DELETE FROM {}\nWHERE {};", target.table(), filter)
    };
    Ok(vec![Stmt::Sql(sql)])
}

fn column_field<'e>(
    target: &'e Entity,
    name: &str,
    location: &Location,
) -> Result<&'e FieldDefinition, CompilerError> {
    target
        .field(name)
        .filter(|f| !f.is_reverse_relation())
        .ok_or_else(|| CompilerError::UnknownField {
            location: location.clone(),
            entity: target.name.clone(),
            field: name.to_string(),
        })
}

/// Compiles a value written to `field`.
///
/// Values for reference columns that come from inputs or literals are
/// external ids and are converted to the referenced row's key.
fn write_value(
    compiler: &StepCompiler<'_>,
    field: &FieldDefinition,
    target: &Entity,
    value: &str,
    location: &Location,
    scope: &Scope<'_>,
    refs: &mut References,
) -> Result<String, CompilerError> {
    let compiled = compiler.value(value, location, scope, refs)?;
    let external = !compiled.inputs.is_empty() || compiled.sql.starts_with('\'');
    if field.is_reference() && external {
        Ok(reference_key(field, &target.schema, &compiled.sql))
    } else {
        Ok(compiled.sql)
    }
}

/// The row filter of an update/delete; unbounded writes are never emitted.
fn where_clause(
    compiler: &StepCompiler<'_>,
    step: &WriteStep,
    target: &Entity,
    step_kind: &str,
    location: &Location,
    scope: &Scope<'_>,
    refs: &mut References,
) -> Result<String, CompilerError> {
    match step.where_clause.as_deref().map(str::trim).filter(|w| !w.is_empty()) {
        Some(clause) => {
            let columns = scope.columns_of(target);
            compiler.condition(clause, location, &columns, refs)
        }
        None if compiler.is_own(target) => Ok(format!("{} = v_pk", target.pk_column())),
        None => Err(CompilerError::missing(location, step_kind, "a where_clause")),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{compile, compile_with};
    use crate::config::CompilerConfig;
    use crate::diagnostic::ErrorKind;
    use crate::ir::{Step, WriteStep};

    #[test]
    fn test_insert_own_entity() {
        let sql = compile(vec![Step::insert("Contact", &[("email", "input.email")])]).unwrap();
        assert!(sql.contains("INSERT INTO crm.tb_contact (email, created_by)"));
        assert!(sql.contains("VALUES (p_email, p_caller_id)"));
        assert!(sql.contains("RETURNING pk_contact INTO v_created_pk;"));
    }

    #[test]
    fn test_insert_without_fields_takes_all_inputs() {
        let sql = compile(vec![Step::Insert(WriteStep::new(None, &[]))]).unwrap();
        assert!(sql.contains("INSERT INTO crm.tb_contact (email, status, score, fk_company, created_by)"));
        assert!(sql.contains("(SELECT pk_company FROM crm.tb_company WHERE id = p_company_id)"));
    }

    #[test]
    fn test_insert_other_entity_converts_reference() {
        let sql = compile(vec![Step::insert(
            "Order",
            &[("contact", "v_pk"), ("status", "open"), ("total", "0")],
        )])
        .unwrap();
        assert!(sql.contains("INSERT INTO crm.tb_order (fk_contact, status, total, created_by)"));
        assert!(sql.contains("VALUES (v_pk, 'open', 0, p_caller_id);"));
        assert!(!sql.contains("RETURNING"));
    }

    #[test]
    fn test_update_literal_value_and_audit_columns() {
        let sql = compile(vec![Step::update("Contact", &[("status", "qualified")])]).unwrap();
        assert!(sql.contains("UPDATE crm.tb_contact"));
        assert!(sql.contains("SET status = 'qualified', updated_at = now(), updated_by = p_caller_id"));
        assert!(sql.contains("WHERE pk_contact = v_pk;"));
    }

    #[test]
    fn test_update_other_entity_requires_where_clause() {
        let err = compile(vec![Step::update("Order", &[("status", "closed")])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredAttribute);

        let step = WriteStep::new(Some("Order"), &[("status", "closed")])
            .with_where("contact = v_pk AND status <> 'closed'");
        let sql = compile(vec![Step::Update(step)]).unwrap();
        assert!(sql.contains("WHERE fk_contact = v_pk AND status <> 'closed';"));
    }

    #[test]
    fn test_unknown_entity_and_field() {
        let err = compile(vec![Step::insert("Invoice", &[("total", "1")])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownEntity);

        let err = compile(vec![Step::update("Contact", &[("phone", "x")])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownField);

        let err = compile(vec![Step::update("Contact", &[("orders", "x")])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownField);
    }

    #[test]
    fn test_delete_modes() {
        let sql = compile(vec![Step::delete("Contact")]).unwrap();
        assert!(sql.contains("DELETE FROM crm.tb_contact\nWHERE pk_contact = v_pk;"));

        let config = CompilerConfig {
            soft_delete: true,
            ..Default::default()
        };
        let (sql, _) = compile_with(&config, vec![Step::delete("Contact")]).unwrap();
        assert!(sql.contains("SET deleted_at = now(), deleted_by = p_caller_id"));
        assert!(!sql.contains("DELETE FROM"));
    }

    #[test]
    fn test_audit_columns_can_be_disabled() {
        let config = CompilerConfig {
            audit_columns: false,
            ..Default::default()
        };
        let (sql, _) = compile_with(&config, vec![Step::update("Contact", &[("score", "score + 1")])]).unwrap();
        assert!(sql.contains("SET score = v_score + 1\nWHERE"));
    }
}
