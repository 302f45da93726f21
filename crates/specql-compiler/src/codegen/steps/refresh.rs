//! `refresh_table_view`: rebuild the `tv_` projection rows an action touched.

use super::{References, StepCompiler};
use crate::codegen::plpgsql::Stmt;
use crate::codegen::sql_types::{sql_literal, to_snake_case};
use crate::diagnostic::{CompilerError, Location};
use crate::ir::{Entity, RefreshStep};

/// Temporary table collecting rows to refresh at the end of the transaction.
pub const REFRESH_QUEUE: &str = "pg_temp.tv_refresh_queue";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshScope {
    Own,
    Propagate,
    Related,
    Batch,
}

impl RefreshScope {
    fn parse(scope: Option<&str>, location: &Location) -> Result<Self, CompilerError> {
        match scope.map(str::trim) {
            None | Some("self") => Ok(Self::Own),
            Some("propagate") => Ok(Self::Propagate),
            Some("related") => Ok(Self::Related),
            Some("batch") => Ok(Self::Batch),
            Some(other) => Err(CompilerError::invalid(
                location,
                "scope",
                format!("'{}' is not one of self, propagate, related, batch", other),
            )),
        }
    }
}

pub(super) fn compile(
    compiler: &StepCompiler<'_>,
    step: &RefreshStep,
    location: &Location,
    refs: &mut References,
) -> Result<Vec<Stmt>, CompilerError> {
    let scope = RefreshScope::parse(step.scope.as_deref(), location)?;
    let deferred = match step.strategy.as_deref().map(str::trim) {
        None | Some("immediate") => false,
        Some("deferred") => true,
        Some(other) => {
            return Err(CompilerError::invalid(
                location,
                "strategy",
                format!("'{}' is not one of immediate, deferred", other),
            ))
        }
    };
    if scope == RefreshScope::Propagate && step.propagate.is_empty() {
        return Err(CompilerError::missing(location, "refresh_table_view", "propagate"));
    }
    if scope != RefreshScope::Propagate && !step.propagate.is_empty() {
        return Err(CompilerError::invalid(
            location,
            "propagate",
            "only allowed with scope 'propagate'",
        ));
    }

    let entity = compiler.entity;
    let key = compiler.shape.key_variable().ok_or_else(|| {
        CompilerError::invalid(
            location,
            "scope",
            format!("the action has no {} row to refresh", entity.name),
        )
    })?;

    if deferred || scope == RefreshScope::Batch {
        return Ok(vec![
            Stmt::comment("Queue for batch refresh (deferred)"),
            Stmt::sql(format!(
                "INSERT INTO {} VALUES ({}, {});",
                REFRESH_QUEUE,
                sql_literal(&entity.name),
                key
            )),
        ]);
    }

    let own = refresh_own(entity, key);
    let mut stmts = match scope {
        RefreshScope::Propagate => vec![Stmt::comment("Refresh table view (self + propagate)"), own],
        RefreshScope::Related => vec![Stmt::comment("Refresh table view (self + all related)"), own],
        _ => return Ok(vec![Stmt::comment("Refresh table view (self)"), own]),
    };

    if scope == RefreshScope::Propagate {
        for name in &step.propagate {
            let field = entity
                .field(name)
                .filter(|f| f.is_reference())
                .ok_or_else(|| {
                    CompilerError::invalid(
                        location,
                        "propagate",
                        format!("'{}' is not a reference field of {}", name, entity.name),
                    )
                })?;
            let target = field.reference_entity.as_deref().unwrap_or(&entity.name);
            let schema = compiler
                .known
                .iter()
                .find(|e| e.name == target)
                .map(|e| e.schema.as_str())
                .or(field.reference_schema.as_deref())
                .unwrap_or(&entity.schema);
            refs.record_field(&field.name);
            stmts.push(Stmt::sql(format!(
                "PERFORM {}.refresh_tv_{}({});",
                schema,
                to_snake_case(target),
                field.variable()
            )));
        }
        return Ok(stmts);
    }

    for dependent in compiler
        .known
        .iter()
        .filter(|e| e.references_to(&entity.name).next().is_some())
    {
        stmts.push(Stmt::comment(format!(
            "Refresh {} entities that reference this {}",
            dependent.name, entity.name
        )));
        stmts.push(Stmt::sql(format!(
            "PERFORM {}_by_{}({});",
            dependent.refresh_function(),
            entity.snake_name(),
            key
        )));
    }
    Ok(stmts)
}

/// `PERFORM <schema>.refresh_tv_<entity>(<key>);`
pub fn refresh_own(entity: &Entity, key: &str) -> Stmt {
    Stmt::sql(format!("PERFORM {}({});", entity.refresh_function(), key))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{compile, compile_with};
    use crate::config::CompilerConfig;
    use crate::diagnostic::ErrorKind;
    use crate::ir::{RefreshStep, Step};

    fn refresh(step: RefreshStep) -> Vec<Step> {
        vec![Step::update("Contact", &[("status", "qualified")]), Step::RefreshTableView(step)]
    }

    #[test]
    fn test_self_scope() {
        let sql = compile(refresh(RefreshStep::default())).unwrap();
        assert!(sql.contains("-- Refresh table view (self)\nPERFORM crm.refresh_tv_contact(v_pk);"));
    }

    #[test]
    fn test_propagate_scope() {
        let (sql, refs) = compile_with(
            &CompilerConfig::default(),
            refresh(RefreshStep {
                scope: Some("propagate".to_string()),
                propagate: vec!["company".to_string()],
                ..Default::default()
            }),
        )
        .unwrap();
        assert!(sql.contains(
            "-- Refresh table view (self + propagate)\n\
             PERFORM crm.refresh_tv_contact(v_pk);\n\
             PERFORM crm.refresh_tv_company(v_company);"
        ));
        assert_eq!(refs.fields, vec!["company"]);
    }

    #[test]
    fn test_related_scope() {
        let sql = compile(refresh(RefreshStep::new("related"))).unwrap();
        assert!(sql.contains("-- Refresh table view (self + all related)"));
        assert!(sql.contains("-- Refresh Order entities that reference this Contact"));
        assert!(sql.contains("PERFORM crm.refresh_tv_order_by_contact(v_pk);"));
        assert!(!sql.contains("refresh_tv_company_by_contact"));
    }

    #[test]
    fn test_batch_and_deferred_queue() {
        let sql = compile(refresh(RefreshStep::new("batch"))).unwrap();
        assert!(sql.contains(
            "-- Queue for batch refresh (deferred)\n\
             INSERT INTO pg_temp.tv_refresh_queue VALUES ('Contact', v_pk);"
        ));

        let sql = compile(refresh(RefreshStep {
            strategy: Some("deferred".to_string()),
            ..Default::default()
        }))
        .unwrap();
        assert!(sql.contains("INSERT INTO pg_temp.tv_refresh_queue"));
        assert!(!sql.contains("PERFORM crm.refresh_tv_contact"));
    }

    #[test]
    fn test_created_row_key() {
        let sql = compile(vec![
            Step::insert("Contact", &[("email", "input.email")]),
            Step::RefreshTableView(RefreshStep::default()),
        ])
        .unwrap();
        assert!(sql.contains("PERFORM crm.refresh_tv_contact(v_created_pk);"));
    }

    #[test]
    fn test_invalid_attributes() {
        let err = compile(refresh(RefreshStep::new("everything"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAttribute);

        let err = compile(refresh(RefreshStep::new("propagate"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredAttribute);

        let err = compile(refresh(RefreshStep {
            scope: Some("propagate".to_string()),
            propagate: vec!["email".to_string()],
            ..Default::default()
        }))
        .unwrap_err();
        assert!(err.to_string().contains("'email' is not a reference field of Contact"));

        let err = compile(refresh(RefreshStep {
            strategy: Some("lazy".to_string()),
            ..Default::default()
        }))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAttribute);
    }
}
