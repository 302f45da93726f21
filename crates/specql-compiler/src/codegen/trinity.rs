//! Trinity resolution: external `id` (UUID) to internal `pk_` key.

use super::plpgsql::Stmt;
use crate::ir::{Entity, FieldDefinition};

/// Error code raised when the identifier matches no row.
pub const NOT_FOUND: &str = "not_found";

/// Looks up `v_pk` from the entity's external id parameter, failing when absent.
pub fn resolve_pk(entity: &Entity, id_param: &str, sqlstate: &str) -> Vec<Stmt> {
    vec![
        Stmt::sql(format!(
            "SELECT {} INTO v_pk FROM {} WHERE id = {};",
            entity.pk_column(),
            entity.table(),
            id_param
        )),
        Stmt::If {
            condition: "v_pk IS NULL".to_string(),
            then_block: vec![Stmt::raise(NOT_FOUND, sqlstate)],
            else_block: Vec::new(),
        },
    ]
}

/// Sub-select turning an external id into the referenced row's internal key.
///
/// Fields that are not references are returned unchanged.
pub fn reference_key(field: &FieldDefinition, owner_schema: &str, value: &str) -> String {
    match (field.reference_table(owner_schema), field.reference_pk_column()) {
        (Some(table), Some(pk)) if field.is_reference() => {
            format!("(SELECT {} FROM {} WHERE id = {})", pk, table, value)
        }
        _ => value.to_string(),
    }
}

/// Loads the referenced fields into their `v_` variables.
///
/// Existing-row actions read the stored row; other actions take the inputs.
pub fn hydrate(entity: &Entity, referenced: &[String], existing_row: bool) -> Vec<Stmt> {
    let fields: Vec<&FieldDefinition> = entity
        .column_fields()
        .filter(|f| referenced.contains(&f.name))
        .collect();
    if fields.is_empty() {
        return Vec::new();
    }

    if existing_row {
        let columns: Vec<String> = fields.iter().map(|f| f.column()).collect();
        let variables: Vec<String> = fields.iter().map(|f| f.variable()).collect();
        return vec![Stmt::sql(format!(
            "SELECT {}\nINTO {}\nFROM {}\nWHERE {} = v_pk;",
            columns.join(", "),
            variables.join(", "),
            entity.table(),
            entity.pk_column()
        ))];
    }

    fields
        .iter()
        .map(|f| Stmt::assign(&f.variable(), &reference_key(f, &entity.schema, &f.param())))
        .collect()
}

/// Replaces each [`Stmt::ReloadRow`] with a re-read of the written fields
/// that the action also reads, or drops it when there are none.
pub fn fill_reloads(body: &mut Vec<Stmt>, entity: &Entity, referenced: &[String]) {
    let mut stack = vec![body];
    while let Some(block) = stack.pop() {
        block.retain(|stmt| match stmt {
            Stmt::ReloadRow(written) => written.iter().any(|f| referenced.contains(f)),
            _ => true,
        });
        for stmt in block {
            match stmt {
                Stmt::ReloadRow(written) => {
                    let stale: Vec<String> = referenced
                        .iter()
                        .filter(|f| written.contains(f))
                        .cloned()
                        .collect();
                    if let Some(reload) = hydrate(entity, &stale, true).into_iter().next() {
                        *stmt = reload;
                    }
                }
                Stmt::If {
                    then_block,
                    else_block,
                    ..
                } => {
                    stack.push(then_block);
                    stack.push(else_block);
                }
                Stmt::ForQuery { body, .. } => stack.push(body),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::plpgsql::render;
    use crate::ir::FieldType;

    fn contact() -> Entity {
        Entity::new("Contact", "crm")
            .with_field(FieldDefinition::new("email", FieldType::Text))
            .with_field(FieldDefinition::reference("company", "Company"))
    }

    #[test]
    fn test_resolve_pk() {
        let sql = render(&resolve_pk(&contact(), "p_contact_id", "P0001"), 0);
        assert!(sql.contains("SELECT pk_contact INTO v_pk FROM crm.tb_contact WHERE id = p_contact_id;"));
        assert!(sql.contains("IF v_pk IS NULL THEN"));
        assert!(sql.contains("MESSAGE = 'not_found'"));
    }

    #[test]
    fn test_reference_key() {
        let entity = contact();
        let company = entity.field("company").unwrap();
        assert_eq!(
            reference_key(company, "crm", "p_company_id"),
            "(SELECT pk_company FROM crm.tb_company WHERE id = p_company_id)"
        );
        let email = entity.field("email").unwrap();
        assert_eq!(reference_key(email, "crm", "p_email"), "p_email");
    }

    #[test]
    fn test_hydrate_existing_row() {
        let stmts = hydrate(&contact(), &["email".to_string(), "company".to_string()], true);
        let sql = render(&stmts, 0);
        assert!(sql.contains("SELECT email, fk_company\nINTO v_email, v_company\nFROM crm.tb_contact\nWHERE pk_contact = v_pk;"));
    }

    #[test]
    fn test_hydrate_from_inputs() {
        let stmts = hydrate(&contact(), &["email".to_string(), "company".to_string()], false);
        assert_eq!(stmts[0], Stmt::assign("v_email", "p_email"));
        assert_eq!(
            stmts[1],
            Stmt::assign(
                "v_company",
                "(SELECT pk_company FROM crm.tb_company WHERE id = p_company_id)"
            )
        );
        assert!(hydrate(&contact(), &[], false).is_empty());
    }

    #[test]
    fn test_fill_reloads() {
        let mut body = vec![
            Stmt::sql("UPDATE crm.tb_contact\nSET email = 'x'\nWHERE pk_contact = v_pk;"),
            Stmt::ReloadRow(vec!["email".to_string(), "company".to_string()]),
            Stmt::If {
                condition: "v_email IS NULL".to_string(),
                then_block: vec![Stmt::ReloadRow(vec!["status".to_string()])],
                else_block: Vec::new(),
            },
        ];
        fill_reloads(&mut body, &contact(), &["email".to_string()]);

        assert_eq!(
            body[1],
            Stmt::sql("SELECT email\nINTO v_email\nFROM crm.tb_contact\nWHERE pk_contact = v_pk;")
        );
        assert!(matches!(&body[2], Stmt::If { then_block, .. } if then_block.is_empty()));
    }
}
