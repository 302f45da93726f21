//! Success response: fills the mutation result at the end of the happy path.
//!
//! Entities with a `tv_` projection return the precomputed `data` row; all
//! others assemble the payload from the base table, inlining only the
//! relations the action's impact lists.

use serde_json::{json, Map, Value};

use super::plpgsql::Stmt;
use super::sql_types::{sql_literal, text_array};
use crate::ir::{Entity, EntityImpact, FieldDefinition, Impact};

pub const SUCCESS_STATUS: &str = "success";
pub const SUCCESS_MESSAGE: &str = "Operation completed successfully";

/// Builds the closing statements of an action.
pub struct ResponseGenerator<'a> {
    entity: &'a Entity,
    impact: Option<&'a Impact>,
}

impl<'a> ResponseGenerator<'a> {
    pub fn new(entity: &'a Entity, impact: Option<&'a Impact>) -> Self {
        Self { entity, impact }
    }

    /// `key` is the variable holding the action's row key, if it has one.
    pub fn generate(&self, key: Option<&str>) -> Vec<Stmt> {
        vec![
            Stmt::comment("success response"),
            Stmt::assign(
                "v_result.status",
                &format!("COALESCE(v_result.status, {})", sql_literal(SUCCESS_STATUS)),
            ),
            Stmt::assign(
                "v_result.message",
                &format!("COALESCE(v_result.message, {})", sql_literal(SUCCESS_MESSAGE)),
            ),
            self.object_data(key),
            Stmt::assign("v_result.updated_fields", &text_array(self.updated_fields())),
            Stmt::assign("v_result.extra_metadata", &self.extra_metadata()),
            Stmt::sql("RETURN v_result;"),
        ]
    }

    fn object_data(&self, key: Option<&str>) -> Stmt {
        let entity = self.entity;
        let Some(key) = key else {
            return Stmt::assign("v_result.object_data", "'{}'::jsonb");
        };

        if entity.table_views {
            return Stmt::sql(format!(
                "SELECT data INTO v_result.object_data\nFROM {}\nWHERE {} = {};",
                entity.projection_table(),
                entity.pk_column(),
                key
            ));
        }

        let mut pairs = vec!["'id', c.id".to_string()];
        for field in entity.fields.values() {
            pairs.push(format!("{}, {}", sql_literal(&field.name), self.field_value(field)));
        }
        let pairs: Vec<String> = pairs.iter().map(|p| format!("    {}", p)).collect();

        Stmt::sql(format!(
            "SELECT jsonb_build_object(\n{}\n)\nINTO v_result.object_data\nFROM {} c\nWHERE c.{} = {};",
            pairs.join(",\n"),
            entity.table(),
            entity.pk_column(),
            key
        ))
    }

    /// Payload value of one field; relations not worth inlining are `NULL`.
    fn field_value(&self, field: &FieldDefinition) -> String {
        let entity = self.entity;
        if !field.is_reference() && !field.is_reverse_relation() {
            return format!("c.{}", field.column());
        }

        let included = self
            .impact
            .is_some_and(|i| i.primary.include_relations.contains(&field.name));
        let related = field.reference_table(&entity.schema);
        match (included, related, field.reference_pk_column()) {
            (true, Some(table), Some(pk)) if field.is_reference() => format!(
                "(SELECT to_jsonb(r) FROM {} r WHERE r.{} = c.{})",
                table,
                pk,
                field.column()
            ),
            (true, Some(table), _) => format!(
                "(SELECT COALESCE(jsonb_agg(to_jsonb(r)), '[]'::jsonb) FROM {} r WHERE r.{} = c.{})",
                table,
                entity.fk_column(),
                entity.pk_column()
            ),
            _ => "NULL".to_string(),
        }
    }

    fn updated_fields(&self) -> &[String] {
        self.impact.map_or(&[][..], |i| i.primary.fields.as_slice())
    }

    fn extra_metadata(&self) -> String {
        match self.impact {
            Some(impact) => format!(
                "jsonb_build_object('_meta', {}::jsonb)",
                sql_literal(&impact_metadata(impact).to_string())
            ),
            None => "'{}'::jsonb".to_string(),
        }
    }
}

/// The `_meta` document; empty sections are left out.
fn impact_metadata(impact: &Impact) -> Value {
    let mut meta = Map::new();
    meta.insert("primary_entity".to_string(), entity_impact(&impact.primary));
    if !impact.side_effects.is_empty() {
        meta.insert(
            "actual_side_effects".to_string(),
            impact.side_effects.iter().map(entity_impact).collect(),
        );
    }
    if !impact.cache_invalidations.is_empty() {
        let invalidations = impact
            .cache_invalidations
            .iter()
            .map(|c| {
                json!({
                    "query_name": c.query,
                    "filter_json": c.filter,
                    "strategy": c.strategy,
                    "reason": c.reason,
                })
            })
            .collect();
        meta.insert("cache_invalidations".to_string(), invalidations);
    }
    Value::Object(meta)
}

fn entity_impact(impact: &EntityImpact) -> Value {
    let mut value = json!({
        "entity_type": impact.entity,
        "operation": impact.operation,
        "modified_fields": impact.fields,
    });
    if let (Some(collection), Value::Object(map)) = (&impact.collection, &mut value) {
        map.insert("collection".to_string(), json!(collection));
    }
    value
}
