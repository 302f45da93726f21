//! Entity documents: `entity`, `schema`, `fields` and `actions`.

use serde_yaml::{Mapping, Value};

use super::steps;
use super::value::{as_mapping, key_text, scalar, string_list, text, ParseResult};
use crate::ir::{Action, Entity, EntityDefinition, FieldDefinition, FieldType, Impact};

const DEFAULT_SCHEMA: &str = "public";

pub fn definition(doc: &Value) -> ParseResult<EntityDefinition> {
    let doc = as_mapping(doc, "entity file")?;
    let name = text(doc, "entity")?.ok_or("missing 'entity' name")?;
    let schema = text(doc, "schema")?.unwrap_or_else(|| DEFAULT_SCHEMA.to_string());

    let mut entity = Entity::new(name, schema).with_table_views(table_views(doc.get("table_views"))?);
    entity.description = text(doc, "description")?;

    if let Some(fields) = doc.get("fields").filter(|v| !v.is_null()) {
        for (key, spec) in as_mapping(fields, "fields")? {
            let name = key_text(key)?;
            let field = field(&name, spec).map_err(|e| format!("field '{}': {}", name, e))?;
            entity = entity.with_field(field);
        }
    }

    let actions = actions(doc.get("actions"))?;
    Ok(EntityDefinition { entity, actions })
}

/// `true`/`false`, or the `mode: force|auto|disable` mapping.
fn table_views(value: Option<&Value>) -> ParseResult<bool> {
    match value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(enabled)) => Ok(*enabled),
        Some(Value::Mapping(map)) => match text(map, "mode")?.as_deref() {
            Some("force") => Ok(true),
            None | Some("auto") | Some("disable") => Ok(false),
            Some(other) => Err(format!("unknown table_views mode '{}'", other)),
        },
        Some(_) => Err("table_views must be a boolean or a mapping".to_string()),
    }
}

/// A field given as a type string (`text`, `ref(Company)`, `list(Order)`) or
/// as a mapping with `type`, `nullable`, `default`, `ref` and `schema`.
fn field(name: &str, spec: &Value) -> ParseResult<FieldDefinition> {
    if let Some(type_spec) = spec.as_str() {
        return typed(name, type_spec);
    }

    let map = as_mapping(spec, "a field")?;
    let type_spec = text(map, "type")?.ok_or("missing 'type'")?;
    let mut field = typed(name, &type_spec)?;

    if let Some(entity) = text(map, "ref")? {
        field.reference_entity = Some(entity);
    }
    if let Some(schema) = text(map, "schema")? {
        field.reference_schema = Some(schema);
    }
    match map.get("nullable") {
        None | Some(Value::Null) => {}
        Some(Value::Bool(nullable)) => field.nullable = *nullable,
        Some(_) => return Err("'nullable' must be a boolean".to_string()),
    }
    field.default = map.get("default").and_then(scalar);

    let needs_entity = matches!(field.type_name, FieldType::Ref | FieldType::List);
    if needs_entity && field.reference_entity.is_none() {
        return Err(format!("{} fields must name an entity", field.type_name));
    }
    Ok(field)
}

fn typed(name: &str, type_spec: &str) -> ParseResult<FieldDefinition> {
    let type_spec = type_spec.trim();
    let (base, argument) = match type_spec.split_once('(') {
        Some((base, rest)) => {
            let argument = rest
                .strip_suffix(')')
                .ok_or_else(|| format!("unbalanced type '{}'", type_spec))?;
            (base.trim(), Some(argument.trim()))
        }
        None => (type_spec, None),
    };

    match (base.to_ascii_lowercase().as_str(), argument) {
        ("ref", Some(target)) => Ok(with_target(FieldDefinition::reference(name, ""), target)),
        ("list", Some(target)) => Ok(with_target(FieldDefinition::reverse(name, ""), target)),
        // Enumerations are stored as text.
        ("enum", Some(_)) => Ok(FieldDefinition::new(name, FieldType::Text)),
        (_, Some(_)) => Err(format!("type '{}' takes no argument", base)),
        (base, None) => {
            let type_name = base.parse::<FieldType>()?;
            Ok(FieldDefinition::new(name, type_name))
        }
    }
}

/// `Company` or `sales.Company`.
fn with_target(mut field: FieldDefinition, target: &str) -> FieldDefinition {
    match target.split_once('.') {
        Some((schema, entity)) => {
            field.reference_schema = Some(schema.to_string());
            field.reference_entity = Some(entity.to_string());
        }
        None => field.reference_entity = Some(target.to_string()),
    }
    field
}

/// A list of actions with `name`, or a mapping from name to action body.
fn actions(value: Option<&Value>) -> ParseResult<Vec<Action>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| {
                let body = as_mapping(item, "an action")?;
                let name = text(body, "name")?.ok_or("action without a 'name'")?;
                action(name, body)
            })
            .collect(),
        Some(Value::Mapping(map)) => map
            .iter()
            .map(|(key, body)| action(key_text(key)?, as_mapping(body, "an action")?))
            .collect(),
        Some(_) => Err("actions must be a list or a mapping".to_string()),
    }
}

fn action(name: String, body: &Mapping) -> ParseResult<Action> {
    let context = |e: String| format!("action '{}': {}", name, e);

    let steps = steps::steps(body.get("steps")).map_err(context)?;
    let requires = string_list(body.get("requires"), "requires").map_err(context)?;
    let impact = match body.get("impact").filter(|v| !v.is_null()) {
        Some(value) => Some(
            serde_yaml::from_value::<Impact>(value.clone())
                .map_err(|e| context(format!("invalid impact: {}", e)))?,
        ),
        None => None,
    };

    Ok(Action {
        name,
        steps,
        requires,
        impact,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParseResult<EntityDefinition> {
        definition(&serde_yaml::from_str(source).unwrap())
    }

    #[test]
    fn test_field_shorthands() {
        let def = parse(
            "entity: Order\nfields:\n  buyer: ref(sales.Contact)\n  kind: enum(retail, wholesale)\n  total: money\n",
        )
        .unwrap();
        let buyer = &def.entity.fields["buyer"];
        assert_eq!(buyer.type_name, FieldType::Ref);
        assert_eq!(buyer.reference_entity.as_deref(), Some("Contact"));
        assert_eq!(buyer.reference_schema.as_deref(), Some("sales"));
        assert_eq!(def.entity.fields["kind"].type_name, FieldType::Text);
        assert_eq!(def.entity.fields["total"].type_name, FieldType::Decimal);
        assert_eq!(def.entity.schema, DEFAULT_SCHEMA);
    }

    #[test]
    fn test_field_mapping() {
        let def = parse("entity: Order\nfields:\n  owner: {type: ref, ref: User, schema: auth, nullable: false}\n").unwrap();
        let owner = &def.entity.fields["owner"];
        assert_eq!(owner.reference_table("crm").as_deref(), Some("auth.tb_user"));
        assert!(!owner.nullable);

        let err = parse("entity: Order\nfields:\n  owner: {type: ref}\n").unwrap_err();
        assert!(err.contains("must name an entity"));
    }

    #[test]
    fn test_table_views() {
        assert!(parse("entity: A\ntable_views: true\n").unwrap().entity.table_views);
        assert!(parse("entity: A\ntable_views: {mode: force}\n").unwrap().entity.table_views);
        assert!(!parse("entity: A\ntable_views: {mode: auto}\n").unwrap().entity.table_views);
        assert!(parse("entity: A\ntable_views: {mode: sometimes}\n").is_err());
    }

    #[test]
    fn test_actions_as_mapping() {
        let def = parse(
            "entity: Contact\nfields:\n  email: text\nactions:\n  archive:\n    steps:\n      - delete: Contact\n",
        )
        .unwrap();
        assert_eq!(def.actions[0].name, "archive");
        assert_eq!(def.actions[0].steps.len(), 1);
    }

    #[test]
    fn test_action_errors_carry_context() {
        let err = parse("entity: Contact\nactions:\n  - name: broken\n    steps: nope\n").unwrap_err();
        assert!(err.starts_with("action 'broken':"));
    }
}
