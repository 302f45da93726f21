//! PostgreSQL type mapping and identifier helpers.

use crate::ir::{FieldDefinition, FieldType};

/// Storage type of a field's column (and of its `v_` variable).
///
/// `ref` columns hold the referenced row's internal key.
pub fn column_type(typ: FieldType) -> &'static str {
    match typ {
        FieldType::Text => "TEXT",
        FieldType::Integer => "INTEGER",
        FieldType::Bigint => "BIGINT",
        FieldType::Boolean => "BOOLEAN",
        FieldType::Timestamp => "TIMESTAMPTZ",
        FieldType::Date => "DATE",
        FieldType::Time => "TIME",
        FieldType::Jsonb => "JSONB",
        FieldType::Uuid => "UUID",
        FieldType::Decimal => "NUMERIC",
        FieldType::Ref => "INTEGER",
        FieldType::List => "JSONB",
    }
}

/// Type of the input parameter carrying a field.
///
/// `ref` inputs are external identifiers and are resolved to keys in the body.
pub fn param_type(field: &FieldDefinition) -> &'static str {
    match field.type_name {
        FieldType::Ref => "UUID",
        other => column_type(other),
    }
}

/// Quotes a string as a SQL text literal.
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `ARRAY['a', 'b']::TEXT[]`, or an empty typed array.
pub fn text_array(values: &[String]) -> String {
    if values.is_empty() {
        return "ARRAY[]::TEXT[]".to_string();
    }
    let items: Vec<String> = values.iter().map(|v| sql_literal(v)).collect();
    format!("ARRAY[{}]::TEXT[]", items.join(", "))
}

/// Whether `s` is a plain lower/upper-case SQL identifier.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Converts a PascalCase or camelCase name to snake_case.
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !result.ends_with('_') {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_types() {
        assert_eq!(column_type(FieldType::Text), "TEXT");
        assert_eq!(column_type(FieldType::Timestamp), "TIMESTAMPTZ");
        assert_eq!(column_type(FieldType::Decimal), "NUMERIC");
        assert_eq!(column_type(FieldType::Ref), "INTEGER");
    }

    #[test]
    fn test_ref_param_is_external_id() {
        let field = FieldDefinition::reference("company", "Company");
        assert_eq!(param_type(&field), "UUID");
    }

    #[test]
    fn test_literals() {
        assert_eq!(sql_literal("qualified"), "'qualified'");
        assert_eq!(sql_literal("O'Brien"), "'O''Brien'");
        assert_eq!(text_array(&[]), "ARRAY[]::TEXT[]");
        assert_eq!(
            text_array(&["rating".to_string(), "status".to_string()]),
            "ARRAY['rating', 'status']::TEXT[]"
        );
    }

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("send_welcome"));
        assert!(!is_identifier("send welcome"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_case_conversions() {
        assert_eq!(to_snake_case("TodoItem"), "todo_item");
        assert_eq!(to_snake_case("Contact"), "contact");
        assert_eq!(to_snake_case("order_line"), "order_line");
    }
}
