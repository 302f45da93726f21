//! The mutation-result composite type every action returns.

/// Field names of the result type, in declaration order.
pub const MUTATION_RESULT_FIELDS: &[(&str, &str)] = &[
    ("status", "TEXT"),
    ("message", "TEXT"),
    ("object_data", "JSONB"),
    ("updated_fields", "TEXT[]"),
    ("extra_metadata", "JSONB"),
];

/// DDL for the result type, emitted once per project.
pub fn mutation_result_type(type_name: &str) -> String {
    let schema = type_name.split_once('.').map(|(schema, _)| schema);

    let mut out = String::new();
    out.push_str("-- Standard return type of every generated action function\n");
    if let Some(schema) = schema {
        out.push_str(&format!("CREATE SCHEMA IF NOT EXISTS {};\n\n", schema));
    }
    out.push_str(&format!("DROP TYPE IF EXISTS {} CASCADE;\n", type_name));
    out.push_str(&format!("CREATE TYPE {} AS (\n", type_name));
    let fields: Vec<String> = MUTATION_RESULT_FIELDS
        .iter()
        .map(|(name, typ)| format!("    {} {}", name, typ))
        .collect();
    out.push_str(&fields.join(",\n"));
    out.push_str("\n);\n");
    out
}
