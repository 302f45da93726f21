//! Step encodings.
//!
//! Tagged: `{type: update, entity: Contact, fields: {...}, where_clause: ...}`.
//! Shorthand: the step kind is the key holding its primary attribute, e.g.
//! `{update: "Contact SET status = 'qualified' WHERE ..."}`.

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

use super::value::{
    as_mapping, key_text, scalar, string_list, string_map, text, text_any, ParseResult,
};
use crate::ir::{
    CallStep, ForeachStep, IfStep, NotifyStep, RefreshStep, Step, ValidateStep, WriteStep,
};

const KINDS: &[&str] = &[
    "validate",
    "insert",
    "update",
    "delete",
    "call",
    "notify",
    "if",
    "foreach",
    "refresh_table_view",
];

/// Keys of an `update` shorthand that are not field assignments.
const UPDATE_KEYS: &[&str] = &["update", "entity", "where", "where_clause", "fields"];

pub fn steps(value: Option<&Value>) -> ParseResult<Vec<Step>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| step(item).map_err(|e| format!("step {}: {}", i + 1, e)))
            .collect(),
        Some(_) => Err("steps must be a list".to_string()),
    }
}

pub fn step(value: &Value) -> ParseResult<Step> {
    let map = as_mapping(value, "a step")?;
    if let Some(kind) = text(map, "type")? {
        return tagged(&kind, map);
    }
    match KINDS.iter().find(|kind| map.contains_key(**kind)) {
        Some(kind) => shorthand(kind, map),
        None => {
            let kind = map
                .keys()
                .next()
                .map(key_text)
                .transpose()?
                .unwrap_or_else(|| "<empty>".to_string());
            Ok(Step::Unrecognized { kind })
        }
    }
}

fn tagged(kind: &str, map: &Mapping) -> ParseResult<Step> {
    let step = match kind {
        "validate" => Step::Validate(ValidateStep {
            expression: text(map, "expression")?,
            error: text(map, "error")?,
        }),
        "insert" => Step::Insert(write_step(map)?),
        "update" => Step::Update(write_step(map)?),
        "delete" => Step::Delete(write_step(map)?),
        "call" => Step::Call(CallStep {
            function_name: text(map, "function_name")?,
            arguments: string_map(map.get("arguments"), "argument")?,
        }),
        "notify" => Step::Notify(NotifyStep {
            recipient: text(map, "recipient")?,
            channel: text(map, "channel")?,
            message: text(map, "message")?,
        }),
        "if" => Step::If(IfStep {
            condition: text(map, "condition")?,
            then_steps: steps(map.get("then_steps"))?,
            else_steps: steps(map.get("else_steps"))?,
        }),
        "foreach" => Step::Foreach(ForeachStep {
            foreach_expr: text(map, "foreach_expr")?,
            iterator_var: text(map, "iterator_var")?,
            collection: text(map, "collection")?,
            then_steps: steps(map.get("then_steps"))?,
        }),
        "refresh_table_view" => Step::RefreshTableView(refresh_attributes(map)?),
        other => Step::Unrecognized {
            kind: other.to_string(),
        },
    };
    Ok(step)
}

fn write_step(map: &Mapping) -> ParseResult<WriteStep> {
    Ok(WriteStep {
        entity: text(map, "entity")?,
        fields: string_map(map.get("fields"), "field")?,
        where_clause: text_any(map, &["where_clause", "where"])?,
    })
}

fn shorthand(kind: &str, map: &Mapping) -> ParseResult<Step> {
    let step = match kind {
        "validate" => Step::Validate(ValidateStep {
            expression: text(map, "validate")?,
            error: text(map, "error")?,
        }),
        "if" => Step::If(IfStep {
            condition: text(map, "if")?,
            then_steps: steps(map.get("then").or_else(|| map.get("then_steps")))?,
            else_steps: steps(map.get("else").or_else(|| map.get("else_steps")))?,
        }),
        "foreach" => Step::Foreach(ForeachStep {
            foreach_expr: text(map, "foreach")?,
            then_steps: steps(
                map.get("do")
                    .or_else(|| map.get("then"))
                    .or_else(|| map.get("then_steps")),
            )?,
            ..Default::default()
        }),
        "insert" => Step::Insert(insert(map)?),
        "update" => Step::Update(update(map)?),
        "delete" => Step::Delete(delete(map)?),
        "call" => Step::Call(call(map)?),
        "notify" => Step::Notify(notify(map)?),
        "refresh_table_view" => Step::RefreshTableView(refresh(map)?),
        other => Step::Unrecognized {
            kind: other.to_string(),
        },
    };
    Ok(step)
}

/// `insert: Contact` with an optional `fields` mapping, or `insert: {entity, fields...}`.
fn insert(map: &Mapping) -> ParseResult<WriteStep> {
    match map.get("insert") {
        Some(Value::Mapping(body)) => Ok(WriteStep {
            entity: text(body, "entity")?,
            fields: assignments_from(body, &["entity"])?,
            where_clause: None,
        }),
        _ => Ok(WriteStep {
            entity: text(map, "insert")?.map(|e| e.trim().to_string()),
            fields: string_map(map.get("fields"), "field")?,
            where_clause: None,
        }),
    }
}

/// Three forms:
/// - `update: Contact SET a = 1, b = 'x' WHERE cond`
/// - `update: {entity: Contact, a: 1, where: cond}`
/// - `update: Contact` with the assignments as sibling keys
fn update(map: &Mapping) -> ParseResult<WriteStep> {
    let spec = match map.get("update") {
        Some(Value::Mapping(body)) => {
            return Ok(WriteStep {
                entity: text(body, "entity")?,
                fields: assignments_from(body, &["entity", "where", "where_clause"])?,
                where_clause: text_any(body, &["where_clause", "where"])?,
            });
        }
        Some(value) => scalar(value).ok_or("'update' must be a string or a mapping")?,
        None => String::new(),
    };

    let (head, where_clause) = split_keyword(&spec, " WHERE ");
    let (entity, set) = split_keyword(head, " SET ");
    let mut fields = match set {
        Some(set) => set_clause(set)?,
        None => IndexMap::new(),
    };
    fields.extend(assignments_from(map, UPDATE_KEYS)?);
    fields.extend(string_map(map.get("fields"), "field")?);

    Ok(WriteStep {
        entity: non_empty(entity),
        fields,
        where_clause: match where_clause {
            Some(clause) => Some(clause.trim().to_string()),
            None => text_any(map, &["where_clause", "where"])?,
        },
    })
}

/// `delete: Contact WHERE cond`
fn delete(map: &Mapping) -> ParseResult<WriteStep> {
    let spec = text(map, "delete")?.unwrap_or_default();
    let (entity, where_clause) = split_keyword(&spec, " WHERE ");
    Ok(WriteStep {
        entity: non_empty(entity),
        fields: IndexMap::new(),
        where_clause: match where_clause {
            Some(clause) => Some(clause.trim().to_string()),
            None => text_any(map, &["where_clause", "where"])?,
        },
    })
}

/// `call: fn(a = x, b = 'y')` or `call: fn` with an `arguments` mapping.
fn call(map: &Mapping) -> ParseResult<CallStep> {
    let spec = text(map, "call")?.unwrap_or_default();
    let mut arguments = IndexMap::new();

    let function_name = match spec.split_once('(') {
        Some((name, rest)) => {
            let inner = rest
                .trim_end()
                .strip_suffix(')')
                .ok_or_else(|| format!("invalid call syntax: {}", spec))?;
            for arg in split_top_level(inner) {
                let (name, value) = assignment(arg)
                    .ok_or_else(|| format!("call argument '{}' must be 'name = value'", arg.trim()))?;
                arguments.insert(name, value);
            }
            name.trim().to_string()
        }
        None => spec.trim().to_string(),
    };
    arguments.extend(string_map(map.get("arguments"), "argument")?);

    Ok(CallStep {
        function_name: non_empty(&function_name),
        arguments,
    })
}

/// `notify: owner(email, "Contact qualified")` or the attribute mapping.
fn notify(map: &Mapping) -> ParseResult<NotifyStep> {
    if let Some(Value::Mapping(body)) = map.get("notify") {
        return Ok(NotifyStep {
            recipient: text(body, "recipient")?,
            channel: text(body, "channel")?,
            message: text(body, "message")?,
        });
    }

    let spec = text(map, "notify")?.unwrap_or_default();
    let Some((recipient, rest)) = spec.split_once('(') else {
        return Ok(NotifyStep {
            recipient: non_empty(&spec),
            channel: text(map, "channel")?,
            message: text(map, "message")?,
        });
    };
    let inner = rest
        .trim_end()
        .strip_suffix(')')
        .ok_or_else(|| format!("invalid notify syntax: {}", spec))?;
    let (channel, message) = match inner.split_once(',') {
        Some((channel, message)) => (channel, Some(unquote(message.trim()))),
        None => (inner, None),
    };

    Ok(NotifyStep {
        recipient: non_empty(recipient),
        channel: non_empty(channel),
        message: message.map(str::to_string),
    })
}

/// `refresh_table_view: tv_contact` (the view name, own row only), an empty
/// value, or `refresh_table_view: {scope, propagate, strategy}`.
fn refresh(map: &Mapping) -> ParseResult<RefreshStep> {
    match map.get("refresh_table_view") {
        Some(Value::Mapping(body)) => refresh_attributes(body),
        None | Some(Value::Null) => refresh_attributes(map),
        Some(value) => {
            scalar(value).ok_or("'refresh_table_view' must be a view name or a mapping")?;
            Ok(RefreshStep::default())
        }
    }
}

fn refresh_attributes(map: &Mapping) -> ParseResult<RefreshStep> {
    Ok(RefreshStep {
        scope: text(map, "scope")?,
        propagate: string_list(map.get("propagate"), "propagate")?,
        strategy: text(map, "strategy")?,
    })
}

/// Every key except `skip` as a field assignment.
fn assignments_from(map: &Mapping, skip: &[&str]) -> ParseResult<IndexMap<String, String>> {
    let mut fields = IndexMap::new();
    for (key, value) in map {
        let key = key_text(key)?;
        if skip.contains(&key.as_str()) {
            continue;
        }
        let value = scalar(value)
            .or_else(|| value.is_null().then(|| "NULL".to_string()))
            .ok_or_else(|| format!("value of '{}' must be a scalar", key))?;
        fields.insert(key, value);
    }
    Ok(fields)
}

/// `a = 1, b = 'x, y'` into ordered assignments.
fn set_clause(set: &str) -> ParseResult<IndexMap<String, String>> {
    split_top_level(set)
        .into_iter()
        .map(|part| {
            assignment(part).ok_or_else(|| format!("invalid SET assignment '{}'", part.trim()))
        })
        .collect()
}

/// Splits `name = value` at the first plain `=` (not part of `<=`, `>=`, `!=`).
fn assignment(part: &str) -> Option<(String, String)> {
    let bytes = part.as_bytes();
    let pos = bytes.iter().enumerate().position(|(i, &b)| {
        b == b'='
            && !matches!(i.checked_sub(1).map(|p| bytes[p]), Some(b'<' | b'>' | b'!' | b'='))
            && bytes.get(i + 1) != Some(&b'=')
    })?;
    let name = part[..pos].trim();
    let value = part[pos + 1..].trim();
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}

/// Splits at commas outside parentheses and quotes.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = &text[start..];
    if !last.trim().is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

/// Splits at the first case-insensitive `keyword` outside quotes.
fn split_keyword<'t>(text: &'t str, keyword: &str) -> (&'t str, Option<&'t str>) {
    let mut quoted = false;
    for (i, c) in text.char_indices() {
        if c == '\'' {
            quoted = !quoted;
            continue;
        }
        let matches = text
            .get(i..i + keyword.len())
            .is_some_and(|w| w.eq_ignore_ascii_case(keyword));
        if !quoted && matches {
            return (&text[..i], Some(&text[i + keyword.len()..]));
        }
    }
    (text, None)
}

fn unquote(text: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = text.strip_prefix(quote).and_then(|t| t.strip_suffix(quote)) {
            return inner;
        }
    }
    text
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
