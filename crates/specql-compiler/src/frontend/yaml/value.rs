//! Typed access to loosely shaped YAML values.

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

pub type ParseResult<T> = Result<T, String>;

/// Scalars as text; YAML numbers and booleans are kept in source form.
pub fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn as_mapping<'v>(value: &'v Value, what: &str) -> ParseResult<&'v Mapping> {
    value
        .as_mapping()
        .ok_or_else(|| format!("{} must be a mapping", what))
}

/// An optional scalar attribute; `null` counts as absent.
pub fn text(map: &Mapping, key: &str) -> ParseResult<Option<String>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar(value)
            .map(Some)
            .ok_or_else(|| format!("'{}' must be a string", key)),
    }
}

/// The first present key among `keys`.
pub fn text_any(map: &Mapping, keys: &[&str]) -> ParseResult<Option<String>> {
    for key in keys {
        if let Some(value) = text(map, key)? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

pub fn key_text(key: &Value) -> ParseResult<String> {
    scalar(key).ok_or_else(|| "mapping keys must be strings".to_string())
}

/// `name: value` pairs in source order.
pub fn string_map(value: Option<&Value>, what: &str) -> ParseResult<IndexMap<String, String>> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Ok(IndexMap::new());
    };
    let mut out = IndexMap::new();
    for (key, value) in as_mapping(value, what)? {
        let key = key_text(key)?;
        let value = scalar(value)
            .or_else(|| value.is_null().then(|| "NULL".to_string()))
            .ok_or_else(|| format!("{} '{}' must be a scalar", what, key))?;
        out.insert(key, value);
    }
    Ok(out)
}

/// A single string or a list of strings.
pub fn string_list(value: Option<&Value>, what: &str) -> ParseResult<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| scalar(item).ok_or_else(|| format!("{} entries must be strings", what)))
            .collect(),
        Some(value) => scalar(value)
            .map(|s| vec![s])
            .ok_or_else(|| format!("{} must be a string or a list", what)),
    }
}
