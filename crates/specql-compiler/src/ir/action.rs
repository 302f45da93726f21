//! Action intermediate representation.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A named, ordered list of steps compiled to one stored function.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Action name; must match `^[a-z][a-z0-9_]*$`.
    pub name: String,

    pub steps: Vec<Step>,

    /// Capability/role tags, passed through unchanged.
    pub requires: Vec<String>,

    /// Declarative impact metadata, read only by the success response generator.
    pub impact: Option<Impact>,
}

impl Action {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
            requires: Vec::new(),
            impact: None,
        }
    }

    pub fn with_impact(mut self, impact: Impact) -> Self {
        self.impact = Some(impact);
        self
    }

    /// Visits every step in pre-order (a step before its nested steps,
    /// `then_steps` before `else_steps`), with its path.
    pub fn walk(&self) -> Vec<(StepPath, &Step)> {
        let mut visited = Vec::new();
        // Pushed in reverse so the first step is popped first.
        let mut stack: Vec<(StepPath, &Step)> = self
            .steps
            .iter()
            .enumerate()
            .rev()
            .map(|(i, s)| (StepPath::root(i), s))
            .collect();

        while let Some((path, step)) = stack.pop() {
            let (then_steps, else_steps) = step.nested();
            for (i, s) in else_steps.iter().enumerate().rev() {
                stack.push((path.else_step(i), s));
            }
            for (i, s) in then_steps.iter().enumerate().rev() {
                stack.push((path.then_step(i), s));
            }
            visited.push((path, step));
        }

        visited
    }
}

/// One unit of behavior inside an action.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Validate(ValidateStep),
    Insert(WriteStep),
    Update(WriteStep),
    Delete(WriteStep),
    Call(CallStep),
    Notify(NotifyStep),
    If(IfStep),
    Foreach(ForeachStep),
    RefreshTableView(RefreshStep),
    /// A step whose kind the frontend could not map.
    Unrecognized { kind: String },
}

impl Step {
    pub fn kind(&self) -> &str {
        match self {
            Step::Validate(_) => "validate",
            Step::Insert(_) => "insert",
            Step::Update(_) => "update",
            Step::Delete(_) => "delete",
            Step::Call(_) => "call",
            Step::Notify(_) => "notify",
            Step::If(_) => "if",
            Step::Foreach(_) => "foreach",
            Step::RefreshTableView(_) => "refresh_table_view",
            Step::Unrecognized { kind } => kind,
        }
    }

    /// Nested step sequences: (`then_steps`, `else_steps`).
    pub fn nested(&self) -> (&[Step], &[Step]) {
        match self {
            Step::If(step) => (step.then_steps.as_slice(), step.else_steps.as_slice()),
            Step::Foreach(step) => (step.then_steps.as_slice(), &[][..]),
            _ => (&[][..], &[][..]),
        }
    }

    pub fn validate(expression: &str, error: Option<&str>) -> Self {
        Step::Validate(ValidateStep {
            expression: Some(expression.to_string()),
            error: error.map(str::to_string),
        })
    }

    pub fn insert(entity: &str, fields: &[(&str, &str)]) -> Self {
        Step::Insert(WriteStep::new(Some(entity), fields))
    }

    pub fn update(entity: &str, fields: &[(&str, &str)]) -> Self {
        Step::Update(WriteStep::new(Some(entity), fields))
    }

    pub fn delete(entity: &str) -> Self {
        Step::Delete(WriteStep::new(Some(entity), &[]))
    }
}

/// `validate`: a boolean guard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidateStep {
    pub expression: Option<String>,
    /// Symbolic error code raised when the expression does not hold.
    pub error: Option<String>,
}

/// `insert` / `update` / `delete`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteStep {
    /// Target entity; `None` means the action's own entity.
    pub entity: Option<String>,
    /// Field name → value expression (insert/update only).
    pub fields: IndexMap<String, String>,
    pub where_clause: Option<String>,
}

impl WriteStep {
    pub fn new(entity: Option<&str>, fields: &[(&str, &str)]) -> Self {
        Self {
            entity: entity.map(str::to_string),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            where_clause: None,
        }
    }

    pub fn with_where(mut self, clause: &str) -> Self {
        self.where_clause = Some(clause.to_string());
        self
    }

    /// Target entity name, falling back to the action's own entity.
    pub fn target<'a>(&'a self, own_entity: &'a str) -> &'a str {
        self.entity.as_deref().unwrap_or(own_entity)
    }
}

/// `call`: invoke a stored function with keyword arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallStep {
    pub function_name: Option<String>,
    pub arguments: IndexMap<String, String>,
}

/// `notify`: emit a notification on a channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotifyStep {
    pub recipient: Option<String>,
    pub channel: Option<String>,
    pub message: Option<String>,
}

/// `refresh_table_view`: rebuild the projection rows the action touched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshStep {
    /// `self`, `propagate`, `related` or `batch`; absent means `self`.
    pub scope: Option<String>,
    /// Reference fields whose targets are refreshed too (`propagate` scope).
    pub propagate: Vec<String>,
    /// `immediate` or `deferred`; absent means `immediate`.
    pub strategy: Option<String>,
}

impl RefreshStep {
    pub fn new(scope: &str) -> Self {
        Self {
            scope: Some(scope.to_string()),
            ..Default::default()
        }
    }
}

/// `if`: structured conditional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IfStep {
    pub condition: Option<String>,
    pub then_steps: Vec<Step>,
    pub else_steps: Vec<Step>,
}

/// `foreach`: loop over a collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForeachStep {
    /// `"var in collection"` form.
    pub foreach_expr: Option<String>,
    pub iterator_var: Option<String>,
    pub collection: Option<String>,
    pub then_steps: Vec<Step>,
}

/// The resolved iterator variable and collection text of a foreach step.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeachBinding {
    pub iterator: String,
    pub collection: String,
}

/// Why a foreach step has no usable binding.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingError {
    /// Neither form present (or the explicit form is incomplete).
    Missing,
    /// Both `foreach_expr` and `iterator_var`/`collection` present.
    Conflicting,
    /// `foreach_expr` is not of the form `var in collection`.
    Malformed(String),
}

impl ForeachStep {
    pub fn binding(&self) -> Result<ForeachBinding, BindingError> {
        let explicit = self.iterator_var.is_some() || self.collection.is_some();
        match (&self.foreach_expr, explicit) {
            (Some(_), true) => Err(BindingError::Conflicting),
            (Some(expr), false) => parse_foreach_expr(expr),
            (None, true) => match (non_empty(&self.iterator_var), non_empty(&self.collection)) {
                (Some(iterator), Some(collection)) => Ok(ForeachBinding {
                    iterator: iterator.to_string(),
                    collection: collection.to_string(),
                }),
                _ => Err(BindingError::Missing),
            },
            (None, false) => Err(BindingError::Missing),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Splits `"item in related_orders"` at the first standalone `in`.
fn parse_foreach_expr(expr: &str) -> Result<ForeachBinding, BindingError> {
    let trimmed = expr.trim();
    let lower = trimmed.to_ascii_lowercase();
    let split = lower
        .find(" in ")
        .map(|pos| (&trimmed[..pos], &trimmed[pos + 4..]));

    match split {
        Some((iterator, collection))
            if !iterator.trim().is_empty() && !collection.trim().is_empty() =>
        {
            Ok(ForeachBinding {
                iterator: iterator.trim().to_string(),
                collection: collection.trim().to_string(),
            })
        }
        _ => Err(BindingError::Malformed(expr.to_string())),
    }
}

/// Path of a step inside an action, e.g. `steps[1].then_steps[0]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepPath(String);

impl StepPath {
    pub fn root(index: usize) -> Self {
        Self(format!("steps[{}]", index))
    }

    pub fn then_step(&self, index: usize) -> Self {
        Self(format!("{}.then_steps[{}]", self.0, index))
    }

    pub fn else_step(&self, index: usize) -> Self {
        Self(format!("{}.else_steps[{}]", self.0, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declarative impact metadata of an action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Impact {
    pub primary: EntityImpact,
    #[serde(default)]
    pub side_effects: Vec<EntityImpact>,
    #[serde(default)]
    pub cache_invalidations: Vec<CacheInvalidation>,
}

/// Impact of an action on one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityImpact {
    pub entity: String,
    /// CREATE, UPDATE or DELETE.
    pub operation: String,
    #[serde(default)]
    pub fields: Vec<String>,
    /// Relations worth inlining in the response payload.
    #[serde(default)]
    pub include_relations: Vec<String>,
    /// Response collection name for side effects (e.g., "createdNotifications").
    #[serde(default)]
    pub collection: Option<String>,
}

/// A client cache entry the action invalidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheInvalidation {
    pub query: String,
    #[serde(default)]
    pub filter: Option<serde_json::Value>,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default)]
    pub reason: String,
}

fn default_strategy() -> String {
    "REFETCH".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_foreach_expression() {
        let step = ForeachStep {
            foreach_expr: Some("item in related_orders".to_string()),
            ..Default::default()
        };
        let binding = step.binding().unwrap();
        assert_eq!(binding.iterator, "item");
        assert_eq!(binding.collection, "related_orders");
    }

    #[test]
    fn test_foreach_subquery_collection_keeps_inner_in() {
        let step = ForeachStep {
            foreach_expr: Some("o IN (SELECT * FROM crm.tb_order WHERE status IN ('a'))".to_string()),
            ..Default::default()
        };
        let binding = step.binding().unwrap();
        assert_eq!(binding.iterator, "o");
        assert_eq!(binding.collection, "(SELECT * FROM crm.tb_order WHERE status IN ('a'))");
    }

    #[test]
    fn test_foreach_binding_errors() {
        let malformed = ForeachStep {
            foreach_expr: Some("invalid_expression".to_string()),
            ..Default::default()
        };
        assert!(matches!(malformed.binding(), Err(BindingError::Malformed(_))));

        assert_eq!(ForeachStep::default().binding(), Err(BindingError::Missing));

        let conflicting = ForeachStep {
            foreach_expr: Some("a in b".to_string()),
            iterator_var: Some("a".to_string()),
            collection: Some("b".to_string()),
            ..Default::default()
        };
        assert_eq!(conflicting.binding(), Err(BindingError::Conflicting));
    }

    #[test]
    fn test_walk_is_pre_order() {
        let action = Action::new(
            "nested",
            vec![
                Step::If(IfStep {
                    condition: Some("true".to_string()),
                    then_steps: vec![Step::validate("a", None)],
                    else_steps: vec![Step::delete("Contact")],
                }),
                Step::update("Contact", &[]),
            ],
        );

        let paths: Vec<String> = action.walk().iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "steps[0]",
                "steps[0].then_steps[0]",
                "steps[0].else_steps[0]",
                "steps[1]",
            ]
        );
    }
}
