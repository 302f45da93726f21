//! Structural checks: names, step kinds, entity and field references and
//! per-kind required attributes.

use crate::codegen::sql_types::is_identifier;
use crate::config::CompilerConfig;
use crate::diagnostic::{CompilerError, Location};
use crate::ir::{Action, BindingError, Entity, Step, WriteStep};

/// `^[a-z][a-z0-9_]*$`
pub fn is_action_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {
            chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        _ => false,
    }
}

/// Collects every structural error of the action.
pub fn check(
    action: &Action,
    entity: &Entity,
    known: &[Entity],
    config: &CompilerConfig,
    location: &Location,
) -> Vec<CompilerError> {
    let mut errors = Vec::new();

    if !is_action_name(&action.name) {
        errors.push(CompilerError::InvalidActionName {
            location: location.clone(),
            name: action.name.clone(),
        });
    }
    if action.steps.is_empty() {
        errors.push(CompilerError::EmptyAction {
            location: location.clone(),
        });
    }

    let checker = StepChecker {
        entity,
        known,
        config,
    };
    for (path, step) in action.walk() {
        checker.check(step, &location.at(path), &mut errors);
    }
    errors
}

struct StepChecker<'a> {
    entity: &'a Entity,
    known: &'a [Entity],
    config: &'a CompilerConfig,
}

impl StepChecker<'_> {
    fn check(&self, step: &Step, location: &Location, errors: &mut Vec<CompilerError>) {
        let mut require = |value: &Option<String>, kind: &str, attribute: &str| {
            if blank(value) {
                errors.push(CompilerError::missing(location, kind, attribute));
            }
        };

        match step {
            Step::Validate(s) => require(&s.expression, "validate", "an expression"),
            Step::Call(s) => require(&s.function_name, "call", "a function_name"),
            Step::Notify(s) => {
                require(&s.recipient, "notify", "a recipient");
                require(&s.channel, "notify", "a channel");
                if let Some(channel) = s.channel.as_deref().filter(|c| !c.trim().is_empty()) {
                    if !self.config.is_channel(channel) {
                        errors.push(CompilerError::InvalidChannel {
                            location: location.clone(),
                            channel: channel.to_string(),
                            allowed: self.config.channels.clone(),
                        });
                    }
                }
            }
            Step::If(s) => {
                require(&s.condition, "if", "a condition");
                if s.then_steps.is_empty() {
                    errors.push(CompilerError::missing(location, "if", "then_steps"));
                }
            }
            Step::Foreach(s) => {
                match s.binding() {
                    Ok(binding) if !is_identifier(&binding.iterator) => {
                        errors.push(CompilerError::invalid(
                            location,
                            "iterator_var",
                            format!("'{}' is not a variable name", binding.iterator),
                        ));
                    }
                    Ok(_) => {}
                    Err(BindingError::Missing) => errors.push(CompilerError::missing(
                        location,
                        "foreach",
                        "foreach_expr or iterator_var",
                    )),
                    Err(BindingError::Conflicting) => errors.push(CompilerError::invalid(
                        location,
                        "foreach_expr",
                        "use either foreach_expr or iterator_var/collection, not both",
                    )),
                    Err(BindingError::Malformed(expr)) => errors.push(CompilerError::invalid(
                        location,
                        "foreach_expr",
                        format!("'{}' is not of the form 'var in collection'", expr),
                    )),
                }
                if s.then_steps.is_empty() {
                    errors.push(CompilerError::missing(location, "foreach", "then_steps"));
                }
            }
            Step::RefreshTableView(s) => {
                if s.scope.as_deref().map(str::trim) == Some("propagate") && s.propagate.is_empty() {
                    errors.push(CompilerError::missing(location, "refresh_table_view", "propagate"));
                }
                for name in &s.propagate {
                    if !self.entity.field(name).is_some_and(|f| f.is_reference()) {
                        errors.push(CompilerError::invalid(
                            location,
                            "propagate",
                            format!("'{}' is not a reference field of {}", name, self.entity.name),
                        ));
                    }
                }
            }
            Step::Insert(s) => self.check_write(s, "insert", location, errors),
            Step::Update(s) => self.check_write(s, "update", location, errors),
            Step::Delete(s) => self.check_write(s, "delete", location, errors),
            Step::Unrecognized { kind } => errors.push(CompilerError::UnknownStepKind {
                location: location.clone(),
                kind: kind.clone(),
            }),
        }
    }

    fn check_write(
        &self,
        step: &WriteStep,
        kind: &str,
        location: &Location,
        errors: &mut Vec<CompilerError>,
    ) {
        let name = step.target(&self.entity.name);
        let target = if name == self.entity.name {
            Some(self.entity)
        } else {
            self.known.iter().find(|e| e.name == name)
        };
        let Some(target) = target else {
            errors.push(CompilerError::UnknownEntity {
                location: location.clone(),
                entity: name.to_string(),
            });
            return;
        };
        let own = target.name == self.entity.name;

        for field in step.fields.keys() {
            let is_column = target.field(field).is_some_and(|f| !f.is_reverse_relation());
            if !is_column {
                errors.push(CompilerError::UnknownField {
                    location: location.clone(),
                    entity: target.name.clone(),
                    field: field.clone(),
                });
            }
        }

        match kind {
            "insert" if step.fields.is_empty() && !own => {
                errors.push(CompilerError::missing(location, kind, "fields"));
            }
            "update" if step.fields.is_empty() => {
                errors.push(CompilerError::missing(location, kind, "fields"));
            }
            "delete" if !step.fields.is_empty() => {
                errors.push(CompilerError::invalid(
                    location,
                    "fields",
                    "delete steps do not take fields",
                ));
            }
            _ => {}
        }
        if kind != "insert" && !own && blank(&step.where_clause) {
            errors.push(CompilerError::missing(location, kind, "a where_clause"));
        }
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
