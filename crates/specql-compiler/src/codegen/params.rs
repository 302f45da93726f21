//! Parameter and declaration generation.
//!
//! Whether a function needs the entity identifier is derived from the step
//! kinds it contains, never from an explicit flag.

use indexmap::IndexMap;

use super::function::{Declaration, Param};
use super::sql_types::{column_type, param_type};
use crate::config::CompilerConfig;
use crate::diagnostic::{CompilerError, Location};
use crate::ir::{Action, Entity, Step};

/// What an action does to its own entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionShape {
    /// Inserts a row of its own entity.
    pub creating: bool,
    /// Operates on an existing row located by `p_<entity>_id`.
    pub existing_row: bool,
    /// Updates its own entity.
    pub updating: bool,
    /// Contains an explicit `refresh_table_view` step.
    pub refreshing: bool,
    /// Foreach iterator variables, in pre-order.
    pub loop_vars: Vec<String>,
}

impl ActionShape {
    pub fn analyze(action: &Action, entity: &Entity) -> Self {
        let own = |target: &Option<String>| target.as_deref().map_or(true, |t| t == entity.name);

        let mut shape = ActionShape::default();
        let mut reads_row = false;

        for (_, step) in action.walk() {
            match step {
                Step::Insert(write) if own(&write.entity) => shape.creating = true,
                Step::Update(write) if own(&write.entity) => {
                    shape.existing_row = true;
                    shape.updating = true;
                }
                Step::Delete(write) if own(&write.entity) => shape.existing_row = true,
                Step::Validate(_) => reads_row = true,
                Step::RefreshTableView(_) => {
                    reads_row = true;
                    shape.refreshing = true;
                }
                Step::Foreach(foreach) => {
                    if let Ok(binding) = foreach.binding() {
                        let over_relation = entity
                            .field(&binding.collection)
                            .is_some_and(|f| f.is_reverse_relation());
                        if over_relation {
                            shape.existing_row = true;
                        }
                        if !shape.loop_vars.contains(&binding.iterator) {
                            shape.loop_vars.push(binding.iterator);
                        }
                    }
                }
                _ => {}
            }
        }

        if reads_row && !shape.creating {
            shape.existing_row = true;
        }
        shape
    }

    /// Whether the success response must refresh the row's projection first:
    /// the entity keeps one, the action wrote the row and did not refresh it.
    pub fn needs_refresh(&self, entity: &Entity) -> bool {
        entity.table_views && (self.creating || self.updating) && !self.refreshing
    }

    /// Variable holding the internal key of the action's row, if any.
    pub fn key_variable(&self) -> Option<&'static str> {
        if self.existing_row {
            Some("v_pk")
        } else if self.creating {
            Some("v_created_pk")
        } else {
            None
        }
    }
}

/// Derives the formal parameters and local declarations of an action.
pub struct ParameterGenerator<'a> {
    config: &'a CompilerConfig,
}

impl<'a> ParameterGenerator<'a> {
    pub fn new(config: &'a CompilerConfig) -> Self {
        Self { config }
    }

    /// `referenced` lists entity fields read as `v_<field>` variables.
    pub fn generate(
        &self,
        entity: &Entity,
        shape: &ActionShape,
        referenced: &[String],
        location: &Location,
    ) -> Result<(Vec<Param>, Vec<Declaration>), CompilerError> {
        Ok((
            self.parameters(entity, shape, location)?,
            self.declarations(entity, shape, referenced, location)?,
        ))
    }

    pub fn parameters(
        &self,
        entity: &Entity,
        shape: &ActionShape,
        location: &Location,
    ) -> Result<Vec<Param>, CompilerError> {
        let mut params = Vec::new();
        if shape.existing_row {
            params.push(Param::required(entity.id_param(), "UUID"));
        }
        for field in entity.column_fields() {
            params.push(Param::optional(field.param(), param_type(field)));
        }
        params.push(Param::optional("p_caller_id", "UUID"));

        let mut seen = std::collections::HashSet::new();
        for param in &params {
            if !seen.insert(param.name.as_str()) {
                return Err(CompilerError::DuplicateParameter {
                    location: location.clone(),
                    name: param.name.clone(),
                });
            }
        }
        Ok(params)
    }

    pub fn declarations(
        &self,
        entity: &Entity,
        shape: &ActionShape,
        referenced: &[String],
        location: &Location,
    ) -> Result<Vec<Declaration>, CompilerError> {
        let mut decls: IndexMap<String, String> = IndexMap::new();
        let mut declare = |name: String, sql_type: &str| -> Result<(), CompilerError> {
            match decls.get(&name) {
                Some(existing) if existing != sql_type => Err(CompilerError::DuplicateParameter {
                    location: location.clone(),
                    name,
                }),
                Some(_) => Ok(()),
                None => {
                    decls.insert(name, sql_type.to_string());
                    Ok(())
                }
            }
        };

        declare("v_result".to_string(), &self.config.result_type)?;
        if shape.existing_row {
            declare("v_pk".to_string(), "INTEGER")?;
        }
        if shape.creating {
            declare("v_created_pk".to_string(), "INTEGER")?;
        }
        for field in entity.column_fields().filter(|f| referenced.contains(&f.name)) {
            declare(field.variable(), column_type(field.type_name))?;
        }
        for var in &shape.loop_vars {
            declare(var.clone(), "RECORD")?;
        }

        Ok(decls
            .into_iter()
            .map(|(name, sql_type)| Declaration::new(name, sql_type))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FieldDefinition, FieldType, ForeachStep};

    fn contact() -> Entity {
        Entity::new("Contact", "crm")
            .with_field(FieldDefinition::new("email", FieldType::Text))
            .with_field(FieldDefinition::new("status", FieldType::Text))
            .with_field(FieldDefinition::reference("company", "Company"))
            .with_field(FieldDefinition::reverse("orders", "Order"))
    }

    fn location() -> Location {
        Location::new("Contact", "test")
    }

    fn names(params: &[Param]) -> Vec<&str> {
        params.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_insert_only_action_has_no_id_param() {
        let action = Action::new(
            "create_contact",
            vec![
                Step::validate("email IS NOT NULL", Some("missing_email")),
                Step::insert("Contact", &[("email", "input.email")]),
            ],
        );
        let shape = ActionShape::analyze(&action, &contact());
        assert!(shape.creating);
        assert!(!shape.existing_row);
        assert_eq!(shape.key_variable(), Some("v_created_pk"));

        let config = CompilerConfig::default();
        let (params, decls) = ParameterGenerator::new(&config)
            .generate(&contact(), &shape, &["email".to_string()], &location())
            .unwrap();
        assert_eq!(
            names(&params),
            vec!["p_email", "p_status", "p_company_id", "p_caller_id"]
        );
        assert!(params.iter().all(|p| p.default.is_some()));
        assert!(!decls.iter().any(|d| d.name == "v_pk"));
        assert!(decls.iter().any(|d| d.name == "v_email" && d.sql_type == "TEXT"));
    }

    #[test]
    fn test_update_requires_entity_id() {
        let action = Action::new("qualify_lead", vec![Step::update("Contact", &[("status", "qualified")])]);
        let shape = ActionShape::analyze(&action, &contact());
        assert!(shape.existing_row);

        let config = CompilerConfig::default();
        let (params, decls) = ParameterGenerator::new(&config)
            .generate(&contact(), &shape, &[], &location())
            .unwrap();
        assert_eq!(params[0], Param::required("p_contact_id", "UUID"));
        assert_eq!(params.last().map(|p| p.name.as_str()), Some("p_caller_id"));
        assert_eq!(decls[0], Declaration::new("v_result", "app.mutation_result"));
        assert_eq!(decls[1], Declaration::new("v_pk", "INTEGER"));
    }

    #[test]
    fn test_validate_without_insert_requires_entity_id() {
        let action = Action::new("check", vec![Step::validate("status = 'lead'", None)]);
        assert!(ActionShape::analyze(&action, &contact()).existing_row);
    }

    #[test]
    fn test_projection_refresh_needed_after_own_writes() {
        let projected = contact().with_table_views(true);
        let update = Action::new("qualify", vec![Step::update("Contact", &[("status", "qualified")])]);
        let shape = ActionShape::analyze(&update, &projected);
        assert!(shape.updating);
        assert!(shape.needs_refresh(&projected));
        assert!(!shape.needs_refresh(&contact()));

        let check = Action::new("check", vec![Step::validate("status = 'lead'", None)]);
        assert!(!ActionShape::analyze(&check, &projected).needs_refresh(&projected));

        let explicit = Action::new(
            "qualify",
            vec![
                Step::update("Contact", &[("status", "qualified")]),
                Step::RefreshTableView(crate::ir::RefreshStep::new("related")),
            ],
        );
        assert!(!ActionShape::analyze(&explicit, &projected).needs_refresh(&projected));
    }

    #[test]
    fn test_update_of_other_entity_does_not_require_entity_id() {
        let action = Action::new(
            "close_orders",
            vec![Step::Update(
                crate::ir::WriteStep::new(Some("Order"), &[("status", "closed")]).with_where("status = 'open'"),
            )],
        );
        assert!(!ActionShape::analyze(&action, &contact()).existing_row);
    }

    #[test]
    fn test_foreach_over_relation_declares_record() {
        let action = Action::new(
            "touch_orders",
            vec![Step::Foreach(ForeachStep {
                foreach_expr: Some("o in orders".to_string()),
                then_steps: vec![Step::validate("o.total > 0", None)],
                ..Default::default()
            })],
        );
        let shape = ActionShape::analyze(&action, &contact());
        assert!(shape.existing_row);
        assert_eq!(shape.loop_vars, vec!["o"]);

        let config = CompilerConfig::default();
        let decls = ParameterGenerator::new(&config)
            .declarations(&contact(), &shape, &[], &location())
            .unwrap();
        assert!(decls.contains(&Declaration::new("o", "RECORD")));
    }

    #[test]
    fn test_parameter_collision() {
        let entity = contact().with_field(FieldDefinition::reference("caller", "User"));
        let shape = ActionShape::default();
        let config = CompilerConfig::default();
        let err = ParameterGenerator::new(&config)
            .parameters(&entity, &shape, &location())
            .unwrap_err();
        assert!(matches!(err, CompilerError::DuplicateParameter { ref name, .. } if name == "p_caller_id"));
    }

    #[test]
    fn test_loop_var_clashing_with_local_is_rejected() {
        let shape = ActionShape {
            existing_row: true,
            loop_vars: vec!["v_pk".to_string()],
            ..Default::default()
        };
        let config = CompilerConfig::default();
        let err = ParameterGenerator::new(&config)
            .declarations(&contact(), &shape, &[], &location())
            .unwrap_err();
        assert!(matches!(err, CompilerError::DuplicateParameter { .. }));
    }
}
