//! Intermediate representation of the SpecQL business-logic DSL.
//!
//! This IR is produced by frontends (YAML today) and consumed by the
//! validator and the code generators. It is fully deserialized: no raw
//! text parsing happens past this point except for expressions, which the
//! expression compiler owns.

mod action;
mod entity;

pub use action::{
    Action, BindingError, CacheInvalidation, CallStep, EntityImpact, ForeachBinding,
    ForeachStep, IfStep, Impact, NotifyStep, RefreshStep, Step, StepPath, ValidateStep,
    WriteStep,
};
pub use entity::{Entity, FieldDefinition, FieldType};

/// An entity together with the actions declared on it.
#[derive(Debug, Clone)]
pub struct EntityDefinition {
    pub entity: Entity,
    pub actions: Vec<Action>,
}

/// Every entity loaded for one compilation run.
#[derive(Debug, Default)]
pub struct DomainIR {
    pub entities: Vec<EntityDefinition>,
}

impl DomainIR {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entity schemas only, used to resolve cross-entity step targets.
    pub fn known_entities(&self) -> Vec<Entity> {
        self.entities.iter().map(|d| d.entity.clone()).collect()
    }

    pub fn action_count(&self) -> usize {
        self.entities.iter().map(|d| d.actions.len()).sum()
    }
}
