//! Entity schema model.
//!
//! Entities are consumed, never built, by the action compiler. Field order is
//! significant: it drives parameter order, hydration order and the column
//! order of generated statements.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::codegen::sql_types::to_snake_case;

/// A schema-qualified record type with an ordered field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity name in PascalCase (e.g., "Contact").
    pub name: String,

    /// Logical namespace (database schema).
    pub schema: String,

    /// Fields keyed by name, in declaration order.
    pub fields: IndexMap<String, FieldDefinition>,

    #[serde(default)]
    pub description: Option<String>,

    /// Whether the entity maintains a denormalized `tv_` projection.
    #[serde(default)]
    pub table_views: bool,
}

impl Entity {
    pub fn new(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            fields: IndexMap::new(),
            description: None,
            table_views: false,
        }
    }

    /// Builder-style helper used by frontends and tests.
    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn with_table_views(mut self, enabled: bool) -> Self {
        self.table_views = enabled;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    pub fn snake_name(&self) -> String {
        to_snake_case(&self.name)
    }

    /// Base table, e.g. `crm.tb_contact`.
    pub fn table(&self) -> String {
        format!("{}.tb_{}", self.schema, self.snake_name())
    }

    /// Denormalized projection table, e.g. `crm.tv_contact`.
    pub fn projection_table(&self) -> String {
        format!("{}.tv_{}", self.schema, self.snake_name())
    }

    /// Function rebuilding one row of the projection, e.g. `crm.refresh_tv_contact`.
    pub fn refresh_function(&self) -> String {
        format!("{}.refresh_tv_{}", self.schema, self.snake_name())
    }

    /// Fields of this entity that reference `target`.
    pub fn references_to<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a FieldDefinition> {
        self.fields
            .values()
            .filter(move |f| f.is_reference() && f.reference_entity.as_deref() == Some(target))
    }

    /// Internal key column, e.g. `pk_contact`.
    pub fn pk_column(&self) -> String {
        format!("pk_{}", self.snake_name())
    }

    /// Foreign-key column other tables use to point at this entity.
    pub fn fk_column(&self) -> String {
        format!("fk_{}", self.snake_name())
    }

    /// External identifier parameter, e.g. `p_contact_id`.
    pub fn id_param(&self) -> String {
        format!("p_{}_id", self.snake_name())
    }

    /// Fields stored as columns on the base table (everything except reverse relations).
    pub fn column_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values().filter(|f| f.type_name != FieldType::List)
    }
}

/// A single field of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,

    #[serde(rename = "type")]
    pub type_name: FieldType,

    #[serde(default = "default_nullable")]
    pub nullable: bool,

    #[serde(default)]
    pub default: Option<String>,

    /// Referenced entity for `ref` fields, child entity for `list` fields.
    #[serde(default)]
    pub reference_entity: Option<String>,

    /// Schema of the referenced entity; defaults to the owner's schema.
    #[serde(default)]
    pub reference_schema: Option<String>,
}

fn default_nullable() -> bool {
    true
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, type_name: FieldType) -> Self {
        Self {
            name: name.into(),
            type_name,
            nullable: true,
            default: None,
            reference_entity: None,
            reference_schema: None,
        }
    }

    /// A `ref` field pointing at `entity`.
    pub fn reference(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            reference_entity: Some(entity.into()),
            ..Self::new(name, FieldType::Ref)
        }
    }

    /// A reverse relation (one-to-many) onto `entity`.
    pub fn reverse(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            reference_entity: Some(entity.into()),
            ..Self::new(name, FieldType::List)
        }
    }

    pub fn is_reference(&self) -> bool {
        self.type_name == FieldType::Ref
    }

    pub fn is_reverse_relation(&self) -> bool {
        self.type_name == FieldType::List
    }

    /// Column holding this field on the owner's base table.
    pub fn column(&self) -> String {
        if self.is_reference() {
            format!("fk_{}", self.name)
        } else {
            self.name.clone()
        }
    }

    /// Input parameter carrying this field's value.
    pub fn param(&self) -> String {
        if self.is_reference() {
            format!("p_{}_id", self.name)
        } else {
            format!("p_{}", self.name)
        }
    }

    /// Local variable mirroring this field inside generated functions.
    pub fn variable(&self) -> String {
        format!("v_{}", self.name)
    }

    /// Referenced entity table, e.g. `crm.tb_company`.
    pub fn reference_table(&self, owner_schema: &str) -> Option<String> {
        let entity = self.reference_entity.as_deref()?;
        let schema = self.reference_schema.as_deref().unwrap_or(owner_schema);
        Some(format!("{}.tb_{}", schema, to_snake_case(entity)))
    }

    /// Internal key column of the referenced entity, e.g. `pk_company`.
    pub fn reference_pk_column(&self) -> Option<String> {
        self.reference_entity
            .as_deref()
            .map(|entity| format!("pk_{}", to_snake_case(entity)))
    }
}

/// The fixed field type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Integer,
    Bigint,
    Boolean,
    Timestamp,
    Date,
    Time,
    Jsonb,
    Uuid,
    Decimal,
    /// Foreign key to another entity.
    Ref,
    /// Reverse relation; not a column.
    List,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Bigint => "bigint",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamp",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::Jsonb => "jsonb",
            FieldType::Uuid => "uuid",
            FieldType::Decimal => "decimal",
            FieldType::Ref => "ref",
            FieldType::List => "list",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    /// Parses a type name, accepting the rich-type aliases of the DSL.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let typ = match s.trim().to_ascii_lowercase().as_str() {
            "text" | "string" | "email" | "url" | "phone" | "slug" | "markdown" => FieldType::Text,
            "integer" | "int" => FieldType::Integer,
            "bigint" => FieldType::Bigint,
            "boolean" | "bool" => FieldType::Boolean,
            "timestamp" | "datetime" => FieldType::Timestamp,
            "date" => FieldType::Date,
            "time" => FieldType::Time,
            "jsonb" | "json" => FieldType::Jsonb,
            "uuid" => FieldType::Uuid,
            "decimal" | "numeric" | "money" => FieldType::Decimal,
            "ref" => FieldType::Ref,
            "list" => FieldType::List,
            other => return Err(format!("unknown field type '{}'", other)),
        };
        Ok(typ)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> Entity {
        Entity::new("Contact", "crm")
            .with_field(FieldDefinition::new("email", FieldType::Text))
            .with_field(FieldDefinition::reference("company", "Company"))
            .with_field(FieldDefinition::reverse("orders", "Order"))
    }

    #[test]
    fn test_trinity_naming() {
        let entity = Entity::new("MachineItem", "inventory");
        assert_eq!(entity.table(), "inventory.tb_machine_item");
        assert_eq!(entity.projection_table(), "inventory.tv_machine_item");
        assert_eq!(entity.pk_column(), "pk_machine_item");
        assert_eq!(entity.id_param(), "p_machine_item_id");
    }

    #[test]
    fn test_reference_field_naming() {
        let entity = contact();
        let company = entity.field("company").unwrap();
        assert_eq!(company.column(), "fk_company");
        assert_eq!(company.param(), "p_company_id");
        assert_eq!(company.reference_table("crm").as_deref(), Some("crm.tb_company"));
        assert_eq!(company.reference_pk_column().as_deref(), Some("pk_company"));
    }

    #[test]
    fn test_column_fields_skip_reverse_relations() {
        let entity = contact();
        let columns: Vec<_> = entity.column_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(columns, vec!["email", "company"]);
    }

    #[test]
    fn test_type_aliases() {
        assert_eq!("email".parse::<FieldType>(), Ok(FieldType::Text));
        assert_eq!("money".parse::<FieldType>(), Ok(FieldType::Decimal));
        assert_eq!("DateTime".parse::<FieldType>(), Ok(FieldType::Timestamp));
        assert!("geometry".parse::<FieldType>().is_err());
    }
}
