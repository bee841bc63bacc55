//! Declared entity model
//!
//! The declared model is the source of truth for one table per entity. It is
//! loaded by an external registry and only read by the engine.

use crate::error::ModelError;
use crate::identifier::validate_identifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Abstract field kind
///
/// Serialized with the vocabulary used by model files (`uuid`, `string`,
/// `manyToOne`, ...). Any other name is kept as [`FieldKind::Other`] and is
/// stored as TEXT.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldKind {
    /// UUID identifier
    Identifier,

    /// Bounded text (VARCHAR)
    ShortText,

    /// Email address, stored like short text
    Email,

    /// Unbounded text
    LongText,

    Boolean,

    Integer,

    LongInteger,

    /// Timestamp with time zone
    Timestamp,

    Date,

    /// Foreign key column pointing at another entity
    ManyToOne,

    /// Inverse side of a many-to-one, no column on the owning table
    OneToMany,

    /// Association through a junction table, no column on the owning table
    ManyToMany,

    /// Unrecognized kind name
    Other(String),
}

impl FieldKind {
    /// Every recognized kind, in declaration order
    pub const KNOWN: [FieldKind; 12] = [
        FieldKind::Identifier,
        FieldKind::ShortText,
        FieldKind::Email,
        FieldKind::LongText,
        FieldKind::Boolean,
        FieldKind::Integer,
        FieldKind::LongInteger,
        FieldKind::Timestamp,
        FieldKind::Date,
        FieldKind::ManyToOne,
        FieldKind::OneToMany,
        FieldKind::ManyToMany,
    ];

    /// Parse a kind name as written in model files
    pub fn parse(name: &str) -> Self {
        match name {
            "uuid" => Self::Identifier,
            "string" => Self::ShortText,
            "email" => Self::Email,
            "text" => Self::LongText,
            "boolean" => Self::Boolean,
            "integer" => Self::Integer,
            "long" => Self::LongInteger,
            "timestamp" => Self::Timestamp,
            "date" => Self::Date,
            "manyToOne" => Self::ManyToOne,
            "oneToMany" => Self::OneToMany,
            "manyToMany" => Self::ManyToMany,
            other => Self::Other(other.to_string()),
        }
    }

    /// Kind name as written in model files
    pub fn as_str(&self) -> &str {
        match self {
            Self::Identifier => "uuid",
            Self::ShortText => "string",
            Self::Email => "email",
            Self::LongText => "text",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::LongInteger => "long",
            Self::Timestamp => "timestamp",
            Self::Date => "date",
            Self::ManyToOne => "manyToOne",
            Self::OneToMany => "oneToMany",
            Self::ManyToMany => "manyToMany",
            Self::Other(name) => name,
        }
    }

    /// True for the three relationship kinds
    pub fn is_relationship(&self) -> bool {
        matches!(self, Self::ManyToOne | Self::OneToMany | Self::ManyToMany)
    }

    /// True for relationship collections, which never own a column
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }

    /// Whether a field of this kind is backed by a column on the owning table
    pub fn has_column(&self) -> bool {
        !self.is_collection()
    }
}

impl From<String> for FieldKind {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<FieldKind> for String {
    fn from(kind: FieldKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Referential action for a foreign key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CascadeRule {
    Cascade,
    SetNull,
    Restrict,
    NoAction,
}

impl CascadeRule {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::Restrict => "RESTRICT",
            Self::NoAction => "NO ACTION",
        }
    }
}

/// Relationship metadata carried by relationship fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// Name of the target entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_entity: Option<String>,

    /// Junction table for many-to-many
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_table: Option<String>,

    /// Junction column pointing back at the owning entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_column: Option<String>,

    /// Junction column pointing at the target entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse_join_column: Option<String>,

    /// Inverse field on the target entity (one-to-many)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<CascadeRule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<CascadeRule>,
}

/// One declared field of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredField {
    /// Field name, also the column name
    pub name: String,

    /// Abstract kind
    #[serde(rename = "type")]
    pub kind: FieldKind,

    #[serde(default)]
    pub primary_key: bool,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub unique: bool,

    /// Value produced by the database (random UUID, current timestamp)
    #[serde(default)]
    pub generated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,

    /// Declared default, rendered by the type mapper
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_default_value"
    )]
    pub default_value: Option<String>,

    #[serde(flatten)]
    pub relation: Relationship,
}

/// Accept string, boolean and numeric literals for `defaultValue`
fn deserialize_default_value<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

impl DeclaredField {
    /// Create an optional, non-unique field
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            primary_key: false,
            required: false,
            unique: false,
            generated: false,
            max_length: None,
            default_value: None,
            relation: Relationship::default(),
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Point a many-to-one or collection field at a target entity
    pub fn references(mut self, target_entity: impl Into<String>) -> Self {
        self.relation.target_entity = Some(target_entity.into());
        self
    }

    /// Configure the junction table of a many-to-many field
    pub fn with_join_table(
        mut self,
        join_table: impl Into<String>,
        join_column: impl Into<String>,
        inverse_join_column: impl Into<String>,
    ) -> Self {
        self.relation.join_table = Some(join_table.into());
        self.relation.join_column = Some(join_column.into());
        self.relation.inverse_join_column = Some(inverse_join_column.into());
        self
    }

    pub fn on_delete(mut self, rule: CascadeRule) -> Self {
        self.relation.on_delete = Some(rule);
        self
    }

    pub fn on_update(mut self, rule: CascadeRule) -> Self {
        self.relation.on_update = Some(rule);
        self
    }

    /// Whether this field is backed by a column on the owning table
    pub fn has_column(&self) -> bool {
        self.kind.has_column()
    }

    /// Whether the database supplies a value when none is given
    ///
    /// Generated identifiers and timestamps count as defaulted.
    pub fn has_default(&self) -> bool {
        self.default_value.is_some()
            || (self.generated && matches!(self.kind, FieldKind::Identifier | FieldKind::Timestamp))
    }

    /// Expected column nullability: NOT (required AND no default)
    pub fn expected_nullable(&self) -> bool {
        !(self.required && !self.has_default())
    }
}

/// A declared entity, backed by one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredEntity {
    /// Entity name (registry key)
    #[serde(alias = "entity")]
    pub name: String,

    /// Backing table
    pub table: String,

    /// Identifier field, `id` unless declared otherwise
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Optimistic-locking version counter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_field: Option<String>,

    /// Tenant discriminator column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_field: Option<String>,

    /// Fields in declaration order
    #[serde(default)]
    pub fields: Vec<DeclaredField>,
}

fn default_id_field() -> String {
    "id".to_string()
}

impl DeclaredEntity {
    /// Create an entity with no fields and `id` as identifier
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            id_field: default_id_field(),
            version_field: None,
            tenant_field: None,
            fields: Vec::new(),
        }
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn with_version_field(mut self, version_field: impl Into<String>) -> Self {
        self.version_field = Some(version_field.into());
        self
    }

    pub fn with_tenant_field(mut self, tenant_field: impl Into<String>) -> Self {
        self.tenant_field = Some(tenant_field.into());
        self
    }

    pub fn with_field(mut self, field: DeclaredField) -> Self {
        self.fields.push(field);
        self
    }

    /// Fields backed by a column, in declaration order
    pub fn column_fields(&self) -> impl Iterator<Item = &DeclaredField> {
        self.fields.iter().filter(|f| f.has_column())
    }

    /// Find a column-backed field by name, case-insensitively
    pub fn find_column_field(&self, column: &str) -> Option<&DeclaredField> {
        self.column_fields()
            .find(|f| f.name.eq_ignore_ascii_case(column))
    }

    /// Whether the field is this entity's identifier
    pub fn is_id_field(&self, field: &DeclaredField) -> bool {
        field.primary_key || field.name.eq_ignore_ascii_case(&self.id_field)
    }

    /// Column-backed key fields, in declaration order
    pub fn key_fields(&self) -> impl Iterator<Item = &DeclaredField> {
        self.column_fields().filter(|f| self.is_id_field(f))
    }

    /// More than one column makes up the primary key
    pub fn has_composite_key(&self) -> bool {
        self.key_fields().nth(1).is_some()
    }

    /// Many-to-many fields, in declaration order
    pub fn many_to_many_fields(&self) -> impl Iterator<Item = &DeclaredField> {
        self.fields
            .iter()
            .filter(|f| f.kind == FieldKind::ManyToMany)
    }

    /// Entity names this entity references through many-to-one columns
    pub fn referenced_entities(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.kind == FieldKind::ManyToOne)
            .filter_map(|f| f.relation.target_entity.as_deref())
            .collect()
    }

    /// Check every name that ends up in DDL and every many-to-one target
    pub fn validate(&self, model: &EntityModel) -> Result<(), ModelError> {
        validate_identifier(&self.table)?;
        validate_identifier(&self.id_field)?;

        if let Some(version) = &self.version_field {
            validate_identifier(version)?;
        }
        if let Some(tenant) = &self.tenant_field {
            validate_identifier(tenant)?;
        }

        for field in &self.fields {
            if field.has_column() {
                validate_identifier(&field.name)?;
            }

            match field.kind {
                FieldKind::ManyToOne => {
                    let target = field.relation.target_entity.as_deref().ok_or_else(|| {
                        ModelError::MissingTargetEntity {
                            entity: self.name.clone(),
                            field: field.name.clone(),
                        }
                    })?;
                    if !model.contains_key(target) {
                        return Err(ModelError::UnknownTargetEntity {
                            entity: self.name.clone(),
                            field: field.name.clone(),
                            target: target.to_string(),
                        });
                    }
                }
                FieldKind::ManyToMany => {
                    let relation = &field.relation;
                    for name in [
                        &relation.join_table,
                        &relation.join_column,
                        &relation.inverse_join_column,
                    ]
                    .into_iter()
                    .flatten()
                    {
                        validate_identifier(name)?;
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Snapshot of the declared model, keyed by entity name
pub type EntityModel = BTreeMap<String, DeclaredEntity>;

/// Build a model snapshot from a list of entities
pub fn model_from_entities(entities: impl IntoIterator<Item = DeclaredEntity>) -> EntityModel {
    entities
        .into_iter()
        .map(|entity| (entity.name.clone(), entity))
        .collect()
}

/// Parse a JSON array of entities into a model snapshot
pub fn model_from_json(json: &str) -> Result<EntityModel, ModelError> {
    let entities: Vec<DeclaredEntity> =
        serde_json::from_str(json).map_err(|e| ModelError::LoadError(e.to_string()))?;
    Ok(model_from_entities(entities))
}

/// Source of declared entities
///
/// Implementations own loading and hot reload. The engine only ever reads a
/// snapshot returned by [`EntityRegistry::get_all_entities`].
pub trait EntityRegistry {
    /// Current snapshot of all entities
    fn get_all_entities(&self) -> EntityModel;

    /// Re-read entity definitions from their source
    fn reload(&mut self) -> Result<(), ModelError>;
}
