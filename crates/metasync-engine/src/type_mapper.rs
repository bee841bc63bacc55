//! Abstract field kinds to concrete PostgreSQL column types
//!
//! Everything here is a pure function of the declared field. Column
//! definitions are shared by `CREATE TABLE` and `ADD COLUMN` so both paths
//! produce the same column.

use metasync_core::{DeclaredEntity, DeclaredField, EntityModel, FieldKind};

/// Length used for short text without a declared `maxLength`
pub const DEFAULT_VARCHAR_LENGTH: u32 = 255;

/// Sentinel default that asks the database for a random UUID
pub const RANDOM_UUID: &str = "gen_random_uuid()";

/// Concrete column type for a field, `None` for relationship collections
///
/// Unknown kinds fall back to TEXT with a warning.
pub fn map_type(field: &DeclaredField) -> Option<String> {
    let sql_type = match &field.kind {
        FieldKind::Identifier => "UUID".to_string(),
        FieldKind::ShortText | FieldKind::Email => format!(
            "VARCHAR({})",
            field.max_length.unwrap_or(DEFAULT_VARCHAR_LENGTH)
        ),
        FieldKind::LongText => "TEXT".to_string(),
        FieldKind::Boolean => "BOOLEAN".to_string(),
        FieldKind::Integer => "INTEGER".to_string(),
        FieldKind::LongInteger => "BIGINT".to_string(),
        FieldKind::Timestamp => "TIMESTAMPTZ".to_string(),
        FieldKind::Date => "DATE".to_string(),
        FieldKind::ManyToOne => "UUID".to_string(),
        FieldKind::OneToMany | FieldKind::ManyToMany => return None,
        FieldKind::Other(name) => {
            tracing::warn!(field = %field.name, kind = %name, "Unknown field type, using TEXT");
            "TEXT".to_string()
        }
    };
    Some(sql_type)
}

/// Render the effective default of a field as an SQL expression
///
/// A declared default wins. Without one, generated identifiers default to a
/// random UUID and generated timestamps to `NOW()`.
pub fn format_default_value(field: &DeclaredField) -> Option<String> {
    let Some(value) = field.default_value.as_deref() else {
        return match field.kind {
            FieldKind::Identifier if field.generated => Some(RANDOM_UUID.to_string()),
            FieldKind::Timestamp if field.generated => Some("NOW()".to_string()),
            _ => None,
        };
    };

    let rendered = match &field.kind {
        FieldKind::ShortText | FieldKind::Email | FieldKind::LongText => quote_literal(value),
        FieldKind::Boolean => value.to_uppercase(),
        FieldKind::Integer | FieldKind::LongInteger => value.to_string(),
        FieldKind::Timestamp => "NOW()".to_string(),
        FieldKind::Identifier if value.eq_ignore_ascii_case(RANDOM_UUID) => RANDOM_UUID.to_string(),
        FieldKind::Identifier
        | FieldKind::Date
        | FieldKind::ManyToOne
        | FieldKind::Other(_) => quote_literal(value),
        FieldKind::OneToMany | FieldKind::ManyToMany => return None,
    };
    Some(rendered)
}

/// Single-quote a literal, doubling embedded quotes
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Full column definition used by `CREATE TABLE` and `ADD COLUMN`
///
/// `name TYPE [PRIMARY KEY] [NOT NULL] [DEFAULT expr] [REFERENCES t(id) ...]`.
/// The column-level `PRIMARY KEY` is only emitted for a single-column key;
/// composite keys are declared at table level by `create_table_sql`.
/// Returns `None` for fields without a column.
pub fn column_definition(
    entity: &DeclaredEntity,
    field: &DeclaredField,
    model: &EntityModel,
) -> Option<String> {
    let sql_type = map_type(field)?;
    let mut definition = format!("{} {}", field.name, sql_type);

    if entity.is_id_field(field) && !entity.has_composite_key() {
        definition.push_str(" PRIMARY KEY");
    }

    let default = format_default_value(field);
    if field.required && default.is_none() {
        definition.push_str(" NOT NULL");
    }
    if let Some(default) = default {
        definition.push_str(" DEFAULT ");
        definition.push_str(&default);
    }

    if field.kind == FieldKind::ManyToOne {
        if let Some(reference) = references_clause(entity, field, model) {
            definition.push(' ');
            definition.push_str(&reference);
        }
    }

    Some(definition)
}

/// `REFERENCES target_table(target_id) [ON DELETE ..] [ON UPDATE ..]`
fn references_clause(
    entity: &DeclaredEntity,
    field: &DeclaredField,
    model: &EntityModel,
) -> Option<String> {
    let target_name = field.relation.target_entity.as_deref()?;
    let Some(target) = model.get(target_name) else {
        tracing::warn!(
            entity = %entity.name,
            field = %field.name,
            target = target_name,
            "Target entity not declared, foreign key omitted"
        );
        return None;
    };

    let mut clause = format!("REFERENCES {}({})", target.table, target.id_field);
    if let Some(rule) = field.relation.on_delete {
        clause.push_str(" ON DELETE ");
        clause.push_str(rule.as_sql());
    }
    if let Some(rule) = field.relation.on_update {
        clause.push_str(" ON UPDATE ");
        clause.push_str(rule.as_sql());
    }
    Some(clause)
}
