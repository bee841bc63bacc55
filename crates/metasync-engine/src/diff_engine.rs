//! Schema diff engine for comparing declared entities against live tables
//!
//! The engine introspects the live table on every call and compares it with
//! the declared entity. The result lists at most one change per column, in
//! declared-field order:
//! - missing columns become `ADD` (never risky)
//! - type mismatches become `ALTER_TYPE`, risky unless the registry knows a
//!   safe conversion
//! - nullability mismatches become `ALTER_NULLABLE`, except on key columns
//!
//! Columns present in the database but not declared are only logged.

use crate::conversion::TypeConversionRegistry;
use crate::error::{ReconcileError, Result};
use crate::type_mapper::{column_definition, map_type};
use metasync_catalog::{Catalog, SchemaIntrospector};
use metasync_core::{
    validate_identifier, ColumnChange, DeclaredEntity, DeclaredField, EntityModel,
    IntrospectedColumn, SchemaDiff, TableColumns,
};
use std::sync::Arc;

/// Risk description for type pairs without a registered conversion
pub const MANUAL_MIGRATION: &str = "No automatic conversion available - manual migration required";

/// Knobs for column comparison
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Treat a declared VARCHAR shorter than the live column as a risky
    /// narrowing instead of a match
    pub flag_varchar_narrowing: bool,
}

/// Compares declared entities with the live database
pub struct SchemaDiffEngine {
    catalog: Arc<dyn Catalog>,
    conversions: Arc<TypeConversionRegistry>,
    options: DiffOptions,
}

impl SchemaDiffEngine {
    /// Create an engine with the default conversion registry
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self::with_conversions(catalog, Arc::new(TypeConversionRegistry::with_defaults()))
    }

    pub fn with_conversions(
        catalog: Arc<dyn Catalog>,
        conversions: Arc<TypeConversionRegistry>,
    ) -> Self {
        Self {
            catalog,
            conversions,
            options: DiffOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DiffOptions) -> Self {
        self.options = options;
        self
    }

    pub fn conversions(&self) -> &TypeConversionRegistry {
        &self.conversions
    }

    /// Detect the changes needed to bring the entity's table in line
    ///
    /// A missing table yields an empty diff; the applier creates it whole.
    pub async fn detect_changes(
        &self,
        entity: &DeclaredEntity,
        model: &EntityModel,
    ) -> Result<SchemaDiff> {
        validate_identifier(&entity.table)?;

        let exists = self
            .catalog
            .table_exists(&entity.table)
            .await
            .map_err(ReconcileError::Introspection)?;
        if !exists {
            tracing::debug!(entity = %entity.name, table = %entity.table, "Table missing, nothing to diff");
            return Ok(SchemaDiff::new(&entity.name, &entity.table));
        }

        let columns = self
            .catalog
            .columns(&entity.table)
            .await
            .map_err(ReconcileError::Introspection)?;

        diff_columns(entity, model, &columns, &self.conversions, self.options)
    }
}

/// Compare an entity against an already introspected table
pub fn diff_columns(
    entity: &DeclaredEntity,
    model: &EntityModel,
    columns: &TableColumns,
    conversions: &TypeConversionRegistry,
    options: DiffOptions,
) -> Result<SchemaDiff> {
    let mut diff = SchemaDiff::new(&entity.name, &entity.table);

    for field in entity.column_fields() {
        validate_identifier(&field.name)?;

        let Some(expected) = map_type(field) else {
            continue;
        };

        let Some(column) = columns.get(&field.name.to_lowercase()) else {
            let definition = column_definition(entity, field, model).unwrap_or_else(|| {
                format!("{} {}", field.name, expected)
            });
            diff.push(ColumnChange::add(
                &field.name,
                &expected,
                format!("ALTER TABLE {} ADD COLUMN {}", entity.table, definition),
            ));
            continue;
        };

        if !types_match(&expected, column, options) {
            diff.push(type_change(entity, field, &expected, column, conversions)?);
            continue;
        }

        if let Some(change) = nullability_change(entity, field, column) {
            diff.push(change);
        }
    }

    let mut orphans: Vec<&str> = columns
        .values()
        .filter(|column| entity.find_column_field(&column.name).is_none())
        .map(|column| column.name.as_str())
        .collect();
    orphans.sort_unstable();
    for column in orphans {
        tracing::warn!(
            entity = %entity.name,
            table = %entity.table,
            column,
            "Orphaned column is not declared, leaving it in place"
        );
    }

    Ok(diff)
}

/// Whether a live column already satisfies the declared type
///
/// Accepts an exact match, a VARCHAR at least as wide as declared (or
/// unbounded), TEXT over VARCHAR, and UUIDs stored as text.
pub fn types_match(expected: &str, column: &IntrospectedColumn, options: DiffOptions) -> bool {
    let expected = expected.to_uppercase();
    let actual = column.normalized_type();

    if expected == column.full_type() || expected == actual {
        return true;
    }

    if actual == "VARCHAR" {
        if let Some(declared) = varchar_length(&expected) {
            return match column.char_max_length {
                None => true,
                Some(live) if options.flag_varchar_narrowing => i64::from(declared) == i64::from(live),
                Some(live) => i64::from(declared) <= i64::from(live),
            };
        }
    }

    if expected == "TEXT" && actual == "VARCHAR" {
        return true;
    }

    if expected == "UUID" && (actual == "TEXT" || actual == "VARCHAR") {
        tracing::info!(
            column = %column.name,
            actual = %column.full_type(),
            "UUID stored as text, accepted without conversion"
        );
        return true;
    }

    false
}

fn varchar_length(sql_type: &str) -> Option<u32> {
    sql_type
        .strip_prefix("VARCHAR(")?
        .strip_suffix(')')?
        .trim()
        .parse()
        .ok()
}

/// Build the `ALTER_TYPE` change for a mismatched column
fn type_change(
    entity: &DeclaredEntity,
    field: &DeclaredField,
    expected: &str,
    column: &IntrospectedColumn,
    conversions: &TypeConversionRegistry,
) -> Result<ColumnChange> {
    let old_type = column.full_type();

    let change = match conversions.find(&old_type, expected) {
        Some(conversion) => {
            let rendered = conversion.render(&entity.table, &field.name, field.max_length)?;
            ColumnChange::alter_type(&field.name, &old_type, expected, rendered.sql)
                .with_risk(rendered.risky, rendered.warning)
        }
        None => {
            tracing::warn!(
                entity = %entity.name,
                column = %field.name,
                from = %old_type,
                to = expected,
                "No conversion registered, manual migration required"
            );
            ColumnChange::alter_type(
                &field.name,
                &old_type,
                expected,
                format!("-- MANUAL MIGRATION REQUIRED: {} -> {}", old_type, expected),
            )
            .with_risk(true, Some(MANUAL_MIGRATION.to_string()))
        }
    };

    Ok(change)
}

/// `ALTER_NULLABLE` for a column whose nullability disagrees, never on keys
fn nullability_change(
    entity: &DeclaredEntity,
    field: &DeclaredField,
    column: &IntrospectedColumn,
) -> Option<ColumnChange> {
    let expected_nullable = field.expected_nullable();
    if expected_nullable == column.nullable {
        return None;
    }

    if column.primary_key || entity.is_id_field(field) {
        tracing::debug!(
            table = %entity.table,
            column = %field.name,
            "Skipping nullability change on key column"
        );
        return None;
    }

    let action = if expected_nullable { "DROP" } else { "SET" };
    Some(ColumnChange::alter_nullable(
        &field.name,
        column.nullable,
        expected_nullable,
        format!(
            "ALTER TABLE {} ALTER COLUMN {} {} NOT NULL",
            entity.table, field.name, action
        ),
    ))
}
