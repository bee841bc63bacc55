//! DDL execution for one entity
//!
//! Creates missing tables, applies the safe part of a diff and (re)creates
//! the supporting structures: indexes, unique constraints, the version
//! trigger and many-to-many junction tables. Every statement is idempotent
//! so the whole pipeline can run on every startup.

use crate::error::{ReconcileError, Result};
use crate::type_mapper::column_definition;
use metasync_catalog::{Catalog, DdlExecutor, SchemaIntrospector};
use metasync_core::{
    stored_identifier, validate_identifier, validate_identifiers, DeclaredEntity, EntityModel,
    Profile, SchemaDiff,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Default junction column pointing at the target entity
pub const DEFAULT_TARGET_COLUMN: &str = "target_id";

/// Counts from applying one diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub applied: usize,
    pub skipped_risky: usize,
}

/// Executes DDL against a catalog
pub struct SchemaApplier {
    catalog: Arc<dyn Catalog>,
    profile: Profile,
}

impl SchemaApplier {
    pub fn new(catalog: Arc<dyn Catalog>, profile: Profile) -> Self {
        Self { catalog, profile }
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    async fn execute(&self, entity: &str, sql: &str) -> Result<()> {
        self.catalog
            .execute(sql)
            .await
            .map_err(|source| ReconcileError::apply(entity, sql, source))
    }

    /// Create the entity's table with every column-backed field
    pub async fn create_table(&self, entity: &DeclaredEntity, model: &EntityModel) -> Result<()> {
        let sql = create_table_sql(entity, model)?;
        self.execute(&entity.name, &sql).await?;
        tracing::info!(entity = %entity.name, table = %entity.table, "Created table");
        Ok(())
    }

    /// Execute the safe changes of a diff, skipping risky ones
    ///
    /// The first failing statement aborts the rest of the diff.
    pub async fn apply_changes(&self, diff: &SchemaDiff) -> Result<ApplyOutcome> {
        let mut outcome = ApplyOutcome::default();
        if diff.is_empty() {
            tracing::debug!(table = %diff.table, "No column changes");
            return Ok(outcome);
        }

        tracing::info!(table = %diff.table, changes = diff.changes.len(), "Applying column changes");

        for change in &diff.changes {
            if change.risky {
                tracing::warn!(
                    table = %diff.table,
                    column = %change.column,
                    kind = %change.kind,
                    sql = %change.sql,
                    risk = change.risk_description.as_deref().unwrap_or("unspecified"),
                    "Skipping risky change, review and apply manually"
                );
                outcome.skipped_risky += 1;
                continue;
            }

            self.execute(&diff.entity, &change.sql).await?;
            tracing::info!(table = %diff.table, column = %change.column, kind = %change.kind, "Applied change");
            outcome.applied += 1;
        }

        Ok(outcome)
    }

    /// Create indexes on the tenant field, the version field and foreign keys
    ///
    /// Index failures are logged and do not abort the entity. Returns the
    /// number of statements that succeeded.
    pub async fn create_indexes(&self, entity: &DeclaredEntity) -> Result<usize> {
        validate_identifier(&entity.table)?;

        let mut created = 0;
        for column in index_columns(entity) {
            validate_identifier(&column)?;
            let index = stored_identifier(&format!("idx_{}_{}", entity.table, column));
            let sql = format!("CREATE INDEX IF NOT EXISTS {} ON {}({})", index, entity.table, column);

            match self.catalog.execute(&sql).await {
                Ok(()) => {
                    tracing::debug!(index = %index, "Index ensured");
                    created += 1;
                }
                Err(e) => tracing::warn!(index = %index, error = %e, "Failed to create index"),
            }
        }
        Ok(created)
    }

    /// Add a UNIQUE constraint for every unique field that lacks one
    ///
    /// Returns the number of constraints added.
    pub async fn create_unique_constraints(&self, entity: &DeclaredEntity) -> Result<usize> {
        validate_identifier(&entity.table)?;

        let mut added = 0;
        for field in entity.column_fields().filter(|f| f.unique) {
            validate_identifier(&field.name)?;
            // Generated names are stored folded and truncated to 63 bytes
            let constraint = stored_identifier(&format!("uk_{}_{}", entity.table, field.name));

            let exists = self
                .catalog
                .constraint_exists(&entity.table, &constraint)
                .await
                .map_err(ReconcileError::Introspection)?;
            if exists {
                tracing::debug!(constraint = %constraint, "Unique constraint already exists");
                continue;
            }

            let sql = format!(
                "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
                entity.table, constraint, field.name
            );
            match self.catalog.execute(&sql).await {
                Ok(()) => {
                    tracing::debug!(constraint = %constraint, "Unique constraint created");
                    added += 1;
                }
                Err(e) => {
                    tracing::warn!(constraint = %constraint, error = %e, "Failed to create unique constraint")
                }
            }
        }
        Ok(added)
    }

    /// Recreate the BEFORE UPDATE trigger that bumps the version field
    ///
    /// Returns `false` when the entity declares no version field.
    pub async fn create_version_trigger(&self, entity: &DeclaredEntity) -> Result<bool> {
        let Some(version) = entity.version_field.as_deref() else {
            return Ok(false);
        };
        validate_identifiers(&[entity.table.as_str(), version])?;

        for sql in version_trigger_sql(entity, version) {
            self.execute(&entity.name, &sql).await?;
        }

        tracing::info!(table = %entity.table, "Version trigger created");
        Ok(true)
    }

    /// Create missing junction tables for many-to-many fields
    ///
    /// Returns the number of tables created.
    pub async fn create_many_to_many_junction_tables(
        &self,
        entity: &DeclaredEntity,
    ) -> Result<usize> {
        let mut created = 0;

        for field in entity.many_to_many_fields() {
            let Some(junction) = field
                .relation
                .join_table
                .as_deref()
                .filter(|name| !name.trim().is_empty())
            else {
                tracing::warn!(entity = %entity.name, field = %field.name, "Many-to-many field has no join table, skipping");
                continue;
            };

            let exists = self
                .catalog
                .table_exists(junction)
                .await
                .map_err(ReconcileError::Introspection)?;
            if exists {
                tracing::debug!(table = junction, "Junction table already exists");
                continue;
            }

            let source = field
                .relation
                .join_column
                .as_deref()
                .unwrap_or(&entity.id_field);
            let target = field
                .relation
                .inverse_join_column
                .as_deref()
                .unwrap_or(DEFAULT_TARGET_COLUMN);

            let sql = junction_table_sql(junction, source, target)?;
            self.execute(&entity.name, &sql).await?;
            tracing::info!(table = junction, "Created junction table");
            created += 1;
        }

        Ok(created)
    }

    /// Drop every declared table and junction table
    ///
    /// Refused outside development-like profiles.
    pub async fn drop_all_tables(&self, model: &EntityModel) -> Result<Vec<String>> {
        if !self.profile.is_development() {
            return Err(ReconcileError::DropRefused {
                profile: self.profile,
            });
        }

        tracing::warn!(profile = %self.profile, "Dropping all declared tables");

        let mut dropped = Vec::new();
        for (entity, table) in droppable_tables(model) {
            validate_identifier(&table)?;
            let sql = format!("DROP TABLE IF EXISTS {} CASCADE", table);
            self.execute(entity, &sql).await?;
            tracing::warn!(table = %table, "Dropped table");
            dropped.push(table);
        }
        Ok(dropped)
    }
}

/// `CREATE TABLE IF NOT EXISTS` for an entity, fields in declared order
pub fn create_table_sql(entity: &DeclaredEntity, model: &EntityModel) -> Result<String> {
    validate_identifier(&entity.table)?;

    let mut definitions = Vec::new();
    for field in entity.column_fields() {
        validate_identifier(&field.name)?;
        if let Some(definition) = column_definition(entity, field, model) {
            definitions.push(definition);
        }
    }

    if entity.has_composite_key() {
        let keys: Vec<&str> = entity.key_fields().map(|f| f.name.as_str()).collect();
        definitions.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        entity.table,
        definitions.join(", ")
    ))
}

/// Junction table with a composite primary key over both sides
pub fn junction_table_sql(table: &str, source: &str, target: &str) -> Result<String> {
    validate_identifiers(&[table, source, target])?;
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {table} ({source} UUID NOT NULL, {target} UUID NOT NULL, \
         created_at TIMESTAMPTZ DEFAULT NOW(), PRIMARY KEY ({source}, {target}))"
    ))
}

/// Tenant, version and foreign key columns, deduplicated in that order
fn index_columns(entity: &DeclaredEntity) -> Vec<String> {
    let foreign_keys = entity
        .column_fields()
        .filter(|f| f.kind == metasync_core::FieldKind::ManyToOne || f.name.ends_with("_id"))
        .map(|f| f.name.as_str());

    let mut seen = BTreeSet::new();
    entity
        .tenant_field
        .as_deref()
        .into_iter()
        .chain(entity.version_field.as_deref())
        .chain(foreign_keys)
        .filter(|column| seen.insert(column.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Function, drop and create statements for the version trigger
fn version_trigger_sql(entity: &DeclaredEntity, version: &str) -> [String; 3] {
    let function = format!("increment_{}_version", entity.table);
    let trigger = format!("trigger_{}", function);

    let touch_updated_at = if entity.find_column_field("updated_at").is_some() {
        "\n    NEW.updated_at = NOW();"
    } else {
        ""
    };

    [
        format!(
            "CREATE OR REPLACE FUNCTION {function}()\n\
             RETURNS TRIGGER AS $$\n\
             BEGIN\n    \
             NEW.{version} = COALESCE(OLD.{version}, 0) + 1;{touch_updated_at}\n    \
             RETURN NEW;\n\
             END;\n\
             $$ LANGUAGE plpgsql"
        ),
        format!("DROP TRIGGER IF EXISTS {} ON {}", trigger, entity.table),
        format!(
            "CREATE TRIGGER {} BEFORE UPDATE ON {} FOR EACH ROW EXECUTE FUNCTION {}()",
            trigger, entity.table, function
        ),
    ]
}

/// Entity tables followed by junction tables, each paired with its owner
fn droppable_tables(model: &EntityModel) -> Vec<(&str, String)> {
    let mut seen = BTreeSet::new();
    let mut tables = Vec::new();

    for entity in model.values() {
        if seen.insert(entity.table.to_lowercase()) {
            tables.push((entity.name.as_str(), entity.table.clone()));
        }
    }
    for entity in model.values() {
        for field in entity.many_to_many_fields() {
            if let Some(junction) = field.relation.join_table.as_deref() {
                if !junction.trim().is_empty() && seen.insert(junction.to_lowercase()) {
                    tables.push((entity.name.as_str(), junction.to_string()));
                }
            }
        }
    }
    tables
}
