//! Reconciliation driver over a full declared model
//!
//! For each entity the pipeline is:
//!
//! 1. validate identifiers and many-to-one targets
//! 2. create the table if it is missing, otherwise diff and apply safe changes
//! 3. indexes, unique constraints, version trigger, junction tables
//!
//! A failure aborts that entity's pipeline only; the pass moves on to the
//! next entity. Passes are serialized by an internal lock so two callers
//! never race on existence checks.

use crate::applier::SchemaApplier;
use crate::conversion::TypeConversionRegistry;
use crate::diff_engine::{DiffOptions, SchemaDiffEngine};
use crate::error::{ReconcileError, Result};
use metasync_catalog::{Catalog, SchemaIntrospector};
use metasync_core::{
    DeclaredEntity, EntityModel, EntityOutcome, EntityStatus, ModelError, Profile,
    ReconcileConfig, ReconcileReport, SchemaDiff, StatusReport,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::Instrument;

/// Drives reconciliation of declared entities against one database
pub struct Reconciler {
    catalog: Arc<dyn Catalog>,
    diff_engine: SchemaDiffEngine,
    applier: SchemaApplier,
    lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(catalog: Arc<dyn Catalog>, profile: Profile) -> Self {
        Self::with_conversions(catalog, profile, Arc::new(TypeConversionRegistry::with_defaults()))
    }

    /// Use a custom conversion registry
    pub fn with_conversions(
        catalog: Arc<dyn Catalog>,
        profile: Profile,
        conversions: Arc<TypeConversionRegistry>,
    ) -> Self {
        Self {
            diff_engine: SchemaDiffEngine::with_conversions(catalog.clone(), conversions),
            applier: SchemaApplier::new(catalog.clone(), profile),
            catalog,
            lock: Mutex::new(()),
        }
    }

    /// Build from the `[reconcile]` configuration section
    pub fn from_config(catalog: Arc<dyn Catalog>, config: &ReconcileConfig) -> Self {
        Self::new(catalog, config.profile).with_diff_options(DiffOptions {
            flag_varchar_narrowing: config.flag_varchar_narrowing,
        })
    }

    pub fn with_diff_options(mut self, options: DiffOptions) -> Self {
        self.diff_engine = self.diff_engine.with_options(options);
        self
    }

    pub fn profile(&self) -> Profile {
        self.applier.profile()
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn diff_engine(&self) -> &SchemaDiffEngine {
        &self.diff_engine
    }

    pub fn applier(&self) -> &SchemaApplier {
        &self.applier
    }

    /// Reconcile every entity, referenced entities first
    ///
    /// Never fails as a whole: per-entity failures are recorded in the report.
    pub async fn reconcile_all(&self, model: &EntityModel) -> ReconcileReport {
        let _guard = self.lock.lock().await;
        tracing::info!(entities = model.len(), catalog = self.catalog.name(), "Starting reconcile pass");

        let mut report = ReconcileReport::new();
        for entity in reconcile_order(model) {
            let outcome = match self.reconcile_entity(entity, model).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let error = error_chain(&e);
                    tracing::error!(
                        entity = %entity.name,
                        error = %error,
                        "Entity pipeline aborted, already applied DDL stays in place"
                    );
                    EntityOutcome::Failed { error }
                }
            };
            report.record(&entity.name, outcome);
        }

        tracing::info!(
            created = report.summary.created,
            updated = report.summary.updated,
            unchanged = report.summary.unchanged,
            failed = report.summary.failed,
            pending_risky = report.summary.pending_risky,
            "Reconcile pass finished"
        );
        report
    }

    /// Run the full pipeline for one entity
    pub async fn apply_safe(&self, model: &EntityModel, name: &str) -> Result<EntityOutcome> {
        let entity = lookup(model, name)?;
        let _guard = self.lock.lock().await;
        self.reconcile_entity(entity, model).await
    }

    /// Read-only diff for one entity
    pub async fn status_for(&self, model: &EntityModel, name: &str) -> Result<SchemaDiff> {
        let entity = lookup(model, name)?;
        entity.validate(model)?;
        self.diff_engine.detect_changes(entity, model).await
    }

    /// Read-only drift state of every entity
    pub async fn status_all(&self, model: &EntityModel) -> Result<StatusReport> {
        let mut report = StatusReport::new();
        for entity in model.values() {
            entity.validate(model)?;
            let exists = self
                .catalog
                .table_exists(&entity.table)
                .await
                .map_err(ReconcileError::Introspection)?;
            let diff = self.diff_engine.detect_changes(entity, model).await?;
            report.insert(&entity.name, EntityStatus::new(exists, diff));
        }
        Ok(report)
    }

    /// Drop all declared tables, development profiles only
    pub async fn drop_all(&self, model: &EntityModel) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        self.applier.drop_all_tables(model).await
    }

    async fn reconcile_entity(
        &self,
        entity: &DeclaredEntity,
        model: &EntityModel,
    ) -> Result<EntityOutcome> {
        let span = tracing::info_span!("reconcile", entity = %entity.name, table = %entity.table);

        async {
            entity.validate(model)?;

            let exists = self
                .catalog
                .table_exists(&entity.table)
                .await
                .map_err(ReconcileError::Introspection)?;

            let outcome = if exists {
                let diff = self.diff_engine.detect_changes(entity, model).await?;
                if diff.is_empty() {
                    EntityOutcome::Unchanged
                } else {
                    let applied = self.applier.apply_changes(&diff).await?;
                    EntityOutcome::Updated {
                        applied: applied.applied,
                        skipped_risky: applied.skipped_risky,
                    }
                }
            } else {
                self.applier.create_table(entity, model).await?;
                EntityOutcome::Created
            };

            self.applier.create_indexes(entity).await?;
            self.applier.create_unique_constraints(entity).await?;
            self.applier.create_version_trigger(entity).await?;
            self.applier.create_many_to_many_junction_tables(entity).await?;

            Ok::<_, ReconcileError>(outcome)
        }
        .instrument(span)
        .await
    }
}

fn lookup<'a>(model: &'a EntityModel, name: &str) -> Result<&'a DeclaredEntity> {
    model
        .get(name)
        .ok_or_else(|| ModelError::UnknownEntity(name.to_string()).into())
}

/// Error message including every source in the chain
fn error_chain(error: &ReconcileError) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Order entities so many-to-one targets come before their referrers
///
/// Ties are broken by entity name. Self references are ignored, and entities
/// caught in a cycle are appended in name order.
pub fn reconcile_order(model: &EntityModel) -> Vec<&DeclaredEntity> {
    let mut pending: BTreeMap<&str, BTreeSet<&str>> = model
        .values()
        .map(|entity| {
            let targets = entity
                .referenced_entities()
                .into_iter()
                .filter(|target| *target != entity.name && model.contains_key(*target))
                .collect();
            (entity.name.as_str(), targets)
        })
        .collect();

    let mut ordered = Vec::with_capacity(model.len());
    while let Some(name) = pending
        .iter()
        .find(|(_, targets)| targets.is_empty())
        .map(|(name, _)| *name)
    {
        pending.remove(name);
        for targets in pending.values_mut() {
            targets.remove(name);
        }
        ordered.push(&model[name]);
    }

    if !pending.is_empty() {
        tracing::warn!(
            entities = ?pending.keys().collect::<Vec<_>>(),
            "Reference cycle between entities, falling back to name order"
        );
        ordered.extend(pending.keys().map(|name| &model[*name]));
    }

    ordered
}
