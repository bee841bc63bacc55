//! Reconcile and status reports (stable v1)
//!
//! These are the JSON documents handed to admin tooling.
//! Breaking changes require a new version.

use crate::diff::{ChangeSummary, DriftState, SchemaDiff};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// What happened to one entity during a reconcile pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntityOutcome {
    /// Table did not exist and was created
    Created,

    /// Safe changes were applied, risky ones left for review
    Updated { applied: usize, skipped_risky: usize },

    /// Nothing to do
    Unchanged,

    /// Pipeline aborted at the first hard failure
    Failed { error: String },
}

impl EntityOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Counts over a reconcile pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,

    /// Risky changes left for manual review across all entities
    pub pending_risky: usize,
}

/// Result of reconciling a full model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    pub summary: ReconcileSummary,

    /// Outcome per entity name
    pub entities: BTreeMap<String, EntityOutcome>,
}

impl ReconcileReport {
    pub fn new() -> Self {
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary: ReconcileSummary::default(),
            entities: BTreeMap::new(),
        }
    }

    /// Record the outcome for one entity
    pub fn record(&mut self, entity: impl Into<String>, outcome: EntityOutcome) {
        match &outcome {
            EntityOutcome::Created => self.summary.created += 1,
            EntityOutcome::Updated { skipped_risky, .. } => {
                self.summary.updated += 1;
                self.summary.pending_risky += skipped_risky;
            }
            EntityOutcome::Unchanged => self.summary.unchanged += 1,
            EntityOutcome::Failed { .. } => self.summary.failed += 1,
        }
        self.summary.total += 1;
        self.entities.insert(entity.into(), outcome);
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

impl Default for ReconcileReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Live drift status of one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStatus {
    pub table: String,
    pub state: DriftState,
    pub summary: ChangeSummary,
    pub diff: SchemaDiff,
}

impl EntityStatus {
    pub fn new(table_exists: bool, diff: SchemaDiff) -> Self {
        Self {
            table: diff.table.clone(),
            state: DriftState::from_diff(table_exists, &diff),
            summary: diff.summary(),
            diff,
        }
    }
}

/// Read-only drift inspection over a full model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    pub entities: BTreeMap<String, EntityStatus>,
}

impl StatusReport {
    pub fn new() -> Self {
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            entities: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, entity: impl Into<String>, status: EntityStatus) {
        self.entities.insert(entity.into(), status);
    }

    /// Number of entities with pending changes
    pub fn pending_changes(&self) -> usize {
        self.entities
            .values()
            .filter(|s| s.state == DriftState::Drifted)
            .count()
    }

    /// Entities whose diff contains a risky change
    pub fn entities_needing_review(&self) -> Vec<&str> {
        self.entities
            .iter()
            .filter(|(_, s)| s.summary.has_risky_changes)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

impl Default for StatusReport {
    fn default() -> Self {
        Self::new()
    }
}
