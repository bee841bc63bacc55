//! Column-level change list produced by one reconciliation pass
//!
//! A [`SchemaDiff`] is built fresh per pass, consumed by the applier and then
//! dropped. It is never persisted.

use serde::{Deserialize, Serialize};

/// Kind of structural change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    /// Add a missing column
    Add,

    /// Change the column type
    AlterType,

    /// Change NULL / NOT NULL
    AlterNullable,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::AlterType => "ALTER_TYPE",
            Self::AlterNullable => "ALTER_NULLABLE",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One change to one column
///
/// A risky change is never executed automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnChange {
    pub kind: ChangeKind,

    pub column: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_nullable: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_nullable: Option<bool>,

    pub risky: bool,

    /// Human-readable description of the possible data loss
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_description: Option<String>,

    /// Exact statement to execute
    pub sql: String,
}

impl ColumnChange {
    /// Add a missing column (never risky)
    pub fn add(column: impl Into<String>, new_type: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Add,
            column: column.into(),
            old_type: None,
            new_type: Some(new_type.into()),
            old_nullable: None,
            new_nullable: None,
            risky: false,
            risk_description: None,
            sql: sql.into(),
        }
    }

    /// Change a column type
    pub fn alter_type(
        column: impl Into<String>,
        old_type: impl Into<String>,
        new_type: impl Into<String>,
        sql: impl Into<String>,
    ) -> Self {
        Self {
            kind: ChangeKind::AlterType,
            column: column.into(),
            old_type: Some(old_type.into()),
            new_type: Some(new_type.into()),
            old_nullable: None,
            new_nullable: None,
            risky: false,
            risk_description: None,
            sql: sql.into(),
        }
    }

    /// Change nullability; tightening to NOT NULL is risky because existing
    /// NULLs make the statement fail
    pub fn alter_nullable(
        column: impl Into<String>,
        old_nullable: bool,
        new_nullable: bool,
        sql: impl Into<String>,
    ) -> Self {
        let tightening = old_nullable && !new_nullable;
        Self {
            kind: ChangeKind::AlterNullable,
            column: column.into(),
            old_type: None,
            new_type: None,
            old_nullable: Some(old_nullable),
            new_nullable: Some(new_nullable),
            risky: tightening,
            risk_description: tightening
                .then(|| "Existing NULL values will make SET NOT NULL fail".to_string()),
            sql: sql.into(),
        }
    }

    /// Flag this change as risky with a description
    pub fn with_risk(mut self, risky: bool, description: Option<String>) -> Self {
        self.risky = risky;
        self.risk_description = description;
        self
    }
}

/// Ordered changes for one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDiff {
    pub entity: String,

    pub table: String,

    /// At most one change per column, in declared-field order
    pub changes: Vec<ColumnChange>,
}

impl SchemaDiff {
    pub fn new(entity: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            table: table.into(),
            changes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn push(&mut self, change: ColumnChange) {
        self.changes.push(change);
    }

    pub fn has_risky_changes(&self) -> bool {
        self.changes.iter().any(|c| c.risky)
    }

    pub fn safe_changes(&self) -> impl Iterator<Item = &ColumnChange> {
        self.changes.iter().filter(|c| !c.risky)
    }

    pub fn risky_changes(&self) -> impl Iterator<Item = &ColumnChange> {
        self.changes.iter().filter(|c| c.risky)
    }

    /// Find the change for a column, case-insensitively
    pub fn change_for(&self, column: &str) -> Option<&ColumnChange> {
        self.changes
            .iter()
            .find(|c| c.column.eq_ignore_ascii_case(column))
    }

    pub fn summary(&self) -> ChangeSummary {
        let risky = self.risky_changes().count();
        ChangeSummary {
            total: self.changes.len(),
            safe: self.changes.len() - risky,
            risky,
            has_risky_changes: risky > 0,
        }
    }
}

/// Counts over a diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub total: usize,
    pub safe: usize,
    pub risky: usize,
    pub has_risky_changes: bool,
}

/// Reconciliation state of one entity, recomputed on every status call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftState {
    /// Backing table does not exist yet
    NotReconciled,

    /// Table matches the declared entity
    Clean,

    /// Pending changes remain
    Drifted,
}

impl DriftState {
    pub fn from_diff(table_exists: bool, diff: &SchemaDiff) -> Self {
        if !table_exists {
            Self::NotReconciled
        } else if diff.is_empty() {
            Self::Clean
        } else {
            Self::Drifted
        }
    }
}

impl std::fmt::Display for DriftState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotReconciled => write!(f, "not reconciled"),
            Self::Clean => write!(f, "clean"),
            Self::Drifted => write!(f, "drifted"),
        }
    }
}
