//! metasync core
//!
//! Stable domain model shared by the catalog, engine and CLI crates:
//! declared entities, introspected columns, change lists and reports.
//! The core never talks to a database.

pub mod config;
pub mod diff;
pub mod error;
pub mod identifier;
pub mod model;
pub mod report;
pub mod schema;

pub use config::{Config, ConfigError, DatabaseConfig, Profile, ReconcileConfig};
pub use diff::{ChangeKind, ChangeSummary, ColumnChange, DriftState, SchemaDiff};
pub use error::ModelError;
pub use identifier::{
    stored_identifier, validate_identifier, validate_identifiers, MAX_IDENTIFIER_LEN,
};
pub use model::{
    CascadeRule, DeclaredEntity, DeclaredField, EntityModel, EntityRegistry, FieldKind,
    Relationship, model_from_entities, model_from_json,
};
pub use report::{
    EntityOutcome, EntityStatus, ReconcileReport, ReconcileSummary, ReportVersion, StatusReport,
};
pub use schema::{
    columns_by_name, normalize_data_type, ForeignKeyRef, IntrospectedColumn, TableColumns,
};
