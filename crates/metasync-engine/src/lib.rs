//! metasync engine - schema reconciliation logic
//!
//! This crate turns a declared entity model into DDL against a live catalog:
//! - Type mapping from field kinds to PostgreSQL column types
//! - Directional type conversion registry (safe vs risky)
//! - Column-level diffing of declared entities against introspected tables
//! - Applying safe changes and supporting structures
//! - Dependency-ordered reconciliation of a full model

pub mod applier;
pub mod conversion;
pub mod diff_engine;
pub mod error;
pub mod orchestrator;
pub mod type_mapper;

pub use applier::{create_table_sql, junction_table_sql, ApplyOutcome, SchemaApplier};
pub use conversion::{RenderedConversion, TypeConversion, TypeConversionRegistry};
pub use diff_engine::{diff_columns, types_match, DiffOptions, SchemaDiffEngine};
pub use error::ReconcileError;
pub use orchestrator::{reconcile_order, Reconciler};
pub use type_mapper::{column_definition, format_default_value, map_type};
