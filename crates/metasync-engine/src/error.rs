//! Errors raised while reconciling an entity

use metasync_catalog::CatalogError;
use metasync_core::{ModelError, Profile};

/// Reconciliation error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReconcileError {
    /// The database could not describe the live schema
    #[error("Introspection failed")]
    Introspection(#[source] CatalogError),

    /// A statement the entity depends on failed
    #[error("Failed to apply DDL for entity '{entity}': {sql}")]
    Apply {
        entity: String,
        sql: String,
        #[source]
        source: CatalogError,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Refusing to drop tables under the '{profile}' profile")]
    DropRefused { profile: Profile },
}

impl ReconcileError {
    pub(crate) fn apply(entity: &str, sql: &str, source: CatalogError) -> Self {
        Self::Apply {
            entity: entity.to_string(),
            sql: sql.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
