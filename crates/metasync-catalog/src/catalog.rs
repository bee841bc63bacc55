//! Live database handle: introspection and DDL execution

use metasync_core::TableColumns;

/// Errors raised by a catalog
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Introspection query failed: {0}")]
    Query(String),

    #[error("DDL failed: {message}\n  statement: {sql}")]
    Execution { sql: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CatalogError {
    /// Build an execution error for a failed statement
    pub fn execution(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            sql: sql.into(),
            message: message.into(),
        }
    }
}

/// Reads live table and constraint metadata
///
/// Every call hits the database. Nothing is cached between calls.
#[async_trait::async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// Catalog name (e.g., "PostgreSQL")
    fn name(&self) -> &'static str;

    /// Whether a table exists in the reconciled schema
    async fn table_exists(&self, table: &str) -> Result<bool, CatalogError>;

    /// Columns of a table keyed by lower-cased name
    ///
    /// A missing table yields an empty map.
    async fn columns(&self, table: &str) -> Result<TableColumns, CatalogError>;

    /// Whether a named constraint exists on a table
    async fn constraint_exists(&self, table: &str, constraint: &str) -> Result<bool, CatalogError>;

    /// Check the connection before running a pass
    async fn test_connection(&self) -> Result<(), CatalogError>;
}

/// Executes DDL statements
///
/// Statements auto-commit; there is no transactional rollback.
#[async_trait::async_trait]
pub trait DdlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<(), CatalogError>;
}

/// A database that can be both introspected and altered
pub trait Catalog: SchemaIntrospector + DdlExecutor {}

impl<T: SchemaIntrospector + DdlExecutor + ?Sized> Catalog for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_error_carries_statement() {
        let err = CatalogError::execution("ALTER TABLE users ADD COLUMN x TEXT", "relation does not exist");
        let message = err.to_string();
        assert!(message.contains("relation does not exist"));
        assert!(message.contains("ALTER TABLE users"));
    }
}
