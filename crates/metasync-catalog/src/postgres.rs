//! PostgreSQL catalog using information_schema
//!
//! Columns are read from `information_schema.columns`, joined against
//! primary-key and foreign-key constraint metadata. DDL is sent with the
//! simple query protocol so function bodies and multi-statement scripts work.
//!
//! ## Usage
//!
//! ```rust,ignore
//! // Using connection string
//! let catalog = PostgresCatalog::from_connection_string(
//!     "host=localhost port=5432 dbname=app user=app password=secret",
//!     "public",
//! ).await?;
//!
//! // From a [database] config section (TLS, statement timeout)
//! let catalog = PostgresCatalog::connect(&config.database).await?;
//! ```
//!
//! Reference: https://www.postgresql.org/docs/current/information-schema-columns.html

use crate::catalog::{CatalogError, DdlExecutor, SchemaIntrospector};
use metasync_core::{
    columns_by_name, stored_identifier, validate_identifier, DatabaseConfig, IntrospectedColumn,
    TableColumns,
};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::{Client, Config as PgConfig, NoTls};

const COLUMNS_QUERY: &str = r#"
    SELECT
        c.column_name::text,
        c.data_type::text,
        c.udt_name::text,
        c.is_nullable::text,
        c.character_maximum_length::int4,
        c.numeric_precision::int4,
        c.numeric_scale::int4,
        c.column_default::text,
        pk.column_name IS NOT NULL AS is_primary_key,
        fk.foreign_table_name::text,
        fk.foreign_column_name::text
    FROM information_schema.columns c
    LEFT JOIN (
        SELECT kcu.column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON tc.constraint_name = kcu.constraint_name
         AND tc.table_schema = kcu.table_schema
        WHERE tc.table_schema = $1
          AND tc.table_name = $2
          AND tc.constraint_type = 'PRIMARY KEY'
    ) pk ON c.column_name = pk.column_name
    LEFT JOIN (
        SELECT DISTINCT ON (kcu.column_name)
            kcu.column_name,
            ccu.table_name AS foreign_table_name,
            ccu.column_name AS foreign_column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON tc.constraint_name = kcu.constraint_name
         AND tc.table_schema = kcu.table_schema
        JOIN information_schema.constraint_column_usage ccu
          ON ccu.constraint_name = tc.constraint_name
         AND ccu.table_schema = tc.table_schema
        WHERE tc.table_schema = $1
          AND tc.table_name = $2
          AND tc.constraint_type = 'FOREIGN KEY'
        ORDER BY kcu.column_name
    ) fk ON c.column_name = fk.column_name
    WHERE c.table_schema = $1
      AND c.table_name = $2
    ORDER BY c.ordinal_position
"#;

const TABLE_EXISTS_QUERY: &str = r#"
    SELECT EXISTS (
        SELECT 1 FROM information_schema.tables
        WHERE table_schema = $1 AND table_name = $2
    )
"#;

const CONSTRAINT_EXISTS_QUERY: &str = r#"
    SELECT EXISTS (
        SELECT 1 FROM information_schema.table_constraints
        WHERE table_schema = $1 AND table_name = $2 AND constraint_name = $3
    )
"#;

/// PostgreSQL catalog
pub struct PostgresCatalog {
    client: Client,

    /// Schema that is introspected and altered
    schema: String,

    /// Connection host
    host: String,

    /// Connection port
    port: u16,

    /// Database name
    database: String,
}

impl PostgresCatalog {
    /// Connect using a `[database]` config section
    ///
    /// Resolves the URL (config or `DATABASE_URL`), picks TLS, then applies
    /// the search path and the statement timeout to the session.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, CatalogError> {
        let url = config
            .resolve_url()
            .map_err(|e| CatalogError::Config(e.to_string()))?;

        let catalog = if config.tls {
            Self::from_connection_string_with_tls(&url, &config.schema).await?
        } else {
            Self::from_connection_string(&url, &config.schema).await?
        };

        catalog.prepare_session(config.statement_timeout_ms).await?;
        Ok(catalog)
    }

    /// Create a catalog from a PostgreSQL connection string
    ///
    /// Accepts both `host=... dbname=...` and `postgres://` URL forms.
    pub async fn from_connection_string(conn_str: &str, schema: &str) -> Result<Self, CatalogError> {
        let (host, port, database) = Self::describe(conn_str)?;
        validate_identifier(schema).map_err(|e| CatalogError::Config(e.to_string()))?;

        let (client, connection) = tokio_postgres::connect(conn_str, NoTls)
            .await
            .map_err(|e| CatalogError::Connection(format!(
                "Failed to connect to PostgreSQL at {}:{}: {}",
                host, port, e
            )))?;

        let (log_host, log_port) = (host.clone(), port);
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(host = %log_host, port = log_port, "PostgreSQL connection error: {}", e);
            }
        });

        Ok(Self {
            client,
            schema: stored_identifier(schema),
            host,
            port,
            database,
        })
    }

    /// Create a catalog from a connection string, always using TLS
    pub async fn from_connection_string_with_tls(
        conn_str: &str,
        schema: &str,
    ) -> Result<Self, CatalogError> {
        let (host, port, database) = Self::describe(conn_str)?;
        validate_identifier(schema).map_err(|e| CatalogError::Config(e.to_string()))?;

        let connector = TlsConnector::builder()
            .build()
            .map_err(|e| CatalogError::Config(format!("Failed to create TLS connector: {}", e)))?;
        let tls = MakeTlsConnector::new(connector);

        let (client, connection) = tokio_postgres::connect(conn_str, tls)
            .await
            .map_err(|e| CatalogError::Connection(format!(
                "Failed to connect to PostgreSQL at {}:{} with TLS: {}",
                host, port, e
            )))?;

        let (log_host, log_port) = (host.clone(), port);
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(host = %log_host, port = log_port, "PostgreSQL TLS connection error: {}", e);
            }
        });

        Ok(Self {
            client,
            schema: stored_identifier(schema),
            host,
            port,
            database,
        })
    }

    /// Extract host, port and database for logging
    fn describe(conn_str: &str) -> Result<(String, u16, String), CatalogError> {
        let config: PgConfig = conn_str
            .parse()
            .map_err(|e| CatalogError::Config(format!("Invalid connection string: {}", e)))?;

        let host = config
            .get_hosts()
            .first()
            .map(|h| match h {
                tokio_postgres::config::Host::Tcp(name) => name.clone(),
                #[allow(unreachable_patterns)]
                other => format!("{:?}", other),
            })
            .unwrap_or_else(|| "localhost".to_string());
        let port = config.get_ports().first().copied().unwrap_or(5432);
        let database = config.get_dbname().unwrap_or("postgres").to_string();

        Ok((host, port, database))
    }

    /// Point unqualified DDL at the reconciled schema and bound statement time
    async fn prepare_session(&self, statement_timeout_ms: Option<u64>) -> Result<(), CatalogError> {
        let mut script = format!("SET search_path TO {}", self.schema);
        if let Some(ms) = statement_timeout_ms {
            script.push_str(&format!("; SET statement_timeout = {}", ms));
        }

        self.client
            .batch_execute(&script)
            .await
            .map_err(|e| CatalogError::Config(format!("Failed to prepare session: {}", e)))?;

        tracing::debug!(
            schema = %self.schema,
            statement_timeout_ms = ?statement_timeout_ms,
            "Session prepared"
        );
        Ok(())
    }

    /// Reconciled schema name
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Get the connection host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the connection port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the database name
    pub fn database(&self) -> &str {
        &self.database
    }

    fn query_error(table: &str, e: tokio_postgres::Error) -> CatalogError {
        let err_str = e.to_string();
        if err_str.contains("permission denied") {
            CatalogError::PermissionDenied(format!("Cannot read metadata for {}: {}", table, err_str))
        } else if e.is_closed() {
            CatalogError::Connection(err_str)
        } else {
            CatalogError::Query(err_str)
        }
    }

    /// Prefer the underlying type name for user-defined types and arrays
    fn column_type(data_type: String, udt_name: String) -> String {
        match data_type.as_str() {
            "USER-DEFINED" => udt_name,
            "ARRAY" => format!("{}[]", udt_name.trim_start_matches('_')),
            _ => data_type,
        }
    }
}

#[async_trait::async_trait]
impl SchemaIntrospector for PostgresCatalog {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    async fn table_exists(&self, table: &str) -> Result<bool, CatalogError> {
        let stored = stored_identifier(table);
        let row = self
            .client
            .query_one(TABLE_EXISTS_QUERY, &[&self.schema, &stored])
            .await
            .map_err(|e| Self::query_error(table, e))?;
        Ok(row.get(0))
    }

    async fn columns(&self, table: &str) -> Result<TableColumns, CatalogError> {
        let stored = stored_identifier(table);
        let rows = self
            .client
            .query(COLUMNS_QUERY, &[&self.schema, &stored])
            .await
            .map_err(|e| Self::query_error(table, e))?;

        let columns = rows.into_iter().map(|row| {
            let name: String = row.get(0);
            let data_type = Self::column_type(row.get(1), row.get(2));
            let is_nullable: String = row.get(3);
            let foreign_table: Option<String> = row.get(9);
            let foreign_column: Option<String> = row.get(10);

            let mut column = IntrospectedColumn::new(name, data_type)
                .with_nullable(is_nullable.eq_ignore_ascii_case("YES"));
            column.char_max_length = row.get(4);
            column.numeric_precision = row.get(5);
            column.numeric_scale = row.get(6);
            column.default = row.get(7);
            column.primary_key = row.get(8);
            if let (Some(table), Some(col)) = (foreign_table, foreign_column) {
                column = column.with_foreign_key(table, col);
            }
            column
        });

        let columns = columns_by_name(columns);
        tracing::debug!(table, count = columns.len(), "Introspected columns");
        Ok(columns)
    }

    async fn constraint_exists(&self, table: &str, constraint: &str) -> Result<bool, CatalogError> {
        let stored_table = stored_identifier(table);
        let stored_constraint = stored_identifier(constraint);
        let row = self
            .client
            .query_one(
                CONSTRAINT_EXISTS_QUERY,
                &[&self.schema, &stored_table, &stored_constraint],
            )
            .await
            .map_err(|e| Self::query_error(table, e))?;
        Ok(row.get(0))
    }

    async fn test_connection(&self) -> Result<(), CatalogError> {
        self.client
            .query("SELECT 1", &[])
            .await
            .map_err(|e| CatalogError::Connection(format!("Connection test failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DdlExecutor for PostgresCatalog {
    async fn execute(&self, sql: &str) -> Result<(), CatalogError> {
        tracing::debug!(sql, "Executing DDL");
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| {
                let message = e
                    .as_db_error()
                    .map(|db| db.message().to_string())
                    .unwrap_or_else(|| e.to_string());
                CatalogError::execution(sql, message)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_connection_strings() {
        let (host, port, database) =
            PostgresCatalog::describe("host=db.internal port=6432 dbname=app user=app").unwrap();
        assert_eq!(host, "db.internal");
        assert_eq!(port, 6432);
        assert_eq!(database, "app");

        let (host, port, database) = PostgresCatalog::describe("postgres://app@localhost/crm").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 5432);
        assert_eq!(database, "crm");
    }

    #[test]
    fn rejects_invalid_connection_strings() {
        assert!(matches!(
            PostgresCatalog::describe("host=localhost port=notaport"),
            Err(CatalogError::Config(_))
        ));
    }

    #[test]
    fn user_defined_types_use_udt_name() {
        assert_eq!(
            PostgresCatalog::column_type("USER-DEFINED".into(), "citext".into()),
            "citext"
        );
        assert_eq!(PostgresCatalog::column_type("ARRAY".into(), "_int4".into()), "int4[]");
        assert_eq!(
            PostgresCatalog::column_type("character varying".into(), "varchar".into()),
            "character varying"
        );
    }
}
