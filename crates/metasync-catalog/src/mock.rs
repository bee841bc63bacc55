//! In-memory catalog for testing
//!
//! The mock keeps tables, columns and constraints in memory and records every
//! DDL statement it executes. It understands the small DDL subset the engine
//! emits, so a reconcile pass against it changes what the next introspection
//! returns:
//! - `CREATE TABLE IF NOT EXISTS t (...)`
//! - `ALTER TABLE t ADD COLUMN ...`
//! - `ALTER TABLE t ALTER COLUMN c TYPE ... [USING ...]`
//! - `ALTER TABLE t ALTER COLUMN c SET|DROP NOT NULL`
//! - `ALTER TABLE t ADD CONSTRAINT name ...`
//! - `DROP TABLE IF EXISTS t ...`
//!
//! Anything else (indexes, functions, triggers) is only recorded.
//!
//! ## Simulating Failures
//!
//! ```rust,ignore
//! let catalog = MockCatalog::new();
//! catalog.fail_statements_containing("CREATE TRIGGER", "permission denied").await;
//! catalog
//!     .add_introspection_error("users", CatalogError::PermissionDenied("users".into()))
//!     .await;
//! ```

use crate::catalog::{CatalogError, DdlExecutor, SchemaIntrospector};
use metasync_core::{stored_identifier, IntrospectedColumn, TableColumns};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;

/// Tables, constraints and the DDL log
#[derive(Debug, Default)]
struct MockDatabase {
    /// Columns by lower-cased table name
    tables: HashMap<String, TableColumns>,

    /// Constraint names by lower-cased table name
    constraints: HashMap<String, HashSet<String>>,

    /// Successfully executed statements, in order
    executed: Vec<String>,
}

/// In-memory catalog for testing
///
/// Clones share state, so a test can keep a handle while the engine owns
/// another.
#[derive(Clone)]
pub struct MockCatalog {
    database: Arc<RwLock<MockDatabase>>,

    /// Errors returned by introspection of specific tables
    introspection_errors: Arc<RwLock<HashMap<String, CatalogError>>>,

    /// Statements containing a pattern fail with the paired message
    failing_statements: Arc<RwLock<Vec<(String, String)>>>,

    /// Simulate connection failure
    fail_connection: bool,

    /// Name to return from name() method
    catalog_name: &'static str,
}

impl MockCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            database: Arc::new(RwLock::new(MockDatabase::default())),
            introspection_errors: Arc::new(RwLock::new(HashMap::new())),
            failing_statements: Arc::new(RwLock::new(Vec::new())),
            fail_connection: false,
            catalog_name: "Mock",
        }
    }

    /// Add (or replace) a table with the given columns
    pub async fn add_table(&self, table: &str, columns: Vec<IntrospectedColumn>) {
        let columns = metasync_core::columns_by_name(columns);
        self.database
            .write()
            .await
            .tables
            .insert(stored_identifier(table), columns);
    }

    /// Register an existing constraint
    pub async fn add_constraint(&self, table: &str, constraint: &str) {
        self.database
            .write()
            .await
            .constraints
            .entry(stored_identifier(table))
            .or_default()
            .insert(stored_identifier(constraint));
    }

    /// Make introspection of a table fail
    pub async fn add_introspection_error(&self, table: &str, error: CatalogError) {
        self.introspection_errors
            .write()
            .await
            .insert(stored_identifier(table), error);
    }

    /// Make every statement containing `pattern` fail with `message`
    pub async fn fail_statements_containing(&self, pattern: &str, message: &str) {
        self.failing_statements
            .write()
            .await
            .push((pattern.to_string(), message.to_string()));
    }

    /// Remove all injected execution failures
    pub async fn clear_failures(&self) {
        self.failing_statements.write().await.clear();
    }

    /// Configure to fail all connection tests
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Set a custom catalog name
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.catalog_name = name;
        self
    }

    /// Statements executed so far
    pub async fn executed(&self) -> Vec<String> {
        self.database.read().await.executed.clone()
    }

    /// Executed statements containing a pattern
    pub async fn executed_matching(&self, pattern: &str) -> Vec<String> {
        self.database
            .read()
            .await
            .executed
            .iter()
            .filter(|sql| sql.contains(pattern))
            .cloned()
            .collect()
    }

    /// Forget the DDL log, keep tables
    pub async fn clear_executed(&self) {
        self.database.write().await.executed.clear();
    }

    pub async fn has_table(&self, table: &str) -> bool {
        self.database
            .read()
            .await
            .tables
            .contains_key(&stored_identifier(table))
    }

    /// Names of all tables, sorted
    pub async fn table_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.database.read().await.tables.keys().cloned().collect();
        names.sort();
        names
    }

    async fn introspection_error(&self, table: &str) -> Option<CatalogError> {
        self.introspection_errors
            .read()
            .await
            .get(&stored_identifier(table))
            .cloned()
    }
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SchemaIntrospector for MockCatalog {
    fn name(&self) -> &'static str {
        self.catalog_name
    }

    async fn table_exists(&self, table: &str) -> Result<bool, CatalogError> {
        if let Some(error) = self.introspection_error(table).await {
            return Err(error);
        }
        Ok(self.has_table(table).await)
    }

    async fn columns(&self, table: &str) -> Result<TableColumns, CatalogError> {
        if let Some(error) = self.introspection_error(table).await {
            return Err(error);
        }
        Ok(self
            .database
            .read()
            .await
            .tables
            .get(&stored_identifier(table))
            .cloned()
            .unwrap_or_default())
    }

    async fn constraint_exists(&self, table: &str, constraint: &str) -> Result<bool, CatalogError> {
        if let Some(error) = self.introspection_error(table).await {
            return Err(error);
        }
        Ok(self
            .database
            .read()
            .await
            .constraints
            .get(&stored_identifier(table))
            .is_some_and(|names| names.contains(&stored_identifier(constraint))))
    }

    async fn test_connection(&self) -> Result<(), CatalogError> {
        if self.fail_connection {
            Err(CatalogError::Connection(
                "Simulated connection failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl DdlExecutor for MockCatalog {
    async fn execute(&self, sql: &str) -> Result<(), CatalogError> {
        if let Some((_, message)) = self
            .failing_statements
            .read()
            .await
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
        {
            return Err(CatalogError::execution(sql, message.clone()));
        }

        let mut database = self.database.write().await;
        database
            .apply(sql)
            .map_err(|message| CatalogError::execution(sql, message))?;
        database.executed.push(sql.to_string());
        Ok(())
    }
}

macro_rules! ddl_pattern {
    ($name:ident, $re:expr) => {
        fn $name() -> &'static Regex {
            static PATTERN: OnceLock<Regex> = OnceLock::new();
            PATTERN.get_or_init(|| Regex::new($re).expect("DDL pattern is valid"))
        }
    };
}

ddl_pattern!(create_table_re, r"(?is)^\s*CREATE TABLE IF NOT EXISTS\s+(\w+)\s*\((.*)\)\s*;?\s*$");
ddl_pattern!(add_column_re, r"(?is)^\s*ALTER TABLE\s+(\w+)\s+ADD COLUMN\s+(.+?)\s*;?\s*$");
ddl_pattern!(
    alter_type_re,
    r"(?is)^\s*ALTER TABLE\s+(\w+)\s+ALTER COLUMN\s+(\w+)\s+TYPE\s+(.+?)(?:\s+USING\s+.*)?\s*;?\s*$"
);
ddl_pattern!(
    nullability_re,
    r"(?i)^\s*ALTER TABLE\s+(\w+)\s+ALTER COLUMN\s+(\w+)\s+(SET|DROP) NOT NULL\s*;?\s*$"
);
ddl_pattern!(add_constraint_re, r"(?i)^\s*ALTER TABLE\s+(\w+)\s+ADD CONSTRAINT\s+(\w+)\b");
ddl_pattern!(drop_table_re, r"(?i)^\s*DROP TABLE IF EXISTS\s+(\w+)");
ddl_pattern!(references_re, r"(?i)\bREFERENCES\s+(\w+)\s*\(\s*(\w+)\s*\)");

const COLUMN_KEYWORDS: [&str; 6] = ["PRIMARY", "NOT", "NULL", "DEFAULT", "REFERENCES", "UNIQUE"];

impl MockDatabase {
    /// Apply the effect of one statement
    fn apply(&mut self, sql: &str) -> Result<(), String> {
        if let Some(caps) = create_table_re().captures(sql) {
            let table = stored_identifier(&caps[1]);
            if !self.tables.contains_key(&table) {
                let columns = parse_table_body(&caps[2])?;
                self.tables.insert(table, columns);
            }
        } else if let Some(caps) = add_column_re().captures(sql) {
            let column = parse_column_definition(&caps[2])?;
            let columns = self.table_mut(&caps[1])?;
            let key = column.name.to_lowercase();
            if columns.contains_key(&key) {
                return Err(format!("column \"{}\" already exists", column.name));
            }
            columns.insert(key, column);
        } else if let Some(caps) = alter_type_re().captures(sql) {
            let column = self.column_mut(&caps[1], &caps[2])?;
            set_type(column, &caps[3]);
        } else if let Some(caps) = nullability_re().captures(sql) {
            let nullable = caps[3].eq_ignore_ascii_case("DROP");
            let column = self.column_mut(&caps[1], &caps[2])?;
            column.nullable = nullable;
        } else if let Some(caps) = add_constraint_re().captures(sql) {
            let table = stored_identifier(&caps[1]);
            self.table_mut(&table)?;
            let names = self.constraints.entry(table).or_default();
            if !names.insert(stored_identifier(&caps[2])) {
                return Err(format!("relation \"{}\" already exists", &caps[2]));
            }
        } else if let Some(caps) = drop_table_re().captures(sql) {
            let table = stored_identifier(&caps[1]);
            self.tables.remove(&table);
            self.constraints.remove(&table);
        }
        Ok(())
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut TableColumns, String> {
        self.tables
            .get_mut(&stored_identifier(table))
            .ok_or_else(|| format!("relation \"{}\" does not exist", table))
    }

    fn column_mut(&mut self, table: &str, column: &str) -> Result<&mut IntrospectedColumn, String> {
        self.table_mut(table)?
            .get_mut(&column.to_lowercase())
            .ok_or_else(|| format!("column \"{}\" of relation \"{}\" does not exist", column, table))
    }
}

/// Split on commas outside parentheses and quotes
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quoted = false;
    let mut start = 0;

    for (i, ch) in body.char_indices() {
        match ch {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth -= 1,
            ',' if !quoted && depth == 0 => {
                parts.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(body[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

fn parse_table_body(body: &str) -> Result<TableColumns, String> {
    let mut columns = TableColumns::new();
    let mut primary_key = Vec::new();

    for item in split_top_level(body) {
        let upper = item.to_uppercase();
        if upper.starts_with("PRIMARY KEY") {
            let open = item.find('(').ok_or("malformed PRIMARY KEY clause")?;
            let close = item.rfind(')').ok_or("malformed PRIMARY KEY clause")?;
            primary_key.extend(item[open + 1..close].split(',').map(|c| c.trim().to_lowercase()));
        } else if upper.starts_with("CONSTRAINT")
            || upper.starts_with("UNIQUE")
            || upper.starts_with("FOREIGN KEY")
        {
            continue;
        } else {
            let column = parse_column_definition(item)?;
            columns.insert(column.name.to_lowercase(), column);
        }
    }

    for name in primary_key {
        let column = columns
            .get_mut(&name)
            .ok_or_else(|| format!("column \"{}\" named in key does not exist", name))?;
        column.primary_key = true;
        column.nullable = false;
    }

    Ok(columns)
}

fn parse_column_definition(definition: &str) -> Result<IntrospectedColumn, String> {
    let mut tokens = definition.split_whitespace();
    let name = tokens
        .next()
        .ok_or_else(|| "empty column definition".to_string())?;

    let type_tokens: Vec<&str> = tokens
        .by_ref()
        .take_while(|t| !COLUMN_KEYWORDS.contains(&t.to_uppercase().as_str()))
        .collect();
    if type_tokens.is_empty() {
        return Err(format!("column \"{}\" has no type", name));
    }

    let mut column = IntrospectedColumn::new(name, "");
    set_type(&mut column, &type_tokens.join(" "));

    let upper = definition.to_uppercase();
    if upper.contains("PRIMARY KEY") {
        column = column.primary_key();
    }
    if upper.contains("NOT NULL") {
        column.nullable = false;
    }
    if let Some(start) = upper.find(" DEFAULT ") {
        let rest = &definition[start + " DEFAULT ".len()..];
        let end = [" NOT NULL", " PRIMARY KEY", " REFERENCES", " UNIQUE"]
            .iter()
            .filter_map(|kw| rest.to_uppercase().find(kw))
            .min()
            .unwrap_or(rest.len());
        column.default = Some(rest[..end].trim().to_string());
    }
    if let Some(caps) = references_re().captures(definition) {
        column = column.with_foreign_key(&caps[1], &caps[2]);
    }

    Ok(column)
}

/// Store a DDL type spelling the way the catalog reports it
fn set_type(column: &mut IntrospectedColumn, sql_type: &str) {
    let sql_type = sql_type.trim();
    let (base, args) = match (sql_type.find('('), sql_type.rfind(')')) {
        (Some(open), Some(close)) if close > open => {
            (&sql_type[..open], Some(&sql_type[open + 1..close]))
        }
        _ => (sql_type, None),
    };

    column.data_type = base.trim().to_lowercase();
    column.char_max_length = None;
    column.numeric_precision = None;
    column.numeric_scale = None;

    let numbers: Vec<i32> = args
        .map(|a| a.split(',').filter_map(|n| n.trim().parse().ok()).collect())
        .unwrap_or_default();

    match column.normalized_type().as_str() {
        "VARCHAR" | "CHAR" => column.char_max_length = numbers.first().copied(),
        "NUMERIC" => {
            column.numeric_precision = numbers.first().copied();
            column.numeric_scale = numbers.get(1).copied();
        }
        _ => {}
    }
}

/// Builder for creating MockCatalog with predefined tables
///
/// ```rust,ignore
/// let catalog = MockCatalogBuilder::new()
///     .with_table("users", vec![
///         IntrospectedColumn::new("id", "uuid").primary_key(),
///         IntrospectedColumn::varchar("email", 255).not_null(),
///     ])
///     .with_constraint("users", "uk_users_email")
///     .build();
/// ```
pub struct MockCatalogBuilder {
    tables: HashMap<String, TableColumns>,
    constraints: HashMap<String, HashSet<String>>,
    introspection_errors: HashMap<String, CatalogError>,
    failing_statements: Vec<(String, String)>,
    fail_connection: bool,
    catalog_name: &'static str,
}

impl MockCatalogBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            constraints: HashMap::new(),
            introspection_errors: HashMap::new(),
            failing_statements: Vec::new(),
            fail_connection: false,
            catalog_name: "Mock",
        }
    }

    pub fn with_table(mut self, table: &str, columns: Vec<IntrospectedColumn>) -> Self {
        self.tables
            .insert(stored_identifier(table), metasync_core::columns_by_name(columns));
        self
    }

    pub fn with_constraint(mut self, table: &str, constraint: &str) -> Self {
        self.constraints
            .entry(stored_identifier(table))
            .or_default()
            .insert(stored_identifier(constraint));
        self
    }

    pub fn with_introspection_error(mut self, table: &str, error: CatalogError) -> Self {
        self.introspection_errors.insert(stored_identifier(table), error);
        self
    }

    pub fn with_failing_statement(mut self, pattern: &str, message: &str) -> Self {
        self.failing_statements
            .push((pattern.to_string(), message.to_string()));
        self
    }

    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.catalog_name = name;
        self
    }

    /// Build the MockCatalog
    pub fn build(self) -> MockCatalog {
        MockCatalog {
            database: Arc::new(RwLock::new(MockDatabase {
                tables: self.tables,
                constraints: self.constraints,
                executed: Vec::new(),
            })),
            introspection_errors: Arc::new(RwLock::new(self.introspection_errors)),
            failing_statements: Arc::new(RwLock::new(self.failing_statements)),
            fail_connection: self.fail_connection,
            catalog_name: self.catalog_name,
        }
    }
}

impl Default for MockCatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}
