//! Live column metadata and the canonical SQL type spelling used for diffing

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Target of a foreign key constraint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Referenced table
    pub table: String,

    /// Referenced column
    pub column: String,
}

/// One column as reported by the database catalog
///
/// Produced fresh on every introspection call, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectedColumn {
    /// Column name as stored
    pub name: String,

    /// Raw catalog type (`character varying`, `timestamp with time zone`, ...)
    pub data_type: String,

    pub nullable: bool,

    /// Character length for VARCHAR/CHAR columns
    pub char_max_length: Option<i32>,

    pub numeric_precision: Option<i32>,

    pub numeric_scale: Option<i32>,

    /// Default expression, if any
    pub default: Option<String>,

    pub primary_key: bool,

    pub foreign_key: Option<ForeignKeyRef>,
}

impl IntrospectedColumn {
    /// Create a nullable, non-key column
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            char_max_length: None,
            numeric_precision: None,
            numeric_scale: None,
            default: None,
            primary_key: false,
            foreign_key: None,
        }
    }

    /// Shorthand for a `character varying(n)` column
    pub fn varchar(name: impl Into<String>, length: i32) -> Self {
        Self::new(name, "character varying").with_max_length(length)
    }

    pub fn with_max_length(mut self, length: i32) -> Self {
        self.char_max_length = Some(length);
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn not_null(self) -> Self {
        self.with_nullable(false)
    }

    /// Mark as primary key (implies NOT NULL)
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_foreign_key(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKeyRef {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    /// Canonical upper-case type name without length
    ///
    /// `character varying` becomes `VARCHAR`, `timestamp with time zone`
    /// becomes `TIMESTAMPTZ`, and so on. Unknown names are upper-cased.
    pub fn normalized_type(&self) -> String {
        normalize_data_type(&self.data_type)
    }

    /// Canonical type including the length qualifier where one applies
    pub fn full_type(&self) -> String {
        let base = self.normalized_type();
        match (base.as_str(), self.char_max_length) {
            ("VARCHAR" | "CHAR", Some(length)) => format!("{}({})", base, length),
            ("NUMERIC", _) => match (self.numeric_precision, self.numeric_scale) {
                (Some(p), Some(s)) => format!("NUMERIC({},{})", p, s),
                (Some(p), None) => format!("NUMERIC({})", p),
                _ => base,
            },
            _ => base,
        }
    }
}

/// Map a catalog type name to its canonical upper-case spelling
pub fn normalize_data_type(data_type: &str) -> String {
    let lowered = data_type.trim().to_lowercase();
    let base = lowered.split('(').next().unwrap_or(&lowered).trim();

    let canonical = match base {
        "character varying" | "varchar" => "VARCHAR",
        "character" | "char" | "bpchar" => "CHAR",
        "text" => "TEXT",
        "uuid" => "UUID",
        "boolean" | "bool" => "BOOLEAN",
        "smallint" | "int2" => "SMALLINT",
        "integer" | "int" | "int4" => "INTEGER",
        "bigint" | "int8" => "BIGINT",
        "real" | "float4" => "REAL",
        "double precision" | "float8" => "DOUBLE PRECISION",
        "numeric" | "decimal" => "NUMERIC",
        "date" => "DATE",
        "timestamp without time zone" | "timestamp" => "TIMESTAMP",
        "timestamp with time zone" | "timestamptz" => "TIMESTAMPTZ",
        "json" => "JSON",
        "jsonb" => "JSONB",
        other => return other.to_uppercase(),
    };

    canonical.to_string()
}

/// Columns of one table keyed by lower-cased column name
pub type TableColumns = HashMap<String, IntrospectedColumn>;

/// Key a list of columns by lower-cased name
pub fn columns_by_name(columns: impl IntoIterator<Item = IntrospectedColumn>) -> TableColumns {
    columns
        .into_iter()
        .map(|column| (column.name.to_lowercase(), column))
        .collect()
}
